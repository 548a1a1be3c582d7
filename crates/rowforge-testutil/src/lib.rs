//! Shared fixtures for rowforge tests: scanned-and-resolved schemas from SQL
//! text, and a small library example used across integration tests.

use rowforge_core::schema::scan::scan_schema;
use rowforge_core::{RunConfig, Schema};

/// Scan SQL text and resolve sizes under the given configuration, the way
/// the CLI prepares a run.
pub fn prepared_schema(sql: &str, mut config: RunConfig) -> (Schema, RunConfig) {
    let lines: Vec<String> = sql.lines().map(str::to_string).collect();
    let mut schema = scan_schema(&lines, &config).expect("fixture schema must scan");
    let mut dirs = schema.directives.clone();
    config
        .finalize(&mut dirs)
        .expect("fixture directives must finalize");
    schema.directives = dirs;
    schema
        .resolve_sizes(&config)
        .expect("fixture sizes must resolve");
    (schema, config)
}

/// A seeded configuration scaled to `size` rows.
pub fn seeded_config(seed: &str, size: i64) -> RunConfig {
    RunConfig {
        seed: Some(seed.to_string()),
        size: Some(size),
        quiet: true,
        ..RunConfig::default()
    }
}

/// A small library: readers borrow books, with foreign keys, a compound
/// primary key and a few representative directives.
pub const LIBRARY_SQL: &str = r#"
CREATE TABLE Book( -- rf: mult=10.0
  bid SERIAL PRIMARY KEY,
  title TEXT NOT NULL,
  isbn ISBN13 NOT NULL -- rf: size=1000000000
);

CREATE TABLE Reader(
  rid SERIAL PRIMARY KEY,
  firstname TEXT NOT NULL, -- rf: sub=power prefix=fn size=1000 rate=0.03
  birth DATE NOT NULL, -- rf: start=1923-01-01 end=2010-01-01
  gender BOOLEAN NOT NULL, -- rf: rate=0.25
  phone TEXT -- rf: chars='0-9' length=10 lenvar=0 null=0.01 size=1000000
);

CREATE TABLE Borrow( -- rf: mult=1.5
  bid INTEGER NOT NULL REFERENCES Book, -- rf: mangle
  rid INTEGER NOT NULL REFERENCES Reader,
  borrowed TIMESTAMP NOT NULL, -- rf: end='2038-01-19 03:14:07' size=72000 prec=60
  PRIMARY KEY(bid, rid)
);
"#;
