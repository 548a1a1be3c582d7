use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rowforge_core::output::write_program;
use rowforge_core::schema::scan::scan_schema;
use rowforge_core::{RunConfig, Target};

const SCHEMA: &str = "
CREATE TABLE account(
  aid SERIAL PRIMARY KEY,
  name TEXT NOT NULL,
  balance INTEGER NOT NULL, -- rf: sub=power rate=0.2 size=100000
  created TIMESTAMP NOT NULL, -- rf: size=72000 prec=60
  email TEXT NOT NULL -- rf: pattern='[a-z]{3,8}@(gmail|yahoo)\\.com'
);

CREATE TABLE transfer( -- rf: mult=5.0
  aid INTEGER NOT NULL REFERENCES account,
  amount INTEGER NOT NULL, -- rf: offset=-5000 size=10000
  at TIMESTAMP NOT NULL
);
";

fn prepared(size: i64) -> (rowforge_core::Schema, RunConfig) {
    let mut config = RunConfig {
        size: Some(size),
        seed: Some("bench".to_string()),
        quiet: true,
        target: Target::Csv,
        ..RunConfig::default()
    };
    let lines: Vec<String> = SCHEMA.lines().map(str::to_string).collect();
    let mut schema = scan_schema(&lines, &config).unwrap();
    let mut dirs = schema.directives.clone();
    config.finalize(&mut dirs).unwrap();
    schema.directives = dirs;
    schema.resolve_sizes(&config).unwrap();
    (schema, config)
}

fn bench_fill(c: &mut Criterion) {
    c.bench_function("fill_1k_rows", |b| {
        b.iter(|| {
            let (schema, config) = prepared(1000);
            let mut out = Vec::with_capacity(1 << 20);
            write_program(&schema, config, None, &mut out, None).unwrap();
            black_box(out)
        })
    });
}

criterion_group!(benches, bench_fill);
criterion_main!(benches);
