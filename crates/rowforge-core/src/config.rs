//! # Run Configuration
//!
//! `RunConfig` carries everything the engine needs beyond the schema itself:
//! global scale, seeding, null rate, primary-key offset, the uniqueness retry
//! budget and the output dialect. The CLI fills in what the user passed;
//! [`RunConfig::finalize`] then backfills unset knobs from schema-level
//! directives (command-line options win) and applies the hard defaults.

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::output::Target;

/// Default global size when neither option nor directive provides one.
pub const DEFAULT_SIZE: i64 = 100;
/// Default probability of generating NULL for a nullable attribute.
pub const DEFAULT_NULL_RATE: f64 = 0.01;
/// Default uniqueness retry budget per row.
pub const DEFAULT_TRIES: usize = 10;

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Global scale; table sizes are `mult * size` unless given explicitly.
    pub size: Option<i64>,
    /// Seed string for reproducible output; entropy-based when unset.
    pub seed: Option<String>,
    /// NULL probability for nullable attributes.
    pub null_rate: Option<f64>,
    /// Default offset for integer generators on primary keys.
    pub offset: Option<i64>,
    /// How hard to retry a row that collides with a unique constraint.
    pub tries: usize,
    /// Output dialect.
    pub target: Target,
    /// Wrap the output in one transaction.
    pub transaction: bool,
    /// Emit TRUNCATE statements before filling.
    pub truncate: bool,
    /// Emit DROP TABLE statements before the input.
    pub drop_tables: bool,
    /// Echo the input schema before the data (filter mode).
    pub filter: bool,
    /// Use PostgreSQL COPY FREEZE.
    pub freeze: bool,
    /// Suppress per-table \echo progress statements.
    pub quiet: bool,
    /// Additional custom type names recognized by the scanner.
    pub custom_types: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            size: None,
            seed: None,
            null_rate: None,
            offset: None,
            tries: DEFAULT_TRIES,
            target: Target::Postgres,
            transaction: false,
            truncate: false,
            drop_tables: false,
            filter: false,
            freeze: true,
            quiet: false,
            custom_types: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Backfill unset options from schema-level directives, then apply the
    /// defaults. Options already set on the command line are left alone.
    pub fn finalize(&mut self, schema_directives: &mut DirectiveMap) -> Result<()> {
        if self.size.is_none() {
            self.size = schema_directives.take_int("size", "schema")?;
        } else {
            schema_directives.take("size");
        }
        if self.offset.is_none() {
            self.offset = schema_directives.take_int("offset", "schema")?;
        } else {
            schema_directives.take("offset");
        }
        if self.null_rate.is_none() {
            self.null_rate = schema_directives.take_float("null", "schema")?;
        } else {
            schema_directives.take("null");
        }
        if self.seed.is_none() {
            self.seed = schema_directives.take_text("seed");
        } else {
            schema_directives.take("seed");
        }
        self.size.get_or_insert(DEFAULT_SIZE);
        self.null_rate.get_or_insert(DEFAULT_NULL_RATE);
        let null = self.resolved_null_rate();
        if !(0.0..=1.0).contains(&null) {
            return Err(RowforgeError::directive(
                "schema",
                "null",
                format!("{} not in [0,1]", null),
            ));
        }
        Ok(())
    }

    /// Global size after `finalize` (defaults to [`DEFAULT_SIZE`]).
    pub fn resolved_size(&self) -> i64 {
        self.size.unwrap_or(DEFAULT_SIZE)
    }

    /// Null rate after `finalize` (defaults to [`DEFAULT_NULL_RATE`]).
    pub fn resolved_null_rate(&self) -> f64 {
        self.null_rate.unwrap_or(DEFAULT_NULL_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{tokenize, MacroTable};

    #[test]
    fn test_finalize_takes_schema_directives() {
        let mut config = RunConfig::default();
        let mut dirs = tokenize("size=10 null=0.5 seed=Calvin", &MacroTable::new(), "s").unwrap();
        config.finalize(&mut dirs).unwrap();
        assert_eq!(config.resolved_size(), 10);
        assert_eq!(config.resolved_null_rate(), 0.5);
        assert_eq!(config.seed.as_deref(), Some("Calvin"));
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_options_win_over_directives() {
        let mut config = RunConfig {
            size: Some(42),
            ..RunConfig::default()
        };
        let mut dirs = tokenize("size=10", &MacroTable::new(), "s").unwrap();
        config.finalize(&mut dirs).unwrap();
        assert_eq!(config.resolved_size(), 42);
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_bad_null_rate_rejected() {
        let mut config = RunConfig::default();
        let mut dirs = tokenize("null=2.0", &MacroTable::new(), "s").unwrap();
        assert!(config.finalize(&mut dirs).is_err());
    }
}
