//! # Error Types
//!
//! Defines `RowforgeError`, the unified error enum for every failure mode in
//! the rowforge pipeline. Every variant carries enough context (table,
//! attribute, directive, pattern fragment) to point at the offending schema
//! line without re-running under a debugger.
//!
//! The engine has no recoverable-error channel: any contract violation aborts
//! the whole run. Configuration problems surface while generators are built,
//! before a single row is produced; the only generation-time failures are
//! unique-constraint exhaustion and file reads.

use thiserror::Error;

/// All errors that can occur in rowforge operations.
#[derive(Error, Debug)]
pub enum RowforgeError {
    #[error("{owner}: invalid directive '{directive}': {message}")]
    Directive {
        owner: String,
        directive: String,
        message: String,
    },

    #[error("{owner}: unexpected directives: {keys}")]
    UnusedDirectives { owner: String, keys: String },

    #[error("{owner}: no generator for type '{type_text}'")]
    NoGenerator { owner: String, type_text: String },

    #[error("{owner}: unknown generator '{name}'")]
    UnknownGenerator { owner: String, name: String },

    #[error("{owner}: '{name}' is not a defined macro")]
    UnknownMacro { owner: String, name: String },

    #[error("pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("{owner}: cannot draw before 'size' is set")]
    SizeNotSet { owner: String },

    #[error("table {table}: cannot build a row satisfying its unique constraints after {tries} tries")]
    UniqueExhausted { table: String, tries: usize },

    #[error("table {table}: {message}")]
    Unsupported { table: String, message: String },

    #[error("schema scan: {message}")]
    Scan { message: String },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing output: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RowforgeError>;

impl RowforgeError {
    /// Shorthand for the most common construction-time failure.
    pub fn directive(owner: &str, directive: &str, message: impl Into<String>) -> Self {
        RowforgeError::Directive {
            owner: owner.to_string(),
            directive: directive.to_string(),
            message: message.into(),
        }
    }
}
