//! # rowforge-core
//!
//! Synthesizes constraint-respecting random rows for a relational schema,
//! driven by small `-- rf` directives attached to the SQL definitions. The
//! schema scanner extracts tables and constraints with optimistic regular
//! expressions, the generator engine builds one composable tree of value
//! producers per attribute, and the row assembler enforces uniqueness
//! constraints under a bounded retry budget before the output formatters
//! render COPY/INSERT/CSV text.

pub mod config;
pub mod directive;
pub mod error;
pub mod generate;
pub mod output;
pub mod schema;

// Re-export key types for convenience
pub use config::RunConfig;
pub use error::{Result, RowforgeError};
pub use output::Target;
pub use schema::types::Schema;
