//! Schema metadata: the table/attribute model and the regex-based SQL
//! scanner that feeds it.

pub mod scan;
pub mod types;
