//! MySQL output: multi-row `INSERT INTO ... VALUES` statements.

use crate::generate::engine::BoundTable;
use crate::generate::value::{hex_encode, Value};

pub fn insert_begin(table: &BoundTable) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES",
        table.display_name,
        table.columns.join(",")
    )
}

/// One row's value list, without the surrounding parentheses.
pub fn insert_row(values: &[Value]) -> String {
    values
        .iter()
        .map(literal)
        .collect::<Vec<_>>()
        .join(",")
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
        Value::Bytes(b) => format!("X'{}'", hex_encode(b)),
        // MySQL has no native array/composite literals; render as text
        Value::List(_) | Value::Tuple(_) => {
            format!("'{}'", value.to_string().replace('\'', "''"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Text("o'brien".into())), "'o''brien'");
        assert_eq!(literal(&Value::Bytes(vec![0xff])), "X'ff'");
    }

    #[test]
    fn test_insert_row() {
        let row = vec![Value::Int(1), Value::Text("x".into())];
        assert_eq!(insert_row(&row), "1,'x'");
    }
}
