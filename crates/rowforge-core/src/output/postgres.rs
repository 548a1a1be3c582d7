//! PostgreSQL output: `COPY ... FROM STDIN` batches with COPY escaping.

use crate::config::RunConfig;
use crate::generate::engine::{BoundTable, SequenceRestart};
use crate::generate::value::{hex_encode, Value};

pub fn copy_begin(table: &BoundTable, config: &RunConfig) -> String {
    let options = if config.freeze { " (FREEZE ON)" } else { "" };
    format!(
        "COPY {} ({}) FROM STDIN{};",
        table.display_name,
        table.columns.join(","),
        options
    )
}

pub fn copy_row(values: &[Value]) -> String {
    values
        .iter()
        .map(copy_escape)
        .collect::<Vec<_>>()
        .join("\t")
}

pub fn sequence_name(table: &BoundTable, seq: &SequenceRestart) -> String {
    let raw = format!(
        "{}_{}_seq",
        table.display_name.trim_matches('"'),
        seq.attribute
    );
    if table.display_name.starts_with('"') || seq.quoted {
        format!("\"{}\"", raw)
    } else {
        raw
    }
}

/// Escape one value for a COPY data line.
pub fn copy_escape(value: &Value) -> String {
    match value {
        Value::Null => r"\N".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => escape_text(s),
        Value::Bytes(b) => format!(r"\\x{}", hex_encode(b)),
        Value::List(items) => format!(
            "{{{}}}",
            items
                .iter()
                .map(|v| double_quote_escape(v, "NULL"))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Tuple(items) => format!(
            "({})",
            items
                .iter()
                .map(|v| double_quote_escape(v, ""))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

/// Array and composite elements are double-quoted with backslash escaping.
fn double_quote_escape(value: &Value, null_literal: &str) -> String {
    match value {
        Value::Null => null_literal.to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bytes(b) => format!(r"\\x{}", hex_encode(b)),
        Value::List(items) => format!(
            "{{{}}}",
            items
                .iter()
                .map(|v| double_quote_escape(v, "NULL"))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Tuple(items) => format!(
            "({})",
            items
                .iter()
                .map(|v| double_quote_escape(v, ""))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Text(s) => {
            let escaped: String = s
                .chars()
                .flat_map(|c| match c {
                    '"' => vec!['\\', '"'],
                    '\\' => vec!['\\', '\\'],
                    c => vec![c],
                })
                .collect();
            format!("\"{}\"", escaped)
        }
    }
}

/// COPY text-format escapes for control characters and backslashes.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str(r"\n"),
            '\t' => out.push_str(r"\t"),
            '\u{8}' => out.push_str(r"\b"),
            '\r' => out.push_str(r"\r"),
            '\u{C}' => out.push_str(r"\f"),
            '\u{B}' => out.push_str(r"\v"),
            '\u{7}' => out.push_str(r"\007"),
            '\0' => out.push_str(r"\000"),
            '\\' => out.push_str(r"\\"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_escape_scalars() {
        assert_eq!(copy_escape(&Value::Null), r"\N");
        assert_eq!(copy_escape(&Value::Bool(true)), "TRUE");
        assert_eq!(copy_escape(&Value::Int(-7)), "-7");
        assert_eq!(copy_escape(&Value::Text("a\tb\n".into())), r"a\tb\n");
        assert_eq!(copy_escape(&Value::Text(r"back\slash".into())), r"back\\slash");
    }

    #[test]
    fn test_copy_escape_bytes() {
        assert_eq!(copy_escape(&Value::Bytes(vec![0xde, 0xad])), r"\\xdead");
    }

    #[test]
    fn test_copy_escape_array_and_tuple() {
        let list = Value::List(vec![Value::Text("a\"b".into()), Value::Null]);
        assert_eq!(copy_escape(&list), "{\"a\\\"b\",NULL}");
        let tup = Value::Tuple(vec![Value::Int(1), Value::Null]);
        assert_eq!(copy_escape(&tup), "(1,)");
    }

    #[test]
    fn test_copy_row_is_tab_separated() {
        let row = vec![Value::Int(1), Value::Text("x".into())];
        assert_eq!(copy_row(&row), "1\tx");
    }
}
