//! # Directives
//!
//! Directives are the `key=value` / flag tokens attached to schema objects in
//! `-- rf` comments. They are tokenized into a typed [`DirectiveMap`], then
//! *drained* while the bound generator is constructed: every constructor takes
//! the keys it understands out of the map, and [`DirectiveMap::finish`] turns
//! any survivor into a hard configuration error naming the surplus keys.
//!
//! A macro is a named, reusable directive map. The macro table is pre-seeded
//! with the built-ins (`cfr`, `cen`, `french`, `english`) and extended by
//! schema declarations; it is append-only after load.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::error::{Result, RowforgeError};

/// A typed directive value.
///
/// `Flag` is a bare key with no `=value`; quoted and unquoted strings both
/// land in `Text` (the tokenizer has already stripped the quotes).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DirectiveValue {
    Flag,
    Int(i64),
    Float(f64),
    Text(String),
}

impl DirectiveValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DirectiveValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric coercion: integers are acceptable where floats are expected.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DirectiveValue::Float(f) => Some(*f),
            DirectiveValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Render as text; a bare flag reads as the empty string.
    pub fn as_text(&self) -> String {
        match self {
            DirectiveValue::Flag => String::new(),
            DirectiveValue::Int(i) => i.to_string(),
            DirectiveValue::Float(f) => f.to_string(),
            DirectiveValue::Text(s) => s.clone(),
        }
    }
}

/// An ordered key→value directive map, drained during generator construction.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DirectiveMap {
    entries: IndexMap<String, DirectiveValue>,
}

impl DirectiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&DirectiveValue> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DirectiveValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Merge `other` in, later definitions winning over existing keys.
    pub fn merge(&mut self, other: &DirectiveMap) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// Merge `other` in without overriding keys already present. Used when a
    /// foreign key attribute inherits the referenced key's directives.
    pub fn merge_missing(&mut self, other: &DirectiveMap) {
        for (k, v) in &other.entries {
            if !self.entries.contains_key(k) {
                self.entries.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn take(&mut self, key: &str) -> Option<DirectiveValue> {
        self.entries.shift_remove(key)
    }

    /// Drain an integer directive; a value of any other type is an error.
    pub fn take_int(&mut self, key: &str, owner: &str) -> Result<Option<i64>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or_else(|| {
                RowforgeError::directive(owner, key, format!("expected an integer, got {:?}", v))
            }),
        }
    }

    /// Drain a float directive; integers coerce, anything else is an error.
    pub fn take_float(&mut self, key: &str, owner: &str) -> Result<Option<f64>> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v.as_float().map(Some).ok_or_else(|| {
                RowforgeError::directive(owner, key, format!("expected a number, got {:?}", v))
            }),
        }
    }

    /// Drain a textual directive; any value renders to text, a flag to "".
    pub fn take_text(&mut self, key: &str) -> Option<String> {
        self.take(key).map(|v| v.as_text())
    }

    /// Drain a presence-only flag; a valued directive is an error.
    pub fn take_flag(&mut self, key: &str, owner: &str) -> Result<bool> {
        match self.take(key) {
            None => Ok(false),
            Some(DirectiveValue::Flag) => Ok(true),
            Some(v) => Err(RowforgeError::directive(
                owner,
                key,
                format!("expected a bare flag, got {:?}", v),
            )),
        }
    }

    /// Drain an integer that may have been written as text (`start=9`).
    pub fn take_int_lenient(&mut self, key: &str, owner: &str) -> Result<Option<i64>> {
        match self.take(key) {
            None => Ok(None),
            Some(DirectiveValue::Int(i)) => Ok(Some(i)),
            Some(DirectiveValue::Text(s)) => s.parse::<i64>().map(Some).map_err(|_| {
                RowforgeError::directive(owner, key, format!("'{}' is not an integer", s))
            }),
            Some(v) => Err(RowforgeError::directive(
                owner,
                key,
                format!("expected an integer, got {:?}", v),
            )),
        }
    }

    /// After construction the map must be empty; leftover keys are a
    /// configuration error naming the surplus.
    pub fn finish(&self, owner: &str) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let keys = self
            .entries
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(RowforgeError::UnusedDirectives {
            owner: owner.to_string(),
            keys,
        })
    }
}

/// Process-lifetime name → directive-map registry.
pub type MacroTable = IndexMap<String, DirectiveMap>;

/// The predefined macros: two skewed integer generators and two chars
/// generators approximating French and English letter frequencies.
pub fn builtin_macros() -> MacroTable {
    let mut macros = MacroTable::new();
    let empty = MacroTable::new();
    for (name, text) in [
        ("cfr", "int sub=scale rate=0.17"),
        ("cen", "int sub=scale rate=0.15"),
        ("french", "chars='esaitnrulodcpmvqfbghjxyzwk' cgen=cfr"),
        ("english", "chars='etaonrishdlfcmugypwbvkjxqz' cgen=cen"),
    ] {
        let map = tokenize(text, &empty, name).expect("builtin macro must tokenize");
        macros.insert(name.to_string(), map);
    }
    macros
}

// One regex per token shape; tried in this order. A quoted value must come
// before the bare-word form, a float before an integer.
static RE_TXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)='([^']*)'\s+(.*)$").unwrap());
static RE_FLT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)=(-?\d+\.\d*)\s+(.*)$").unwrap());
static RE_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)=(-?\d+)\s+(.*)$").unwrap());
static RE_STR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)=(\S*)\s+(.*)$").unwrap());
static RE_BOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+)\s+(.*)$").unwrap());

/// Tokenize a directive string like `size=10 prefix='st' mangle` into a typed
/// map. `use=name` splices the named macro's entries in place.
pub fn tokenize(input: &str, macros: &MacroTable, owner: &str) -> Result<DirectiveMap> {
    let mut params = DirectiveMap::new();
    let mut rest = format!("{} ", input.trim_start());
    while !rest.trim().is_empty() {
        if let Some(c) = RE_TXT.captures(&rest) {
            params.insert(&c[1], DirectiveValue::Text(c[2].to_string()));
            rest = c[3].to_string();
        } else if let Some(c) = RE_FLT.captures(&rest) {
            let v: f64 = c[2].parse().map_err(|_| {
                RowforgeError::directive(owner, &c[1], format!("bad float '{}'", &c[2]))
            })?;
            params.insert(&c[1], DirectiveValue::Float(v));
            rest = c[3].to_string();
        } else if let Some(c) = RE_INT.captures(&rest) {
            let v: i64 = c[2].parse().map_err(|_| {
                RowforgeError::directive(owner, &c[1], format!("bad integer '{}'", &c[2]))
            })?;
            params.insert(&c[1], DirectiveValue::Int(v));
            rest = c[3].to_string();
        } else if let Some(c) = RE_STR.captures(&rest) {
            if &c[1] == "use" {
                let name = c[2].to_string();
                let map = macros.get(&name).ok_or_else(|| RowforgeError::UnknownMacro {
                    owner: owner.to_string(),
                    name: name.clone(),
                })?;
                params.merge(map);
            } else {
                params.insert(&c[1], DirectiveValue::Text(c[2].to_string()));
            }
            rest = c[3].to_string();
        } else if let Some(c) = RE_BOL.captures(&rest) {
            params.insert(&c[1], DirectiveValue::Flag);
            rest = c[2].to_string();
        } else {
            return Err(RowforgeError::directive(
                owner,
                rest.trim(),
                "cannot tokenize directive text",
            ));
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_typed_values() {
        let map = tokenize(
            "size=10 rate=0.17 prefix='st' word=:a,b mangle",
            &MacroTable::new(),
            "test",
        )
        .unwrap();
        assert_eq!(map.get("size"), Some(&DirectiveValue::Int(10)));
        assert_eq!(map.get("rate"), Some(&DirectiveValue::Float(0.17)));
        assert_eq!(
            map.get("prefix"),
            Some(&DirectiveValue::Text("st".to_string()))
        );
        assert_eq!(
            map.get("word"),
            Some(&DirectiveValue::Text(":a,b".to_string()))
        );
        assert_eq!(map.get("mangle"), Some(&DirectiveValue::Flag));
    }

    #[test]
    fn test_tokenize_negative_numbers() {
        let map = tokenize("offset=-5 alpha=-1.5", &MacroTable::new(), "test").unwrap();
        assert_eq!(map.get("offset"), Some(&DirectiveValue::Int(-5)));
        assert_eq!(map.get("alpha"), Some(&DirectiveValue::Float(-1.5)));
    }

    #[test]
    fn test_tokenize_use_splices_macro() {
        let mut macros = MacroTable::new();
        macros.insert(
            "mix".to_string(),
            tokenize("offset=10000 step=17", &MacroTable::new(), "mix").unwrap(),
        );
        let map = tokenize("use=mix size=5", &macros, "test").unwrap();
        assert_eq!(map.get("offset"), Some(&DirectiveValue::Int(10000)));
        assert_eq!(map.get("step"), Some(&DirectiveValue::Int(17)));
        assert_eq!(map.get("size"), Some(&DirectiveValue::Int(5)));
    }

    #[test]
    fn test_tokenize_unknown_use_fails() {
        let err = tokenize("use=nope", &MacroTable::new(), "test").unwrap_err();
        assert!(matches!(err, RowforgeError::UnknownMacro { .. }));
    }

    #[test]
    fn test_drain_and_finish() {
        let mut map = tokenize("size=10 extra=1", &MacroTable::new(), "test").unwrap();
        assert_eq!(map.take_int("size", "test").unwrap(), Some(10));
        let err = map.finish("test").unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("extra"), "error should name the key: {}", msg);
    }

    #[test]
    fn test_take_int_rejects_float() {
        let mut map = tokenize("size=17.3", &MacroTable::new(), "test").unwrap();
        assert!(map.take_int("size", "test").is_err());
    }

    #[test]
    fn test_take_float_accepts_int() {
        let mut map = tokenize("null=1", &MacroTable::new(), "test").unwrap();
        assert_eq!(map.take_float("null", "test").unwrap(), Some(1.0));
    }

    #[test]
    fn test_builtin_macros_present() {
        let macros = builtin_macros();
        for name in ["cfr", "cen", "french", "english"] {
            assert!(macros.contains_key(name), "missing builtin {}", name);
        }
        assert_eq!(
            macros["cfr"].get("sub"),
            Some(&DirectiveValue::Text("scale".to_string()))
        );
    }
}
