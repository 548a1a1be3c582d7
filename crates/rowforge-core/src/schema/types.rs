//! # Schema Metadata Model
//!
//! The structured descriptors the scanner hands to the generator engine:
//! tables, attributes, constraint flags, foreign-key references and their
//! attached directive maps. Everything here is plain data; generator binding
//! lives in `generate::engine`.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::config::RunConfig;
use crate::directive::{DirectiveMap, DirectiveValue, MacroTable};
use crate::error::{Result, RowforgeError};

/// A foreign-key reference to a unique attribute elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct FkRef {
    pub table: String,
    /// Referenced attribute; `None` means the target's primary key.
    pub attribute: Option<String>,
}

/// One attribute (column) of a table.
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    pub name: String,
    pub quoted: bool,
    /// 1-based declaration position.
    pub number: usize,
    /// Lowercased SQL type text, e.g. `varchar(20)`.
    pub type_text: String,
    pub is_pk: bool,
    pub is_unique: bool,
    pub not_null: bool,
    pub is_enum: bool,
    pub fk: Option<FkRef>,
    pub directives: DirectiveMap,
    /// Resolved domain size; filled by [`Schema::resolve_sizes`].
    pub size: Option<i64>,
}

impl Attribute {
    pub fn new(name: &str, number: usize, type_text: &str) -> Self {
        let (name, quoted) = unquote(name);
        Attribute {
            name,
            quoted,
            number,
            type_text: type_text.to_lowercase(),
            is_pk: false,
            is_unique: false,
            not_null: false,
            is_enum: false,
            fk: None,
            directives: DirectiveMap::new(),
            size: None,
        }
    }

    /// PK or UNIQUE: the attribute participates in a key.
    pub fn is_unique_role(&self) -> bool {
        self.is_pk || self.is_unique
    }

    pub fn is_nullable(&self) -> bool {
        !self.not_null && !self.is_pk
    }

    pub fn is_serial(&self) -> bool {
        is_serial_type(&self.type_text)
    }

    pub fn display_name(&self) -> String {
        if self.quoted {
            format!("\"{}\"", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// A relational table: ordered attributes, compound uniqueness constraints,
/// resolved row count and skip probability.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub quoted: bool,
    pub attributes: Vec<Attribute>,
    /// Compound uniqueness constraints as 0-based attribute index sets.
    /// Single-attribute constraints are carried as flags on the attribute.
    pub uniques: Vec<Vec<usize>>,
    pub size: Option<i64>,
    pub skip: f64,
    pub directives: DirectiveMap,
}

impl Table {
    pub fn new(name: &str) -> Self {
        let (name, quoted) = unquote(name);
        Table {
            name,
            quoted,
            attributes: Vec::new(),
            uniques: Vec::new(),
            size: None,
            skip: 0.0,
            directives: DirectiveMap::new(),
        }
    }

    pub fn display_name(&self) -> String {
        if self.quoted {
            format!("\"{}\"", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        let lower = name.trim_matches('"').trim_matches('`').to_lowercase();
        self.attributes.iter().position(|a| a.name == lower)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attribute_index(name).map(|i| &self.attributes[i])
    }

    pub fn pk(&self) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_pk)
    }

    /// Register a UNIQUE / PRIMARY KEY constraint over the named attributes.
    /// A one-attribute constraint becomes a flag; larger sets are recorded as
    /// index sets checked per generated row.
    pub fn add_unique(&mut self, names: &[&str], kind: UniqueKind) -> Result<()> {
        if names.is_empty() {
            return Err(RowforgeError::Scan {
                message: format!("table {}: empty unique constraint", self.name),
            });
        }
        if names.len() == 1 {
            let ix = self.attribute_index(names[0]).ok_or_else(|| RowforgeError::Scan {
                message: format!("table {}: unknown attribute {}", self.name, names[0]),
            })?;
            let att = &mut self.attributes[ix];
            match kind {
                UniqueKind::Unique => att.is_unique = true,
                UniqueKind::PrimaryKey => {
                    att.is_pk = true;
                    att.not_null = true;
                }
            }
        } else {
            let mut set = Vec::with_capacity(names.len());
            for n in names {
                let ix = self.attribute_index(n).ok_or_else(|| RowforgeError::Scan {
                    message: format!("table {}: unknown attribute {}", self.name, n),
                })?;
                set.push(ix);
            }
            self.uniques.push(set);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKind {
    Unique,
    PrimaryKey,
}

/// The whole scanned schema: tables in declaration order, enum types, the
/// macro table collected from directives, and schema-level directives.
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub enums: IndexMap<String, Vec<String>>,
    #[serde(skip)]
    pub macros: MacroTable,
    pub directives: DirectiveMap,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        let lower = name.trim_matches('"').trim_matches('`').to_lowercase();
        self.tables.iter().find(|t| t.name.to_lowercase() == lower)
    }

    /// Resolve table and attribute sizes, skip rates and foreign-key
    /// directive propagation. Tables are processed in declaration order: a
    /// referencing table's domain size depends on the referenced table's
    /// already-finalized size.
    pub fn resolve_sizes(&mut self, config: &RunConfig) -> Result<()> {
        let global = config.resolved_size();
        for t in &mut self.tables {
            let owner = format!("table {}", t.name);
            if let Some(skip) = t.directives.take_float("skip", &owner)? {
                if !(0.0..=1.0).contains(&skip) {
                    return Err(RowforgeError::directive(
                        &owner,
                        "skip",
                        format!("{} not in [0,1]", skip),
                    ));
                }
                t.skip = skip;
            }
            if t.directives.contains("size") && t.directives.contains("mult") {
                return Err(RowforgeError::directive(
                    &owner,
                    "size",
                    "must not have both 'mult' and 'size'",
                ));
            }
            if t.size.is_none() {
                t.size = Some(if let Some(s) = t.directives.take_int("size", &owner)? {
                    s
                } else if let Some(m) = t.directives.take_float("mult", &owner)? {
                    (m * global as f64) as i64
                } else {
                    global
                });
            }
        }

        // Attribute sizes need the referenced tables finalized first, so this
        // is a second pass over an immutable snapshot of table sizes.
        let sizes: IndexMap<String, (i64, f64)> = self
            .tables
            .iter()
            .map(|t| (t.name.to_lowercase(), (t.size.unwrap_or(global), t.skip)))
            .collect();
        let key_directives: IndexMap<String, DirectiveMap> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.attributes.iter().map(move |a| {
                    (
                        format!("{}.{}", t.name.to_lowercase(), a.name.to_lowercase()),
                        a.directives.clone(),
                    )
                })
            })
            .collect();
        let key_flags: IndexMap<String, (bool, String)> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.attributes.iter().map(move |a| {
                    (
                        format!("{}.{}", t.name.to_lowercase(), a.name.to_lowercase()),
                        (a.is_unique_role(), a.name.clone()),
                    )
                })
            })
            .collect();
        let pks: IndexMap<String, String> = self
            .tables
            .iter()
            .filter_map(|t| t.pk().map(|a| (t.name.to_lowercase(), a.name.to_lowercase())))
            .collect();

        for t in &mut self.tables {
            let table_size = t.size.unwrap_or(global);
            let table_null = t.directives.get("null").cloned();
            for a in &mut t.attributes {
                let owner = format!("Attribute {}.{}", t.name, a.name);
                if a.directives.contains("size") && a.directives.contains("mult") {
                    return Err(RowforgeError::directive(
                        &owner,
                        "size",
                        "must not have both 'mult' and 'size'",
                    ));
                }
                if let Some(fk) = &a.fk {
                    let fk_table = fk.table.trim_matches('"').to_lowercase();
                    let (fk_size, fk_skip) =
                        *sizes.get(&fk_table).ok_or_else(|| RowforgeError::Scan {
                            message: format!("{}: unknown referenced table {}", owner, fk.table),
                        })?;
                    if fk_skip > 0.0 {
                        return Err(RowforgeError::Unsupported {
                            table: fk_table.clone(),
                            message: "referenced table has skipped tuples".to_string(),
                        });
                    }
                    let key_name = match &fk.attribute {
                        Some(att) => att.trim_matches('"').to_lowercase(),
                        None => pks
                            .get(&fk_table)
                            .cloned()
                            .ok_or_else(|| RowforgeError::Scan {
                                message: format!("{}: table {} has no primary key", owner, fk_table),
                            })?,
                    };
                    let key = format!("{}.{}", fk_table, key_name);
                    let (unique, base_name) =
                        key_flags.get(&key).cloned().ok_or_else(|| RowforgeError::Scan {
                            message: format!("{}: unknown referenced attribute {}", owner, key),
                        })?;
                    if !unique {
                        return Err(RowforgeError::Scan {
                            message: format!("{}: foreign key target {} must be unique", owner, key),
                        });
                    }
                    a.size = Some(fk_size);
                    let key_dirs = &key_directives[&key];
                    if is_text_type(&a.type_text) {
                        if a.directives.contains("prefix") {
                            return Err(RowforgeError::directive(
                                &owner,
                                "prefix",
                                "no prefix on a foreign key attribute",
                            ));
                        }
                        let prefix = key_dirs
                            .get("prefix")
                            .map(|v| v.as_text())
                            .unwrap_or(base_name);
                        a.directives.insert("prefix", DirectiveValue::Text(prefix));
                    }
                    a.directives.merge_missing(key_dirs);
                } else if let Some(v) = a.directives.get("size") {
                    // Left in the map: the bound generator consumes it.
                    a.size = v.as_int();
                } else if a.size.is_none() {
                    let mult = a.directives.take_float("mult", &owner)?.unwrap_or(1.0);
                    a.size = Some((table_size as f64 * mult) as i64);
                }
                // Nullable attributes fall back to the table-level null rate.
                if a.is_nullable() && !a.directives.contains("null") {
                    if let Some(v) = &table_null {
                        a.directives.insert("null", v.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

fn unquote(name: &str) -> (String, bool) {
    let quoted = name.starts_with('"') || name.starts_with('`');
    if quoted {
        (name[1..name.len() - 1].to_string(), true)
    } else {
        (name.to_lowercase(), false)
    }
}

// Type predicates; the scanner already lowercased the type text.

static RE_SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((small|big)?serial|serial[248])$").unwrap());
static RE_INT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((small|big)?serial|serial[248]|(tiny|small|medium)int|int[248]|integer|int)$")
        .unwrap()
});
static RE_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(text|(var)?char\(\d+\))$").unwrap());
static RE_FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(real|float|double\s+precision|numeric|decimal)$").unwrap());
static RE_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^timestamp(\s+with\s+time\s+zone)?$").unwrap());
static RE_BLOB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(bytea|blob)$").unwrap());
static RE_BIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(var)?bit\(\d+\)$").unwrap());
static RE_EAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(ean13|is[bms]n(13)?|upc)$").unwrap());

pub fn is_serial_type(t: &str) -> bool {
    RE_SERIAL.is_match(t)
}

pub fn is_int_type(t: &str) -> bool {
    RE_INT.is_match(t)
}

pub fn is_text_type(t: &str) -> bool {
    RE_TEXT.is_match(t)
}

pub fn is_bool_type(t: &str) -> bool {
    t == "bool" || t == "boolean"
}

pub fn is_date_type(t: &str) -> bool {
    t == "date"
}

pub fn is_interval_type(t: &str) -> bool {
    t == "interval"
}

pub fn is_timestamp_type(t: &str) -> bool {
    RE_TIMESTAMP.is_match(t)
}

pub fn is_float_type(t: &str) -> bool {
    RE_FLOAT.is_match(t)
}

pub fn is_blob_type(t: &str) -> bool {
    RE_BLOB.is_match(t)
}

pub fn is_inet_type(t: &str) -> bool {
    t == "inet" || t == "cidr"
}

pub fn is_mac_type(t: &str) -> bool {
    t == "macaddr"
}

pub fn is_uuid_type(t: &str) -> bool {
    t == "uuid"
}

pub fn is_bit_type(t: &str) -> bool {
    RE_BIT.is_match(t)
}

pub fn is_array_type(t: &str) -> bool {
    t.contains('[') || t.to_uppercase().contains(" ARRAY")
}

/// Code length of an EAN-family type, or `None` when the type is not one.
pub fn ean_length(t: &str) -> Option<usize> {
    if !RE_EAN.is_match(t) {
        return None;
    }
    Some(match t {
        "upc" => 12,
        "issn" => 8,
        t if t.ends_with("13") => 13,
        _ => 10, // isbn, ismn
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_predicates() {
        assert!(is_serial_type("serial"));
        assert!(is_serial_type("bigserial"));
        assert!(is_int_type("int"));
        assert!(is_int_type("serial8"));
        assert!(!is_int_type("text"));
        assert!(is_text_type("varchar(20)"));
        assert!(is_text_type("char(5)"));
        assert!(is_float_type("double precision"));
        assert!(is_timestamp_type("timestamp with time zone"));
        assert!(is_bit_type("varbit(7)"));
        assert!(is_array_type("int[2]"));
        assert!(is_array_type("text array"));
    }

    #[test]
    fn test_ean_lengths() {
        assert_eq!(ean_length("ean13"), Some(13));
        assert_eq!(ean_length("upc"), Some(12));
        assert_eq!(ean_length("issn"), Some(8));
        assert_eq!(ean_length("isbn"), Some(10));
        assert_eq!(ean_length("isbn13"), Some(13));
        assert_eq!(ean_length("int"), None);
    }

    #[test]
    fn test_add_unique_single_sets_flags() {
        let mut t = Table::new("foo");
        t.attributes.push(Attribute::new("id", 1, "int"));
        t.add_unique(&["id"], UniqueKind::PrimaryKey).unwrap();
        assert!(t.attributes[0].is_pk);
        assert!(t.attributes[0].not_null);
        assert!(t.uniques.is_empty());
    }

    #[test]
    fn test_add_unique_compound_records_indices() {
        let mut t = Table::new("foo");
        t.attributes.push(Attribute::new("a", 1, "int"));
        t.attributes.push(Attribute::new("b", 2, "int"));
        t.add_unique(&["b", "a"], UniqueKind::Unique).unwrap();
        assert_eq!(t.uniques, vec![vec![1, 0]]);
    }

    #[test]
    fn test_quoted_names() {
        let t = Table::new("\"MyTable\"");
        assert_eq!(t.name, "MyTable");
        assert_eq!(t.display_name(), "\"MyTable\"");
        let t = Table::new("Foo");
        assert_eq!(t.name, "foo");
    }
}
