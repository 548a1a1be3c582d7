//! # Schema Scanner
//!
//! Extracts tables, attributes, constraints and `-- rf` directives from SQL
//! text with optimistic regular expressions. This is deliberately not an SQL
//! parser: it scans line by line for the forms that matter (CREATE TABLE,
//! column declarations, constraint clauses, ALTER TABLE additions, enum
//! types) and attaches directives found in comments to the most recently
//! declared object, or to an explicitly referenced one.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

use crate::config::RunConfig;
use crate::directive::{builtin_macros, tokenize, DirectiveMap, MacroTable};
use crate::error::{Result, RowforgeError};
use crate::generate::node::GENERATOR_NAMES;
use crate::schema::types::{Attribute, FkRef, Schema, Table, UniqueKind};

const IDENT: &str = r#""[^"]+"|`[^`]+`|[a-z0-9_]+"#;

fn ident2() -> String {
    format!(r#"({0})\.({0})|{0}"#, IDENT)
}

// predefined SQL types, kept as one big alternation like the type predicates
const RE_SER: &str = r"(SMALL|BIG)?SERIAL|SERIAL[248]";
const RE_FLT: &str = r"REAL|FLOAT|DOUBLE\s+PRECISION|NUMERIC|DECIMAL";
const RE_TXT: &str = r"TEXT|CHAR\(\d+\)|VARCHAR\(\d+\)";
const RE_BIT: &str = r"BIT\(\d+\)|VARBIT\(\d+\)";
const RE_TIM: &str = r"DATE|TIMESTAMP(\s+WITH\s+TIME\s+ZONE)?|INTERVAL";
const RE_GEO: &str = r"POINT|LINE|LSEG|BOX|PATH|POLYGON|CIRCLE";

fn type_alternation() -> String {
    format!(
        r"{ser}|(TINY|SMALL|MEDIUM)INT|INT[248]|INTEGER|INT\b|{flt}|{txt}|{bit}|{tim}|BOOL(EAN)?|BYTEA|BLOB|INET|CIDR|MACADDR|EAN13|IS[BMS]N(13)?|UPC|{geo}|UUID",
        ser = RE_SER,
        flt = RE_FLT,
        txt = RE_TXT,
        bit = RE_BIT,
        tim = RE_TIM,
        geo = RE_GEO,
    )
}

const RE_ARRAY: &str = r"((\s+ARRAY)?(\s*\[[\]\[0-9 ]*\])?)?";

static RE_JUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".*?--.*-\s*rf.*").unwrap());
static RE_DIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r".*--\s*rf[^:]*:\s*(.*)").unwrap());
static RE_MAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*--\s*rf\s+([\w.]+)\s*:\s*(.*)").unwrap());
static RE_TAB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i).*--\s*rf[^:]*\s+(t|table)=({})(\s|:)",
        ident2()
    ))
    .unwrap()
});
static RE_ATT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i).*--\s*rf[^:]*\s+(a|att|attribute)=({})(\s|:)",
        IDENT
    ))
    .unwrap()
});
static RE_NEW_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(CREATE|ALTER|DROP|SELECT|INSERT|UPDATE|DELETE|SET|GRANT|REVOKE|SHOW)\s")
        .unwrap()
});
static RE_CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*CREATE\s+TABLE\s*({})\s*\(", ident2())).unwrap()
});
static RE_CREATE_ENUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*CREATE\s+TYPE\s+({})\s+AS\s+ENUM",
        ident2()
    ))
    .unwrap()
});
static RE_CREATE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\s*CREATE\s+TYPE\s+({})\s+AS", ident2())).unwrap()
});
static RE_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*,?\s*(ADD\s+COLUMN\s+)?({})\s+(({}){})",
        IDENT,
        type_alternation(),
        RE_ARRAY
    ))
    .unwrap()
});
static RE_PRIMARY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i).*\sPRIMARY\s+KEY").unwrap());
static RE_UNIQUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i).*\sUNIQUE").unwrap());
static RE_NOT_NULL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i).*\sNOT\s+NULL").unwrap());
static RE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i).*\sREFERENCES\s+({})\s*(\(({})\))?",
        ident2(),
        IDENT
    ))
    .unwrap()
});
static RE_UNICITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i).*(UNIQUE|PRIMARY\s+KEY)\s*\(([^)]+)\)").unwrap());
static RE_ALTER_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\s*ALTER\s+TABLE\s+(ONLY\s+)?({})", ident2())).unwrap()
});
static RE_ADD_UNIQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i),?\s*ADD\s+CONSTRAINT\s+({})\s+.*(UNIQUE|PRIMARY\s+KEY)\s*\(([^)]+)\)",
        IDENT
    ))
    .unwrap()
});
static RE_ADD_FK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i),?\s*ADD\s+CONSTRAINT\s+({})\s+FOREIGN\s+KEY\s*\(([^)]+)\).*\sREFERENCES\s+({})\s*(\(({})\))?",
        IDENT,
        ident2(),
        IDENT
    ))
    .unwrap()
});
static RE_ALTER_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i),?\s*ALTER\s+COLUMN\s+({})", IDENT)).unwrap()
});
static RE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.*?)\s*--.*").unwrap());
static RE_BACKSLASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\\").unwrap());
static RE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^']*'(([^']|'')*)'(.*)").unwrap());

/// Extract the unquoted SQL string literals of one line.
fn sql_string_list(mut line: &str) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(c) = RE_QUOTED.captures(line) {
        out.push(c[1].replace("''", "'"));
        let rest = c.get(3).unwrap();
        line = &line[rest.start()..rest.end()];
    }
    out
}

fn normalize(name: &str) -> String {
    name.trim_matches('"').trim_matches('`').to_lowercase()
}

struct Scanner {
    tables: Vec<Table>,
    by_name: IndexMap<String, usize>,
    enums: IndexMap<String, Vec<String>>,
    macros: MacroTable,
    schema_dirs: DirectiveMap,
    custom_types: Vec<String>,
    column_enum: Option<Regex>,
    column_type: Option<Regex>,
    current_table: Option<usize>,
    current_att: Option<(usize, usize)>,
    current_enum: Option<String>,
    att_number: usize,
}

impl Scanner {
    fn new(custom_types: &[String]) -> Result<Scanner> {
        let mut scanner = Scanner {
            tables: Vec::new(),
            by_name: IndexMap::new(),
            enums: IndexMap::new(),
            macros: builtin_macros(),
            schema_dirs: DirectiveMap::new(),
            custom_types: Vec::new(),
            column_enum: None,
            column_type: None,
            current_table: None,
            current_att: None,
            current_enum: None,
            att_number: 0,
        };
        for t in custom_types {
            scanner.add_type(t)?;
        }
        Ok(scanner)
    }

    fn add_type(&mut self, name: &str) -> Result<()> {
        self.custom_types.push(normalize(name));
        let alternation = self
            .custom_types
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let re = format!(
            r"(?i)^\s*,?\s*(ADD\s+COLUMN\s+)?({})\s+(({}){})",
            IDENT, alternation, RE_ARRAY
        );
        self.column_type = Some(Regex::new(&re).map_err(|e| RowforgeError::Scan {
            message: format!("bad custom type '{}': {}", name, e),
        })?);
        Ok(())
    }

    fn add_enum(&mut self, name: &str) -> Result<()> {
        let alternation = self
            .enums
            .keys()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let re = format!(
            r"(?i)^\s*,?\s*(ADD\s+COLUMN\s+)?({})\s+({})",
            IDENT, alternation
        );
        self.column_enum = Some(Regex::new(&re).map_err(|e| RowforgeError::Scan {
            message: format!("bad enum type '{}': {}", name, e),
        })?);
        Ok(())
    }

    fn table_index(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(&normalize(name))
            .copied()
            .ok_or_else(|| RowforgeError::Scan {
                message: format!("unknown table '{}'", name),
            })
    }

    fn apply_directives(&mut self, text: &str) -> Result<()> {
        let dirs = tokenize(text, &self.macros, "directive")?;
        if let Some((t, a)) = self.current_att {
            self.tables[t].attributes[a].directives.merge(&dirs);
        } else if let Some(t) = self.current_table {
            self.tables[t].directives.merge(&dirs);
        } else {
            self.schema_dirs.merge(&dirs);
            // custom types may be declared at the schema level
            if let Some(t) = self.schema_dirs.take_text("type") {
                self.add_type(&t)?;
            }
        }
        Ok(())
    }

    fn scan_line(&mut self, raw: &str) -> Result<()> {
        // skip psql backslash commands and commented-out directives
        if RE_BACKSLASH.is_match(raw) || RE_JUNK.is_match(raw) {
            return Ok(());
        }
        // explicit object references inside directives
        if let Some(c) = RE_TAB.captures(raw) {
            let ix = self.table_index(&c[2])?;
            self.current_table = Some(ix);
            self.current_att = None;
        }
        if let Some(c) = RE_ATT.captures(raw) {
            let t = self.current_table.ok_or_else(|| RowforgeError::Scan {
                message: format!("attribute directive without a table: {}", raw.trim()),
            })?;
            let a = self.tables[t]
                .attribute_index(&c[2])
                .ok_or_else(|| RowforgeError::Scan {
                    message: format!("unknown attribute '{}'", &c[2]),
                })?;
            self.current_att = Some((t, a));
        }
        // plain directive and macro definition; a macro resets the pending
        // directive so it is not attached to an object
        let mut pending = RE_DIR.captures(raw).map(|c| c[1].to_string());
        if let Some(c) = RE_MAC.captures(raw) {
            let name = c[1].to_string();
            if GENERATOR_NAMES.contains(&name.as_str()) {
                return Err(RowforgeError::Scan {
                    message: format!("do not use generator name '{}' as a macro name", name),
                });
            }
            if self.macros.contains_key(&name) {
                warn!("macro {} is redefined", name);
            }
            let map = tokenize(&c[2], &self.macros, &name)?;
            self.macros.insert(name, map);
            pending = None;
        }

        // strip the SQL comment before structural matching
        let line = match RE_COMMENT.captures(raw) {
            Some(c) => c[1].to_string(),
            None => raw.to_string(),
        };

        // a new SQL object resets the focus, except ALTER ... ALTER COLUMN
        if RE_NEW_OBJECT.is_match(&line) && !RE_ALTER_COLUMN.is_match(&line) {
            self.current_table = None;
            self.current_att = None;
            self.current_enum = None;
            self.att_number = 0;
        }

        if let Some(c) = RE_CREATE_ENUM.captures(&line) {
            let name = normalize(&c[1]);
            self.enums.insert(name.clone(), sql_string_list(&line));
            self.add_enum(&name)?;
            self.current_enum = Some(name);
            return Ok(());
        }
        if let Some(name) = self.current_enum.clone() {
            let labels = sql_string_list(&line);
            self.enums.get_mut(&name).expect("tracked enum").extend(labels);
            return Ok(());
        }
        if let Some(c) = RE_CREATE_TYPE.captures(&line) {
            self.add_type(&normalize(&c[1]))?;
            return Ok(());
        }

        if let Some(c) = RE_ALTER_TABLE.captures(&line) {
            let ix = self.table_index(&c[2])?;
            self.current_table = Some(ix);
            self.att_number = self.tables[ix].attributes.len();
        }
        if let Some(c) = RE_CREATE_TABLE.captures(&line) {
            let table = Table::new(&c[1]);
            self.by_name.insert(normalize(&c[1]), self.tables.len());
            self.current_table = Some(self.tables.len());
            self.tables.push(table);
        } else if let Some(t) = self.current_table {
            // column declaration: predefined types, then enums, then customs
            let mut is_enum = false;
            let mut col = RE_COLUMN.captures(&line);
            if col.is_none() {
                if let Some(re) = &self.column_enum {
                    col = re.captures(&line);
                    is_enum = col.is_some();
                }
            }
            if col.is_none() {
                if let Some(re) = &self.column_type {
                    col = re.captures(&line);
                }
            }
            if let Some(c) = col {
                self.att_number += 1;
                let mut att = Attribute::new(&c[2], self.att_number, &c[3]);
                att.is_enum = is_enum;
                if RE_PRIMARY_KEY.is_match(&line) {
                    att.is_pk = true;
                    att.not_null = true;
                }
                if RE_UNIQUE.is_match(&line) {
                    att.is_unique = true;
                }
                if RE_NOT_NULL.is_match(&line) {
                    att.not_null = true;
                }
                if let Some(r) = RE_REFERENCE.captures(&line) {
                    att.fk = Some(FkRef {
                        table: normalize(&r[1]),
                        attribute: r.get(4).and_then(|_| r.get(5)).map(|m| m.as_str().to_string()),
                    });
                }
                let a = self.tables[t].attributes.len();
                self.tables[t].attributes.push(att);
                self.current_att = Some((t, a));
            }
            if let Some(c) = RE_ADD_UNIQUE.captures(&line) {
                let names: Vec<&str> = split_name_list(&c[3]);
                let kind = unique_kind(&c[2]);
                self.tables[t].add_unique(&names, kind)?;
            } else if let Some(c) = RE_UNICITY.captures(&line) {
                let names: Vec<&str> = split_name_list(&c[2]);
                let kind = unique_kind(&c[1]);
                self.tables[t].add_unique(&names, kind)?;
            }
            if let Some(c) = RE_ADD_FK.captures(&line) {
                let src = normalize(c[2].trim());
                let a = self.tables[t]
                    .attribute_index(&src)
                    .ok_or_else(|| RowforgeError::Scan {
                        message: format!("unknown attribute '{}'", src),
                    })?;
                self.tables[t].attributes[a].fk = Some(FkRef {
                    table: normalize(&c[3]),
                    attribute: c.get(6).and_then(|_| c.get(7)).map(|m| m.as_str().to_string()),
                });
                self.current_att = Some((t, a));
            }
            if let Some(c) = RE_ALTER_COLUMN.captures(&line) {
                let a = self.tables[t]
                    .attribute_index(&c[1])
                    .ok_or_else(|| RowforgeError::Scan {
                        message: format!("unknown attribute '{}'", &c[1]),
                    })?;
                self.current_att = Some((t, a));
                if RE_NOT_NULL.is_match(&line) {
                    self.tables[t].attributes[a].not_null = true;
                }
            }
        }

        // a directive on the same line as its object attaches to it
        if let Some(text) = pending {
            self.apply_directives(&text)?;
        }
        Ok(())
    }
}

fn split_name_list(s: &str) -> Vec<&str> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|n| !n.is_empty())
        .collect()
}

fn unique_kind(s: &str) -> UniqueKind {
    if s.to_lowercase() == "unique" {
        UniqueKind::Unique
    } else {
        UniqueKind::PrimaryKey
    }
}

/// Scan SQL schema text into the metadata model. The result still needs
/// [`RunConfig::finalize`] (schema-level directives) and
/// [`Schema::resolve_sizes`] before generators can be bound.
pub fn scan_schema(lines: &[String], config: &RunConfig) -> Result<Schema> {
    let mut scanner = Scanner::new(&config.custom_types)?;
    for line in lines {
        scanner.scan_line(line)?;
    }
    Ok(Schema {
        tables: scanner.tables,
        enums: scanner.enums,
        macros: scanner.macros,
        directives: scanner.schema_dirs,
    })
}
