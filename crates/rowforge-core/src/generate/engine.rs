//! # Row Assembly
//!
//! Binds each table's attributes to generator trees, then produces rows one
//! at a time under the uniqueness-retry protocol:
//!
//! 1. advance the row tick and resynchronize shares across the table's trees;
//! 2. draw one value per non-suppressed attribute, in declaration order;
//! 3. fingerprint every uniqueness constraint against the accepted set;
//! 4. on a collision, burn a fresh tick and redraw; unique-role and
//!    serial-typed attributes replay their first-attempt value instead, so
//!    monotonic key columns do not drift across retries;
//! 5. exhausting the retry budget is fatal for the table.

use tracing::warn;

use crate::error::{Result, RowforgeError};
use crate::generate::context::GenerationContext;
use crate::generate::node::{
    build_enum_generator, build_generator, find_directive_generator, kind_for_type,
    macro_generator, Generator,
};
use crate::generate::unique::{fingerprint, FingerprintSet};
use crate::generate::value::Value;
use crate::schema::types::{Schema, Table};

/// A serial attribute's sequence restart point: `offset + size`.
#[derive(Debug, Clone)]
pub struct SequenceRestart {
    pub attribute: String,
    pub quoted: bool,
    pub restart: i64,
}

/// One table bound to its generator trees, ready to produce rows.
pub struct BoundTable {
    pub name: String,
    pub display_name: String,
    pub size: i64,
    pub skip: f64,
    pub nogen: bool,
    /// Display names of the generated attributes, in declaration order.
    pub columns: Vec<String>,
    pub sequences: Vec<SequenceRestart>,
    gens: Vec<Option<Generator>>,
    replay: Vec<bool>,
    constraints: Vec<Vec<usize>>,
    fingerprints: FingerprintSet,
}

/// Bind every table of the schema, in declaration order. All generators are
/// constructed (and all configuration errors surface) before any row is
/// produced. [`Schema::resolve_sizes`] must have run first.
pub fn bind_schema(ctx: &mut GenerationContext, schema: &Schema) -> Result<Vec<BoundTable>> {
    schema
        .tables
        .iter()
        .map(|t| bind_table(ctx, schema, t))
        .collect()
}

fn bind_table(ctx: &mut GenerationContext, schema: &Schema, table: &Table) -> Result<BoundTable> {
    let mut table_dirs = table.directives.clone();
    let nogen = table_dirs.take_flag("nogen", &format!("table {}", table.name))?;

    let mut gens: Vec<Option<Generator>> = Vec::with_capacity(table.attributes.len());
    let mut replay = Vec::with_capacity(table.attributes.len());
    let mut suppressed = false;

    if !nogen {
        for att in &table.attributes {
            let label = format!("Attribute {}.{}", table.name, att.name);
            let mut dirs = att.directives.clone();
            if dirs.take_flag("nogen", &label)? {
                dirs.finish(&label)?;
                gens.push(None);
                replay.push(false);
                suppressed = true;
                continue;
            }
            let g = if let Some(kind) = find_directive_generator(&dirs, &label)? {
                build_generator(ctx, Some(att), Some(&kind), dirs, &label)?
            } else if att.is_enum {
                let labels = schema
                    .enums
                    .get(&att.type_text)
                    .cloned()
                    .ok_or_else(|| RowforgeError::NoGenerator {
                        owner: label.clone(),
                        type_text: att.type_text.clone(),
                    })?;
                build_enum_generator(ctx, Some(att), labels, &label)?
            } else if let Some(kind) = kind_for_type(&att.type_text) {
                build_generator(ctx, Some(att), Some(kind), dirs, &label)?
            } else if ctx.macros.contains_key(&att.type_text) {
                // a macro homonymous to the type name acts as its generator
                let name = att.type_text.clone();
                macro_generator(ctx, &name, Some(att), &label)?
            } else {
                return Err(RowforgeError::NoGenerator {
                    owner: label,
                    type_text: att.type_text.clone(),
                });
            };
            gens.push(Some(g));
            replay.push(att.is_unique_role() || att.is_serial());
        }
    }

    // Uniqueness constraints: one singleton set per key attribute, then the
    // declared compound sets. Suppressed attributes cannot be mapped back to
    // candidate-row positions for compound constraints; that combination is
    // rejected rather than guessed at.
    let mut constraints: Vec<Vec<usize>> = Vec::new();
    for (i, att) in table.attributes.iter().enumerate() {
        if att.is_unique_role() && gens.get(i).map(|g| g.is_some()).unwrap_or(false) {
            constraints.push(vec![i]);
        }
    }
    if suppressed && !table.uniques.is_empty() {
        return Err(RowforgeError::Unsupported {
            table: table.name.clone(),
            message: "compound unique constraints over tables with suppressed attributes are not supported"
                .to_string(),
        });
    }
    constraints.extend(table.uniques.iter().cloned());

    let sequences = table
        .attributes
        .iter()
        .zip(&gens)
        .filter(|(att, g)| att.is_serial() && g.is_some())
        .filter_map(|(att, g)| {
            let draw = g.as_ref().and_then(|g| g.int_draw())?;
            Some(SequenceRestart {
                attribute: att.name.clone(),
                quoted: att.quoted,
                restart: draw.offset + draw.size().unwrap_or(0),
            })
        })
        .collect();

    let columns = table
        .attributes
        .iter()
        .zip(&gens)
        .filter(|(_, g)| g.is_some())
        .map(|(att, _)| att.display_name())
        .collect();

    Ok(BoundTable {
        name: table.name.clone(),
        display_name: table.display_name(),
        size: table.size.unwrap_or(0),
        skip: table.skip,
        nogen,
        columns,
        sequences,
        gens,
        replay,
        constraints,
        fingerprints: FingerprintSet::new(),
    })
}

impl BoundTable {
    /// Produce the next accepted row: the generated attributes' values in
    /// declaration order.
    pub fn next_row(&mut self, ctx: &mut GenerationContext) -> Result<Vec<Value>> {
        self.tick(ctx)?;
        let first = self.draw_all(ctx)?;
        let mut current = first.clone();
        let tries = ctx.config.tries.max(1);
        for attempt in 0..tries {
            let mut staged: Vec<String> = Vec::new();
            let mut collision = false;
            for (ci, cols) in self.constraints.iter().enumerate() {
                let mut vals: Vec<&Value> = Vec::with_capacity(cols.len());
                for &i in cols {
                    match current.get(i).and_then(|v| v.as_ref()) {
                        Some(v) => vals.push(v),
                        None => {
                            return Err(RowforgeError::Unsupported {
                                table: self.name.clone(),
                                message: "unique constraint over a suppressed attribute"
                                    .to_string(),
                            })
                        }
                    }
                }
                let fp = fingerprint(ci, &vals);
                if self.fingerprints.contains(&fp) {
                    collision = true;
                    break;
                }
                staged.push(fp);
            }
            if !collision {
                for fp in staged {
                    self.fingerprints.record(fp);
                }
                return Ok(current.into_iter().flatten().collect());
            }
            if attempt + 1 == tries {
                break;
            }
            warn!(
                "table {}: unique collision at row {}, retrying ({}/{})",
                self.name,
                ctx.row_id,
                attempt + 1,
                tries
            );
            // a fresh tick, not a reuse: counter-bound generators must not
            // regenerate the identical colliding values
            self.tick(ctx)?;
            for (i, gen) in self.gens.iter_mut().enumerate() {
                if let Some(g) = gen {
                    if !self.replay[i] {
                        current[i] = Some(g.draw(ctx)?);
                    }
                }
            }
        }
        Err(RowforgeError::UniqueExhausted {
            table: self.name.clone(),
            tries,
        })
    }

    fn tick(&mut self, ctx: &mut GenerationContext) -> Result<()> {
        ctx.advance_row();
        for g in self.gens.iter_mut().flatten() {
            g.sync_row(ctx)?;
        }
        Ok(())
    }

    fn draw_all(&mut self, ctx: &mut GenerationContext) -> Result<Vec<Option<Value>>> {
        let mut row = Vec::with_capacity(self.gens.len());
        for gen in &mut self.gens {
            row.push(match gen {
                Some(g) => Some(g.draw(ctx)?),
                None => None,
            });
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::directive::{builtin_macros, tokenize, MacroTable};
    use crate::schema::types::{Attribute, UniqueKind};
    use indexmap::IndexMap;

    fn ctx(seed: &str) -> GenerationContext {
        let config = RunConfig {
            seed: Some(seed.to_string()),
            size: Some(100),
            ..RunConfig::default()
        };
        GenerationContext::new(config, builtin_macros())
    }

    fn schema_of(table: Table) -> Schema {
        Schema {
            tables: vec![table],
            enums: IndexMap::new(),
            macros: builtin_macros(),
            directives: Default::default(),
        }
    }

    fn attribute(name: &str, number: usize, type_text: &str, dirs: &str) -> Attribute {
        let mut a = Attribute::new(name, number, type_text);
        a.directives = tokenize(dirs, &MacroTable::new(), name).unwrap();
        a
    }

    fn table(name: &str, size: i64, atts: Vec<Attribute>) -> Table {
        let mut t = Table::new(name);
        t.size = Some(size);
        t.attributes = atts;
        t
    }

    #[test]
    fn test_serial_pk_is_a_permutation() {
        let mut id = attribute("id", 1, "serial", "");
        id.size = Some(5);
        let mut x = attribute("x", 2, "int", "");
        x.size = Some(5);
        let mut t = table("t", 5, vec![id, x]);
        t.add_unique(&["id"], UniqueKind::PrimaryKey).unwrap();
        let schema = schema_of(t);
        let mut c = ctx("e2e");
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let row = bound.next_row(&mut c).unwrap();
            assert_eq!(row.len(), 2);
            ids.push(row[0].as_i64().unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5], "id must be a permutation of 1..=5");
    }

    #[test]
    fn test_unique_domain_large_enough_succeeds() {
        // unique attributes select the serial sub-type by default, which is
        // what keeps the accepted values structurally distinct
        let mut a = attribute("v", 1, "int", "size=1000");
        a.is_unique = true;
        a.not_null = true;
        let t = {
            let mut t = table("t", 50, vec![a]);
            t.add_unique(&["v"], UniqueKind::Unique).unwrap();
            t
        };
        let schema = schema_of(t);
        let mut c = ctx("u1");
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let row = bound.next_row(&mut c).unwrap();
            assert!(
                seen.insert(row[0].unique_key()),
                "accepted values must be pairwise distinct"
            );
        }
    }

    #[test]
    fn test_unique_domain_too_small_exhausts_budget() {
        // a unique uniform draw over 2 values cannot fill 5 rows
        let mut a = attribute("v", 1, "int", "sub=uniform size=2");
        a.is_unique = true;
        let schema = schema_of(table("t", 5, vec![a]));
        let mut c = ctx("u2");
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        let mut failed = false;
        for _ in 0..5 {
            match bound.next_row(&mut c) {
                Ok(_) => {}
                Err(RowforgeError::UniqueExhausted { table, tries }) => {
                    assert_eq!(table, "t");
                    assert_eq!(tries, 10);
                    failed = true;
                    break;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert!(failed, "generation must fail after the retry budget");
    }

    #[test]
    fn test_compound_unique_redraws_non_key_attributes() {
        // (a, b) unique with tiny domains forces collisions; the serial pk
        // must keep its first-attempt value through retries
        let mut id = attribute("id", 1, "serial", "");
        id.size = Some(30);
        let mut a = attribute("a", 2, "int", "sub=uniform size=6 offset=0");
        a.size = Some(30);
        let mut b = attribute("b", 3, "int", "sub=uniform size=6 offset=0");
        b.size = Some(30);
        let mut t = table("t", 10, vec![id, a, b]);
        t.add_unique(&["id"], UniqueKind::PrimaryKey).unwrap();
        t.add_unique(&["a", "b"], UniqueKind::Unique).unwrap();
        let schema = schema_of(t);
        let mut c = ctx("u3");
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        let mut pairs = std::collections::HashSet::new();
        for i in 0..10 {
            let row = bound.next_row(&mut c).unwrap();
            assert_eq!(
                row[0].as_i64().unwrap(),
                i + 1,
                "serial pk must stay monotonic across retries"
            );
            let pair = (row[1].unique_key(), row[2].unique_key());
            assert!(pairs.insert(pair), "compound constraint enforced");
        }
    }

    #[test]
    fn test_share_correlates_within_rows() {
        let mut c = ctx("sh");
        c.macros.insert(
            "three".to_string(),
            tokenize("int size=1000", &MacroTable::new(), "m").unwrap(),
        );
        let mut a = attribute("a", 1, "int", "share=three size=1000000");
        a.size = Some(1000000);
        a.not_null = true;
        let mut b = attribute("b", 2, "int", "share=three size=1000000");
        b.size = Some(1000000);
        b.not_null = true;
        let schema = schema_of(table("t", 20, vec![a, b]));
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        let mut rows = Vec::new();
        for _ in 0..20 {
            let row = bound.next_row(&mut c).unwrap();
            assert_eq!(
                row[0], row[1],
                "identically-configured shared attributes agree within a row"
            );
            rows.push(row[0].clone());
        }
        let distinct: std::collections::HashSet<String> =
            rows.iter().map(|v| v.unique_key()).collect();
        assert!(distinct.len() > 1, "values vary across rows");
    }

    #[test]
    fn test_nogen_attribute_is_suppressed() {
        let mut id = attribute("id", 1, "serial", "");
        id.size = Some(5);
        let skip = attribute("hidden", 2, "int", "nogen");
        let schema = schema_of(table("t", 5, vec![id, skip]));
        let mut c = ctx("ng");
        let mut bound = bind_schema(&mut c, &schema).unwrap().pop().unwrap();
        assert_eq!(bound.columns, vec!["id"]);
        let row = bound.next_row(&mut c).unwrap();
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_nogen_with_compound_unique_is_rejected() {
        let mut a = attribute("a", 1, "int", "");
        a.size = Some(5);
        let mut b = attribute("b", 2, "int", "");
        b.size = Some(5);
        let skip = attribute("hidden", 3, "int", "nogen");
        let mut t = table("t", 5, vec![a, b, skip]);
        t.add_unique(&["a", "b"], UniqueKind::Unique).unwrap();
        let schema = schema_of(t);
        let mut c = ctx("ng2");
        assert!(matches!(
            bind_schema(&mut c, &schema),
            Err(RowforgeError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_determinism_same_seed_same_rows() {
        let make = || {
            let mut id = attribute("id", 1, "serial", "");
            id.size = Some(10);
            let mut x = attribute("x", 2, "text", "length=8 lenvar=2");
            x.size = Some(10);
            schema_of(table("t", 10, vec![id, x]))
        };
        let run = |schema: &Schema| -> Vec<Vec<Value>> {
            let mut c = ctx("fixed");
            let mut bound = bind_schema(&mut c, schema).unwrap().pop().unwrap();
            (0..10).map(|_| bound.next_row(&mut c).unwrap()).collect()
        };
        let (s1, s2) = (make(), make());
        assert_eq!(run(&s1), run(&s2), "fixed seed must reproduce byte-identical rows");
    }
}
