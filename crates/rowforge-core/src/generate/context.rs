//! # Generation Context
//!
//! A single `GenerationContext` value threaded through construction and
//! generation. It owns everything that would otherwise be ambient state: the
//! macro table, the shared-generator pool, the per-row value cache, the row
//! counter, the generator instantiation counter, and the construction-time
//! RNG used for `mangle` parameters and seed entropy.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::config::RunConfig;
use crate::directive::MacroTable;
use crate::error::{Result, RowforgeError};
use crate::generate::int::IntDraw;
use crate::generate::value::Value;

/// Derive a deterministic RNG from a seed string: identical string, identical
/// byte sequence.
pub(crate) fn rng_from_seed(seed: &str) -> StdRng {
    let digest = Sha256::digest(seed.as_bytes());
    StdRng::from_seed(digest.into())
}

/// One lazily-instantiated shared generator: a persistent integer recomputed
/// once per row and read (not re-drawn) by every attribute referencing it.
struct SharedSlot {
    name: String,
    rng: StdRng,
    draw: IntDraw,
    last_row: u64,
    value: i64,
}

pub struct GenerationContext {
    pub config: RunConfig,
    pub macros: MacroTable,
    /// Strictly ascending row counter, shared by all tables of a run.
    pub row_id: u64,
    gen_count: u64,
    shared: Vec<SharedSlot>,
    shared_names: IndexMap<String, usize>,
    value_cache: IndexMap<String, (u64, Value)>,
    /// Construction-time randomness: mangle parameters, seed entropy.
    pub build_rng: StdRng,
    /// Row-skip decisions during emission.
    pub aux_rng: StdRng,
}

impl GenerationContext {
    pub fn new(config: RunConfig, macros: MacroTable) -> Self {
        let (build_rng, aux_rng) = match &config.seed {
            Some(seed) => (
                rng_from_seed(&format!("build_{}", seed)),
                rng_from_seed(&format!("aux_{}", seed)),
            ),
            None => (StdRng::from_os_rng(), StdRng::from_os_rng()),
        };
        GenerationContext {
            config,
            macros,
            row_id: 0,
            gen_count: 0,
            shared: Vec::new(),
            shared_names: IndexMap::new(),
            value_cache: IndexMap::new(),
            build_rng,
            aux_rng,
        }
    }

    pub fn next_gen_id(&mut self) -> u64 {
        self.gen_count += 1;
        self.gen_count
    }

    /// Advance to the next row tick. Retries consume a fresh tick too, so a
    /// counter-bound generator never replays the colliding values.
    pub fn advance_row(&mut self) {
        self.row_id += 1;
    }

    /// The seed tail after the instantiation counter: explicit seed, global
    /// seed, or fresh entropy.
    pub fn seed_component(&mut self, explicit: Option<String>) -> String {
        if let Some(s) = explicit {
            s
        } else if let Some(s) = &self.config.seed {
            s.clone()
        } else {
            format!("{}", self.build_rng.random::<f64>())
        }
    }

    /// Resolve a `share=name` directive to a pool index, instantiating the
    /// named generator on first reference. The name must be a declared macro.
    pub fn share_handle(&mut self, name: &str, owner: &str) -> Result<usize> {
        if let Some(ix) = self.shared_names.get(name) {
            return Ok(*ix);
        }
        let mut dirs = self
            .macros
            .get(name)
            .cloned()
            .ok_or_else(|| RowforgeError::UnknownMacro {
                owner: owner.to_string(),
                name: name.to_string(),
            })?;
        let slot_owner = format!("shared generator '{}'", name);
        let id = self.next_gen_id();
        let explicit_seed = dirs.take_text("seed");
        let seed = format!("{}_{}_", id, self.seed_component(explicit_seed));
        dirs.take("int");
        dirs.take("null");
        let mult = dirs.take_float("mult", &slot_owner)?;
        let mut draw = IntDraw::from_directives(
            &mut dirs,
            None,
            self.config.offset,
            &mut self.build_rng,
            &slot_owner,
        )?;
        if draw.size().is_none() {
            let size = match mult {
                Some(m) => (m * self.config.resolved_size() as f64) as i64,
                None => self.config.resolved_size(),
            };
            draw.set_size(size, &mut self.build_rng, &slot_owner)?;
        }
        let rng = rng_from_seed(&seed);
        let ix = self.shared.len();
        self.shared.push(SharedSlot {
            name: name.to_string(),
            rng,
            draw,
            last_row: 0,
            value: 0,
        });
        self.shared_names.insert(name.to_string(), ix);
        Ok(ix)
    }

    /// The shared generator's value for the current row, computing it on
    /// first access per tick.
    pub fn shared_value(&mut self, ix: usize) -> Result<i64> {
        let row = self.row_id;
        let slot = &mut self.shared[ix];
        if slot.last_row != row {
            slot.value = slot.draw.produce(&mut slot.rng, &slot.name)?;
            slot.last_row = row;
        }
        Ok(slot.value)
    }

    /// Per-row cache for the `value` generator: the first reference in a row
    /// computes, later references with the same name read the same value.
    pub fn cached_value(&self, name: &str) -> Option<Value> {
        match self.value_cache.get(name) {
            Some((row, v)) if *row == self.row_id => Some(v.clone()),
            _ => None,
        }
    }

    pub fn store_value(&mut self, name: &str, value: Value) {
        self.value_cache
            .insert(name.to_string(), (self.row_id, value));
    }
}
