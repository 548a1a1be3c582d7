//! # Generator Nodes
//!
//! One closed [`Generator`] type covers every value producer. The common
//! fields (derived seed string, per-node RNG, null probability, share
//! binding) live on the struct; the per-variant configuration and owned
//! sub-generators live in the [`GenKind`] payload. Trees are built once at
//! construction and are structurally immutable afterwards; only RNG state,
//! draw counters and per-row caches mutate during generation.
//!
//! Tree-wide concerns (null suppression, share assignment, row-start share
//! resynchronization) are structural walks over the payload's children, not
//! per-variant logic.

use rand::rngs::StdRng;
use rand::Rng;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::checksum::ChecksumGen;
use crate::generate::composite::{AltGen, ArrayGen, CatGen, ReduceGen, RepeatGen, TupleGen};
use crate::generate::context::{rng_from_seed, GenerationContext};
use crate::generate::files::FileGen;
use crate::generate::int::IntDraw;
use crate::generate::net::{InetGen, MacGen};
use crate::generate::numeric::{BoolGen, CountGen, FloatGen};
use crate::generate::pattern::PatternGen;
use crate::generate::temporal::{DateGen, IntervalGen, TimestampGen};
use crate::generate::textual::{BitGen, BlobGen, CharsGen, ConstGen, StringGen, TextGen, WordGen};
use crate::generate::value::Value;
use crate::schema::types::{self, Attribute};

/// All user-visible generator names, in directive form.
pub const GENERATOR_NAMES: &[&str] = &[
    "alt", "array", "bit", "blob", "bool", "cat", "chars", "const", "count", "date", "ean",
    "file", "float", "inet", "int", "interval", "isnull", "luhn", "mac", "pattern", "reduce",
    "repeat", "string", "text", "timestamp", "tuple", "uuid", "value", "word",
];

/// A reference from a generator node to a shared (per-row persistent)
/// generator. `reseed_base` deliberately excludes the node's instantiation
/// order so that identically-configured attributes sharing a name draw equal
/// values within a row.
#[derive(Debug, Clone)]
pub struct ShareBinding {
    pub index: usize,
    pub reseed_base: String,
}

pub struct Generator {
    pub(crate) label: String,
    pub(crate) seed: String,
    pub(crate) rng: StdRng,
    pub(crate) null_rate: f64,
    pub(crate) share: Option<ShareBinding>,
    pub(crate) kind: GenKind,
}

pub enum GenKind {
    Null,
    Const(ConstGen),
    Bool(BoolGen),
    Count(CountGen),
    Int(IntDraw),
    Float(FloatGen),
    Str(StringGen),
    Chars(CharsGen),
    Word(WordGen),
    Text(TextGen),
    Bit(BitGen),
    Blob(BlobGen),
    FileData(FileGen),
    Array(ArrayGen),
    Repeat(RepeatGen),
    Cat(CatGen),
    Tuple(TupleGen),
    Reduce(ReduceGen),
    Alt(AltGen),
    Checksum(ChecksumGen),
    Inet(InetGen),
    Mac(MacGen),
    Date(DateGen),
    Timestamp(TimestampGen),
    Interval(IntervalGen),
    Pattern(PatternGen),
    ValueRef(ValueGen),
}

impl Generator {
    /// Draw a value, applying the null probability first. The `value`
    /// generator ignores nulls by contract; `isnull` always produces NULL.
    pub fn draw(&mut self, ctx: &mut GenerationContext) -> Result<Value> {
        if matches!(self.kind, GenKind::ValueRef(_)) {
            return self.produce(ctx);
        }
        if self.null_rate >= 1.0 {
            return Ok(Value::Null);
        }
        if self.null_rate > 0.0 && self.rng.random::<f64>() < self.null_rate {
            return Ok(Value::Null);
        }
        self.produce(ctx)
    }

    /// Produce a value unconditionally (no null gate). Composite generators
    /// call this on alternatives and repetitions, per their own contracts.
    pub(crate) fn produce(&mut self, ctx: &mut GenerationContext) -> Result<Value> {
        let Generator {
            label, seed, rng, kind, ..
        } = self;
        match kind {
            GenKind::Null => Ok(Value::Null),
            GenKind::Const(g) => Ok(g.produce()),
            GenKind::Bool(g) => Ok(g.produce(rng)),
            GenKind::Count(g) => Ok(g.produce()),
            GenKind::Int(d) => Ok(Value::Int(d.produce(rng, label)?)),
            GenKind::Float(g) => Ok(g.produce(rng)),
            GenKind::Str(g) => g.produce(rng, label),
            GenKind::Chars(g) => g.produce(seed, rng, label),
            GenKind::Word(g) => g.produce(rng, label),
            GenKind::Text(g) => g.produce(rng, ctx, label),
            GenKind::Bit(g) => Ok(g.produce(rng)),
            GenKind::Blob(g) => g.produce(seed, rng, label),
            GenKind::FileData(g) => g.produce(rng, label),
            GenKind::Array(g) => g.produce(rng, ctx, label),
            GenKind::Repeat(g) => g.produce(rng, ctx, label),
            GenKind::Cat(g) => g.produce(ctx),
            GenKind::Tuple(g) => g.produce(ctx),
            GenKind::Reduce(g) => g.produce(ctx, label),
            GenKind::Alt(g) => g.produce(rng, ctx),
            GenKind::Checksum(g) => g.produce(seed, rng, label),
            GenKind::Inet(g) => g.produce(rng, label),
            GenKind::Mac(g) => g.produce(seed, rng, label),
            GenKind::Date(g) => g.produce(rng, label),
            GenKind::Timestamp(g) => g.produce(rng, label),
            GenKind::Interval(g) => g.produce(rng, label),
            GenKind::Pattern(g) => g.root.produce(ctx),
            GenKind::ValueRef(g) => g.produce(ctx),
        }
    }

    /// Apply `f` to this node and every owned sub-generator, pre-order.
    pub fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut Generator)) {
        f(self);
        match &mut self.kind {
            GenKind::Chars(g) => g.cgen.for_each_mut(f),
            GenKind::Text(g) => g.sub.for_each_mut(f),
            GenKind::Array(g) => {
                if let Some(sub) = &mut g.sub {
                    sub.for_each_mut(f);
                }
            }
            GenKind::Repeat(g) => g.sub.for_each_mut(f),
            GenKind::Cat(g) => g.subs.iter_mut().for_each(|s| s.for_each_mut(f)),
            GenKind::Tuple(g) => g.subs.iter_mut().for_each(|s| s.for_each_mut(f)),
            GenKind::Reduce(g) => g.subs.iter_mut().for_each(|s| s.for_each_mut(f)),
            GenKind::Alt(g) => g.subs.iter_mut().for_each(|s| s.for_each_mut(f)),
            GenKind::Pattern(g) => g.root.for_each_mut(f),
            GenKind::ValueRef(g) => g.gen.for_each_mut(f),
            _ => {}
        }
    }

    /// Force the whole subtree to never emit NULL on its own.
    pub fn suppress_null_tree(&mut self) {
        self.for_each_mut(&mut |g| g.null_rate = 0.0);
    }

    /// Bind the whole subtree to a shared generator.
    pub fn set_share_tree(&mut self, binding: &ShareBinding) {
        self.for_each_mut(&mut |g| g.share = Some(binding.clone()));
    }

    /// Row-start synchronization: every node referencing a share is reseeded
    /// from the share's value for this row; other nodes keep their stream.
    pub fn sync_row(&mut self, ctx: &mut GenerationContext) -> Result<()> {
        let mut indices = Vec::new();
        self.for_each_mut(&mut |g| {
            if let Some(b) = &g.share {
                if !indices.contains(&b.index) {
                    indices.push(b.index);
                }
            }
        });
        let mut values = Vec::with_capacity(indices.len());
        for ix in &indices {
            values.push((*ix, ctx.shared_value(*ix)?));
        }
        self.for_each_mut(&mut |g| {
            if let Some(b) = &g.share {
                let value = values
                    .iter()
                    .find(|(ix, _)| *ix == b.index)
                    .map(|(_, v)| *v)
                    .unwrap_or(0);
                g.rng = rng_from_seed(&format!("{}_{}", b.reseed_base, value));
            }
        });
        Ok(())
    }

    /// The integer-draw machinery underlying this node, when it has one.
    pub fn int_draw(&self) -> Option<&IntDraw> {
        self.kind.int_draw()
    }

    /// Give an integer-family node a domain size when none was configured.
    /// Used by callers exercising a generator outside any attribute.
    pub fn set_default_size(&mut self, size: i64, ctx: &mut GenerationContext) -> Result<()> {
        let label = self.label.clone();
        if let Some(d) = self.kind.int_draw_mut() {
            if d.size().is_none() {
                d.set_size(size, &mut ctx.build_rng, &label)?;
            }
        }
        Ok(())
    }
}

impl GenKind {
    pub(crate) fn int_draw(&self) -> Option<&IntDraw> {
        match self {
            GenKind::Int(d) => Some(d),
            GenKind::Str(g) => Some(&g.draw),
            GenKind::Chars(g) => Some(&g.draw),
            GenKind::Word(g) => Some(&g.draw),
            GenKind::Text(g) => Some(&g.count),
            GenKind::Blob(g) => Some(&g.draw),
            GenKind::FileData(g) => Some(&g.draw),
            GenKind::Array(g) => Some(&g.count),
            GenKind::Repeat(g) => Some(&g.count),
            GenKind::Checksum(g) => Some(&g.draw),
            GenKind::Inet(g) => Some(&g.draw),
            GenKind::Mac(g) => Some(&g.draw),
            GenKind::Date(g) => Some(&g.draw),
            GenKind::Timestamp(g) => Some(&g.draw),
            GenKind::Interval(g) => Some(&g.draw),
            _ => None,
        }
    }

    pub(crate) fn int_draw_mut(&mut self) -> Option<&mut IntDraw> {
        match self {
            GenKind::Int(d) => Some(d),
            GenKind::Str(g) => Some(&mut g.draw),
            GenKind::Chars(g) => Some(&mut g.draw),
            GenKind::Word(g) => Some(&mut g.draw),
            GenKind::Text(g) => Some(&mut g.count),
            GenKind::Blob(g) => Some(&mut g.draw),
            GenKind::FileData(g) => Some(&mut g.draw),
            GenKind::Array(g) => Some(&mut g.count),
            GenKind::Repeat(g) => Some(&mut g.count),
            GenKind::Checksum(g) => Some(&mut g.draw),
            GenKind::Inet(g) => Some(&mut g.draw),
            GenKind::Mac(g) => Some(&mut g.draw),
            GenKind::Date(g) => Some(&mut g.draw),
            GenKind::Timestamp(g) => Some(&mut g.draw),
            GenKind::Interval(g) => Some(&mut g.draw),
            _ => None,
        }
    }
}

/// The per-row persistent `value` generator: equal `value=name` references
/// within one row read the exact same value.
pub struct ValueGen {
    pub name: String,
    pub gen: Box<Generator>,
}

impl ValueGen {
    fn produce(&mut self, ctx: &mut GenerationContext) -> Result<Value> {
        if let Some(v) = ctx.cached_value(&self.name) {
            return Ok(v);
        }
        let v = self.gen.produce(ctx)?;
        ctx.store_value(&self.name, v.clone());
        Ok(v)
    }
}

/// Find the generator selected by directive keys; more than one is an error.
pub fn find_directive_generator(dirs: &DirectiveMap, owner: &str) -> Result<Option<String>> {
    let mut keys: Vec<&String> = dirs.keys().collect();
    keys.sort();
    let mut found: Option<String> = None;
    for k in keys {
        if GENERATOR_NAMES.contains(&k.as_str()) {
            if let Some(prev) = &found {
                return Err(RowforgeError::directive(
                    owner,
                    k,
                    format!("multiple generators '{}' and '{}'", prev, k),
                ));
            }
            found = Some(k.clone());
        }
    }
    Ok(found)
}

/// Default generator for an SQL type.
pub fn kind_for_type(type_text: &str) -> Option<&'static str> {
    let t = type_text;
    if types::is_array_type(t) {
        Some("array")
    } else if types::is_int_type(t) {
        Some("int")
    } else if types::is_text_type(t) {
        Some("string")
    } else if types::is_bool_type(t) {
        Some("bool")
    } else if types::is_date_type(t) {
        Some("date")
    } else if types::is_timestamp_type(t) {
        Some("timestamp")
    } else if types::is_interval_type(t) {
        Some("interval")
    } else if types::is_float_type(t) {
        Some("float")
    } else if types::is_blob_type(t) {
        Some("blob")
    } else if types::is_inet_type(t) {
        Some("inet")
    } else if types::is_mac_type(t) {
        Some("mac")
    } else if types::ean_length(t).is_some() {
        Some("ean")
    } else if types::is_uuid_type(t) {
        Some("uuid")
    } else if types::is_bit_type(t) {
        Some("bit")
    } else {
        None
    }
}

struct CommonParts {
    seed: String,
    null_rate: f64,
    share: Option<ShareBinding>,
    type_text: Option<String>,
}

/// Drain the directives common to every generator: `null`, `type`, `share`,
/// `seed`; derive the seed string and resolve the share binding.
fn common_parts(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    dirs: &mut DirectiveMap,
    label: &str,
) -> Result<CommonParts> {
    let id = ctx.next_gen_id();
    let type_text = dirs
        .take_text("type")
        .map(|s| s.to_lowercase())
        .or_else(|| att.map(|a| a.type_text.clone()));
    let dir_null = dirs.take_float("null", label)?;
    let null_rate = match att {
        Some(a) if !a.is_nullable() => 0.0,
        _ => dir_null.unwrap_or_else(|| ctx.config.resolved_null_rate()),
    };
    if !(0.0..=1.0).contains(&null_rate) {
        return Err(RowforgeError::directive(
            label,
            "null",
            format!("{} not in [0,1]", null_rate),
        ));
    }
    let share_name = dirs.take_text("share");
    let explicit_seed = dirs.take_text("seed");
    let tail = ctx.seed_component(explicit_seed.clone());
    let seed = match &share_name {
        Some(s) => format!("{}_{}_{}_", id, s, tail),
        None => format!("{}_{}_", id, tail),
    };
    let share = match share_name {
        Some(name) => {
            let index = ctx.share_handle(&name, label)?;
            let reseed_base = format!(
                "{}_{}",
                name,
                explicit_seed
                    .or_else(|| ctx.config.seed.clone())
                    .unwrap_or_default()
            );
            Some(ShareBinding { index, reseed_base })
        }
        None => None,
    };
    Ok(CommonParts {
        seed,
        null_rate,
        share,
        type_text,
    })
}

/// Build a generator from a directive map. `explicit` forces the generator
/// kind; otherwise it is selected from the directives, then from the `type`
/// directive or the attribute's SQL type.
pub fn build_generator(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    explicit: Option<&str>,
    mut dirs: DirectiveMap,
    label: &str,
) -> Result<Generator> {
    // isnull sanity check comes first: a null rate other than 1.0 on an
    // explicit NULL generator is a contradiction.
    let early_kind = match explicit {
        Some(k) => Some(k.to_string()),
        None => find_directive_generator(&dirs, label)?,
    };
    if early_kind.as_deref() == Some("isnull") {
        if let Some(v) = dirs.get("null") {
            if v.as_float() != Some(1.0) {
                return Err(RowforgeError::directive(
                    label,
                    "null",
                    format!("is {:?} instead of 1.0", v),
                ));
            }
        }
    }

    let common = common_parts(ctx, att, &mut dirs, label)?;
    let kind_name = match early_kind {
        Some(k) => k,
        None => match common.type_text.as_deref().and_then(kind_for_type) {
            Some(k) => k.to_string(),
            None => {
                return Err(RowforgeError::NoGenerator {
                    owner: label.to_string(),
                    type_text: common.type_text.clone().unwrap_or_default(),
                })
            }
        },
    };
    if !GENERATOR_NAMES.contains(&kind_name.as_str()) {
        return Err(RowforgeError::UnknownGenerator {
            owner: label.to_string(),
            name: kind_name,
        });
    }

    let type_text = common.type_text.as_deref();
    let offset = ctx.config.offset;
    let kind = match kind_name.as_str() {
        "isnull" => GenKind::Null,
        "const" => GenKind::Const(ConstGen::from_directives(&mut dirs)?),
        "bool" => GenKind::Bool(BoolGen::from_directives(&mut dirs, label)?),
        "count" => GenKind::Count(CountGen::from_directives(&mut dirs, label)?),
        "int" => GenKind::Int(IntDraw::from_directives(
            &mut dirs,
            att,
            offset,
            &mut ctx.build_rng,
            label,
        )?),
        "float" => GenKind::Float(FloatGen::from_directives(&mut dirs, label)?),
        "string" => GenKind::Str(StringGen::from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "chars" => GenKind::Chars(CharsGen::from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "word" => GenKind::Word(WordGen::from_directives(&mut dirs, att, ctx, None, label)?),
        "text" => GenKind::Text(TextGen::from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "bit" => GenKind::Bit(BitGen::from_directives(&mut dirs, type_text, label)?),
        "blob" => GenKind::Blob(BlobGen::from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "file" => GenKind::FileData(FileGen::from_directives(&mut dirs, att, ctx, label)?),
        "array" => GenKind::Array(ArrayGen::from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "repeat" => GenKind::Repeat(RepeatGen::from_directives(&mut dirs, att, ctx, label)?),
        "cat" => GenKind::Cat(CatGen::from_directives(&mut dirs, att, ctx, label)?),
        "tuple" => GenKind::Tuple(TupleGen::from_directives(&mut dirs, att, ctx, label)?),
        "reduce" => GenKind::Reduce(ReduceGen::from_directives(&mut dirs, att, ctx, label)?),
        "alt" => GenKind::Alt(AltGen::from_directives(&mut dirs, att, ctx, label)?),
        "luhn" => GenKind::Checksum(ChecksumGen::luhn_from_directives(
            &mut dirs, att, ctx, label,
        )?),
        "ean" => GenKind::Checksum(ChecksumGen::ean_from_directives(
            &mut dirs, att, ctx, type_text, label,
        )?),
        "inet" => GenKind::Inet(InetGen::from_directives(&mut dirs, att, ctx, label)?),
        "mac" => GenKind::Mac(MacGen::from_directives(&mut dirs, att, ctx, label)?),
        "date" => GenKind::Date(DateGen::from_directives(&mut dirs, att, ctx, label)?),
        "timestamp" => GenKind::Timestamp(TimestampGen::from_directives(&mut dirs, att, ctx, label)?),
        "interval" => GenKind::Interval(IntervalGen::from_directives(&mut dirs, att, ctx, label)?),
        "uuid" => {
            dirs.insert(
                "pattern",
                crate::directive::DirectiveValue::Text(r"\h{4}(\h{4}-){4}\h{12}".to_string()),
            );
            GenKind::Pattern(PatternGen::from_directives(&mut dirs, att, ctx, label)?)
        }
        "pattern" => GenKind::Pattern(PatternGen::from_directives(&mut dirs, att, ctx, label)?),
        "value" => {
            let name = dirs.take_text("value").unwrap_or_default();
            if name.is_empty() {
                return Err(RowforgeError::directive(label, "value", "mandatory directive"));
            }
            let gen = Box::new(macro_generator(ctx, &name, att, label)?);
            GenKind::ValueRef(ValueGen { name, gen })
        }
        other => {
            return Err(RowforgeError::UnknownGenerator {
                owner: label.to_string(),
                name: other.to_string(),
            })
        }
    };

    // The trigger directive may remain as a flag; drop it, then every other
    // leftover key is a configuration error.
    dirs.take(&kind_name);
    dirs.finish(label)?;

    let mut g = Generator {
        label: label.to_string(),
        rng: rng_from_seed(&common.seed),
        seed: common.seed,
        null_rate: common.null_rate,
        share: common.share,
        kind,
    };
    // A pattern-compiled subtree never independently emits NULL, and every
    // node of a shared tree follows the same share.
    if let GenKind::Pattern(p) = &mut g.kind {
        p.root.suppress_null_tree();
    }
    if let Some(binding) = g.share.clone() {
        g.set_share_tree(&binding);
    }
    Ok(g)
}

/// Build a generator for an enum-typed attribute: a word generator over the
/// declared labels.
pub fn build_enum_generator(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    labels: Vec<String>,
    label: &str,
) -> Result<Generator> {
    let mut dirs = att.map(|a| a.directives.clone()).unwrap_or_default();
    let common = common_parts(ctx, att, &mut dirs, label)?;
    let kind = GenKind::Word(WordGen::from_directives(
        &mut dirs,
        att,
        ctx,
        Some(labels),
        label,
    )?);
    dirs.finish(label)?;
    let mut g = Generator {
        label: label.to_string(),
        rng: rng_from_seed(&common.seed),
        seed: common.seed,
        null_rate: common.null_rate,
        share: common.share,
        kind,
    };
    if let Some(binding) = g.share.clone() {
        g.set_share_tree(&binding);
    }
    Ok(g)
}

/// Instantiate a generator from a named macro. A bare integer-family
/// generator without a size falls back to the global size.
pub fn macro_generator(
    ctx: &mut GenerationContext,
    name: &str,
    att: Option<&Attribute>,
    owner: &str,
) -> Result<Generator> {
    let dirs = ctx
        .macros
        .get(name)
        .cloned()
        .ok_or_else(|| RowforgeError::UnknownMacro {
            owner: owner.to_string(),
            name: name.to_string(),
        })?;
    let label = format!("macro '{}'", name);
    let mut g = build_generator(ctx, att, None, dirs, &label)?;
    let global = ctx.config.resolved_size();
    if let Some(d) = g.kind.int_draw_mut() {
        if d.size().is_none() {
            d.set_size(global, &mut ctx.build_rng, &label)?;
        }
    }
    Ok(g)
}

/// Internal constructor for pattern pieces and other synthesized nodes.
pub(crate) fn wrap_kind(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    kind: GenKind,
    label: &str,
) -> Generator {
    let id = ctx.next_gen_id();
    let tail = ctx.seed_component(None);
    let seed = format!("{}_{}_", id, tail);
    let null_rate = match att {
        Some(a) if a.is_nullable() => ctx.config.resolved_null_rate(),
        _ => 0.0,
    };
    Generator {
        label: label.to_string(),
        rng: rng_from_seed(&seed),
        seed,
        null_rate,
        share: None,
        kind,
    }
}
