//! Text-family generators: constants, prefix strings, character strings,
//! word lists, word aggregates, bit strings and blobs.

use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::Rng;
use regex::Regex;
use tracing::warn;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::{rng_from_seed, GenerationContext};
use crate::generate::escape::unescape;
use crate::generate::int::IntDraw;
use crate::generate::node::{macro_generator, wrap_kind, GenKind, Generator};
use crate::generate::value::Value;
use crate::schema::types::Attribute;

/// Length bounds shared by the string, chars, text, blob and bit generators.
///
/// Bounds come from `lenmin`/`lenmax`, from `length`±`lenvar`, or from a
/// `char(n)`/`varchar(n)`/`bit(n)` type; the two directive styles are
/// mutually exclusive. A missing bound is derived from the other one with
/// the 3/4–4/3 ratios, and finally from the per-generator defaults.
#[derive(Debug, Clone, Copy)]
pub struct LenBounds {
    pub min: i64,
    pub max: i64,
}

static RE_TYPED_LEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(var)?(char|bit)\((\d+)\)").unwrap());

impl LenBounds {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        type_text: Option<&str>,
        default_min: i64,
        default_max: i64,
        owner: &str,
    ) -> Result<LenBounds> {
        let mm = dirs.contains("lenmin") || dirs.contains("lenmax");
        let lv = dirs.contains("length") || dirs.contains("lenvar");
        if mm && lv {
            return Err(RowforgeError::directive(
                owner,
                "length",
                "not both 'length'/'lenvar' & 'lenmin'/'lenmax'",
            ));
        }
        let mut min: Option<i64> = None;
        let mut max: Option<i64> = None;
        if let Some(t) = type_text {
            if !mm && !dirs.contains("length") {
                if let Some(c) = RE_TYPED_LEN.captures(t) {
                    let n: i64 = c[3].parse().unwrap();
                    max = Some(n);
                    if c.get(1).is_some() {
                        // varchar/varbit leave some slack below the declared bound
                        min = Some(if let Some(lenvar) = dirs.take_int("lenvar", owner)? {
                            n - 2 * lenvar
                        } else {
                            n * 3 / 4
                        });
                    } else {
                        if dirs.take_int("lenvar", owner)?.unwrap_or(0) != 0 {
                            return Err(RowforgeError::directive(
                                owner,
                                "lenvar",
                                "non zero 'lenvar' on CHAR(n)",
                            ));
                        }
                        min = Some(n);
                    }
                }
            }
        }
        if let Some(v) = dirs.take_int("lenmax", owner)? {
            max = Some(v);
        }
        if let Some(v) = dirs.take_int("lenmin", owner)? {
            min = Some(v);
        }
        if dirs.contains("length") || dirs.contains("lenvar") {
            let length = dirs
                .take_int("length", owner)?
                .unwrap_or((default_min + default_max) / 2);
            let lenvar = dirs.take_int("lenvar", owner)?.unwrap_or(0);
            min = Some(length - lenvar);
            max = Some(length + lenvar);
        }
        let (min, max) = match (min, max) {
            (Some(lo), None) => (lo, lo * 4 / 3),
            (None, Some(hi)) => (hi * 3 / 4, hi),
            (Some(lo), Some(hi)) => (lo, hi),
            (None, None) => (default_min, default_max),
        };
        if !(0 <= min && min <= max) {
            return Err(RowforgeError::directive(
                owner,
                "length",
                format!("inconsistent length [{},{}]", min, max),
            ));
        }
        Ok(LenBounds { min, max })
    }
}

/// A constant, possibly escaped, text value.
pub struct ConstGen {
    text: String,
}

impl ConstGen {
    pub fn from_directives(dirs: &mut DirectiveMap) -> Result<ConstGen> {
        let raw = dirs.take_text("const").unwrap_or_default();
        ConstGen::literal(&raw, true)
    }

    /// `escape` applies the `chars`-style escapes when a backslash is seen.
    pub fn literal(text: &str, escape: bool) -> Result<ConstGen> {
        let text = if escape && text.contains('\\') {
            unescape(text, false)?
        } else {
            text.to_string()
        };
        Ok(ConstGen { text })
    }

    pub fn produce(&self) -> Value {
        Value::Text(self.text.clone())
    }
}

/// Deterministic `prefix_N_N...` strings: the content and length depend only
/// on the drawn integer, so equal draws make equal strings.
pub struct StringGen {
    prefix: String,
    len: LenBounds,
    pub draw: IntDraw,
}

impl StringGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<StringGen> {
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let len = LenBounds::from_directives(dirs, type_text, 8, 16, owner)?;
        let prefix = dirs
            .take_text("prefix")
            .or_else(|| att.map(|a| a.name.clone()))
            .unwrap_or_else(|| "str".to_string());
        if draw.size().is_none() {
            draw.set_size(ctx.config.resolved_size(), &mut ctx.build_rng, owner)?;
        }
        Ok(StringGen { prefix, len, draw })
    }

    fn len_data(&self, length: i64, n: i64) -> String {
        let sn = format!("_{}", n);
        let reps =
            (2.0 + (length - self.prefix.chars().count() as i64) as f64 / sn.len() as f64) as i64;
        let mut s = self.prefix.clone();
        for _ in 0..reps.max(0) {
            s.push_str(&sn);
        }
        s.chars().take(length.max(0) as usize).collect()
    }

    fn base_data(&self, n: i64) -> String {
        let s = self.len_data(self.len.max, n);
        let length = self.len.min + hash_length(&s) % (self.len.max - self.len.min + 1);
        s.chars().take(length.max(0) as usize).collect()
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        Ok(Value::Text(self.base_data(n)))
    }
}

/// Data-dependent length so generation stays deterministic in the drawn n.
fn hash_length(s: &str) -> i64 {
    s.chars()
        .enumerate()
        .map(|(i, c)| c as i64 * (997 * i as i64 + 1))
        .sum()
}

/// Strings of characters drawn from an explicit list, with a dedicated
/// sub-generator (`cgen`) selecting characters so the distribution can be
/// skewed independently of the word selection.
pub struct CharsGen {
    chars: Vec<char>,
    len: LenBounds,
    pub draw: IntDraw,
    pub cgen: Box<Generator>,
}

impl CharsGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<CharsGen> {
        if att.map(|a| a.is_unique_role()).unwrap_or(false) {
            return Err(RowforgeError::directive(
                owner,
                "chars",
                "chars generator does not support UNIQUE",
            ));
        }
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let len = LenBounds::from_directives(dirs, type_text, 8, 16, owner)?;
        dirs.take_text("prefix");
        if draw.size().is_none() {
            draw.set_size(ctx.config.resolved_size(), &mut ctx.build_rng, owner)?;
        }
        let spec = dirs.take_text("chars").unwrap_or_default();
        let chars = parse_char_sequence(&spec, owner)?;
        let cgen = match dirs.take_text("cgen") {
            Some(name) => macro_generator(ctx, &name, None, owner)?,
            None => {
                let mut d = DirectiveMap::new();
                let idraw = IntDraw::from_directives(
                    &mut d,
                    None,
                    None,
                    &mut ctx.build_rng,
                    owner,
                )?;
                wrap_kind(ctx, None, GenKind::Int(idraw), owner)
            }
        };
        Self::with_parts(chars, len, draw, cgen, ctx, owner)
    }

    /// A single-character class for the pattern compiler: one char per draw,
    /// selection domain wide enough to decorrelate from the word index.
    pub(crate) fn class(
        ctx: &mut GenerationContext,
        att: Option<&Attribute>,
        chars: Vec<char>,
        owner: &str,
    ) -> Result<CharsGen> {
        let mut dirs = DirectiveMap::new();
        let mut draw =
            IntDraw::from_directives(&mut dirs, None, None, &mut ctx.build_rng, owner)?;
        draw.set_size(0xffffffff, &mut ctx.build_rng, owner)?;
        let len = LenBounds { min: 1, max: 1 };
        let mut d2 = DirectiveMap::new();
        let idraw = IntDraw::from_directives(&mut d2, None, None, &mut ctx.build_rng, owner)?;
        let cgen = wrap_kind(ctx, att, GenKind::Int(idraw), owner);
        Self::with_parts(chars, len, draw, cgen, ctx, owner)
    }

    fn with_parts(
        chars: Vec<char>,
        len: LenBounds,
        draw: IntDraw,
        mut cgen: Generator,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<CharsGen> {
        if chars.is_empty() {
            return Err(RowforgeError::directive(
                owner,
                "chars",
                "no characters to draw from",
            ));
        }
        match &mut cgen.kind {
            GenKind::Int(d) => {
                d.set_size(chars.len() as i64, &mut ctx.build_rng, owner)?;
                d.offset = 0;
            }
            _ => {
                return Err(RowforgeError::directive(
                    owner,
                    "cgen",
                    "must name an int generator macro",
                ))
            }
        }
        Ok(CharsGen {
            chars,
            len,
            draw,
            cgen: Box::new(cgen),
        })
    }

    fn len_data(&mut self, length: i64, n: i64, seed: &str) -> Result<String> {
        // deterministic in n: the character stream is reseeded per word
        self.cgen.rng = rng_from_seed(&format!("{}{}", seed, n));
        let draw = match &mut self.cgen.kind {
            GenKind::Int(d) => d,
            _ => unreachable!("cgen checked at construction"),
        };
        let mut s = String::with_capacity(length.max(0) as usize);
        for _ in 0..length.max(0) {
            let ix = draw.produce(&mut self.cgen.rng, "cgen")?;
            s.push(self.chars[ix as usize]);
        }
        Ok(s)
    }

    pub fn produce(&mut self, seed: &str, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let s = self.len_data(self.len.max, n, seed)?;
        let length = self.len.min + hash_length(&s) % (self.len.max - self.len.min + 1);
        Ok(Value::Text(s.chars().take(length.max(0) as usize).collect()))
    }
}

/// Expand a character-sequence spec: escapes, then `X-Y` ranges; a leading
/// dash means a literal dash.
pub fn parse_char_sequence(spec: &str, owner: &str) -> Result<Vec<char>> {
    let unescaped = unescape(spec, true)?;
    let mut c: Vec<char> = unescaped.chars().collect();
    let mut chars: Vec<char> = Vec::new();
    while let Some(d) = c.iter().position(|&x| x == '-') {
        if d == 0 {
            chars.push('-');
            c.remove(0);
        } else {
            if d >= c.len() - 1 {
                return Err(RowforgeError::directive(
                    owner,
                    "chars",
                    format!("'{}' cannot end with dash", spec),
                ));
            }
            chars.extend_from_slice(&c[0..d - 1]);
            let (lo, hi) = (c[d - 1] as u32, c[d + 1] as u32);
            for x in lo..=hi {
                if let Some(ch) = char::from_u32(x) {
                    chars.push(ch);
                }
            }
            c.drain(0..d + 2);
        }
    }
    chars.extend(c);
    Ok(chars)
}

/// Words from an inline list, a file, or enum labels; selection through the
/// underlying integer draw, so it can be skewed or mangled.
pub struct WordGen {
    words: Vec<String>,
    pub draw: IntDraw,
}

impl WordGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        words: Option<Vec<String>>,
        owner: &str,
    ) -> Result<WordGen> {
        // an explicit size caps the selection; the list length is the default
        let explicit_size = dirs.get("size").and_then(|v| v.as_int());
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let words = match words {
            Some(w) => w,
            None => {
                let spec = dirs.take_text("word").unwrap_or_default();
                if spec.is_empty() {
                    return Err(RowforgeError::directive(
                        owner,
                        "word",
                        "empty word specification",
                    ));
                }
                if let Some(list) = spec.strip_prefix(':') {
                    list.split(',').map(str::to_string).collect()
                } else {
                    let content =
                        std::fs::read_to_string(&spec).map_err(|e| RowforgeError::Io {
                            path: spec.clone(),
                            source: e,
                        })?;
                    content.lines().map(|l| l.trim_end().to_string()).collect()
                }
            }
        };
        if words.is_empty() {
            return Err(RowforgeError::directive(owner, "word", "empty word list"));
        }
        let mut size = explicit_size.unwrap_or(words.len() as i64);
        if size > words.len() as i64 {
            warn!("{}: 'size' {} capped to {} words", owner, size, words.len());
            size = words.len() as i64;
        }
        draw.set_size(size, &mut ctx.build_rng, owner)?;
        // keep the selection window inside the list
        if draw.offset + size > words.len() as i64 {
            draw.offset = words.len() as i64 - size;
        }
        if draw.offset < 0 {
            draw.offset = 0;
        }
        Ok(WordGen { words, draw })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let ix = self.draw.produce(rng, owner)?;
        Ok(Value::Text(self.words[ix as usize].clone()))
    }
}

/// Aggregates of words from a sub-generator, joined with a separator.
pub struct TextGen {
    pub sub: Box<Generator>,
    pub count: IntDraw,
    sep: String,
    prefix: String,
    suffix: String,
}

impl TextGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<TextGen> {
        let name = dirs.take_text("text").unwrap_or_default();
        if name.is_empty() {
            return Err(RowforgeError::directive(owner, "text", "mandatory directive"));
        }
        let sub = macro_generator(ctx, &name, None, owner)?;
        let mut count = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let len = LenBounds::from_directives(dirs, type_text, 5, 25, owner)?;
        count.set_size(len.max - len.min + 1, &mut ctx.build_rng, owner)?;
        count.offset = len.min;
        let sep = dirs.take_text("separator").unwrap_or_else(|| " ".to_string());
        let prefix = dirs.take_text("prefix").unwrap_or_default();
        let suffix = dirs.take_text("suffix").unwrap_or_default();
        Ok(TextGen {
            sub: Box::new(sub),
            count,
            sep,
            prefix,
            suffix,
        })
    }

    pub fn produce(
        &mut self,
        rng: &mut StdRng,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<Value> {
        let n = self.count.produce(rng, owner)?;
        let mut words = Vec::with_capacity(n.max(0) as usize);
        for _ in 0..n.max(0) {
            words.push(self.sub.draw(ctx)?.to_string());
        }
        Ok(Value::Text(format!(
            "{}{}{}",
            self.prefix,
            words.join(&self.sep),
            self.suffix
        )))
    }
}

/// BIT/VARBIT strings of random bits.
pub struct BitGen {
    len: LenBounds,
}

impl BitGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<BitGen> {
        let len = LenBounds::from_directives(dirs, type_text, 8, 32, owner)?;
        Ok(BitGen { len })
    }

    pub fn produce(&self, rng: &mut StdRng) -> Value {
        let n = rng.random_range(self.len.min..=self.len.max);
        let bits: String = (0..n.max(0))
            .map(|_| if rng.random::<bool>() { '1' } else { '0' })
            .collect();
        Value::Text(bits)
    }
}

/// Binary large objects. Content comes from a second RNG stream reseeded per
/// draw from the index selection, so bytes do not correlate with position.
pub struct BlobGen {
    len: LenBounds,
    pub draw: IntDraw,
}

impl BlobGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<BlobGen> {
        let draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let len = LenBounds::from_directives(dirs, type_text, 8, 16, owner)?;
        Ok(BlobGen { len, draw })
    }

    pub fn produce(&mut self, seed: &str, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let mut rng2 = rng_from_seed(&format!("{}{}", seed, n));
        let len = rng2.random_range(self.len.min..=self.len.max);
        let bytes: Vec<u8> = (0..len.max(0)).map(|_| rng2.random::<u8>()).collect();
        Ok(Value::Bytes(bytes))
    }
}
