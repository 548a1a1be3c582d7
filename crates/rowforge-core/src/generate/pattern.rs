//! # Pattern Compiler
//!
//! Compiles a regex-like string into a tree of generator nodes: alternation
//! `(a|b)`, concatenation, character classes `[...]`/`[^...]` with ranges,
//! the `.` wildcard, POSIX classes, escapes, quantifiers bound to the
//! preceding atom, and the `[:name directives:]` escape splicing any
//! registered generator into the output.
//!
//! Recursive descent in two passes: `cat_split` partitions a sequence into
//! (atom, quantifier) pairs respecting `()`/`[]` nesting and escapes, and
//! `alt_split` cuts an alternation's interior on unescaped, unnested `|`.
//! Compilation happens once at construction; malformed patterns are
//! compile-time errors, never generation-time ones.

use crate::directive::{tokenize, DirectiveMap};
use crate::error::{Result, RowforgeError};
use crate::generate::composite::{AltGen, CatGen, RepeatGen};
use crate::generate::context::GenerationContext;
use crate::generate::escape::{class_shorthand, posix_class, PRINTABLE};
use crate::generate::node::{build_generator, wrap_kind, GenKind, Generator};
use crate::generate::textual::{parse_char_sequence, CharsGen, ConstGen};
use crate::schema::types::Attribute;

/// Pattern-based text: the compiled tree does all the work.
pub struct PatternGen {
    pub root: Box<Generator>,
}

impl PatternGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        _owner: &str,
    ) -> Result<PatternGen> {
        let pattern = dirs.take_text("pattern").unwrap_or_default();
        let root = compile(ctx, att, &pattern)?;
        Ok(PatternGen {
            root: Box::new(root),
        })
    }
}

/// Compile a pattern string into a generator tree.
pub fn compile(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    pattern: &str,
) -> Result<Generator> {
    let wrapped: Vec<char> = format!("({})", pattern).chars().collect();
    gen_alt(ctx, att, &wrapped, &[], pattern)
}

fn err(full: &str, message: impl Into<String>) -> RowforgeError {
    RowforgeError::Pattern {
        pattern: full.to_string(),
        message: message.into(),
    }
}

/// Index just after a quantifier starting at `i`, if any.
fn skip_repeat(p: &[char], i: usize, full: &str) -> Result<usize> {
    if i < p.len() {
        if p[i] == '{' {
            match p[i + 1..].iter().position(|&c| c == '}') {
                Some(off) => return Ok(i + 1 + off + 1),
                None => return Err(err(full, "closing '}' not found")),
            }
        } else if "?+*".contains(p[i]) {
            return Ok(i + 1);
        }
    }
    Ok(i)
}

/// Index of the `]` closing a class that starts at `i` (`p[i] == '['`). The
/// first content character may itself be `]`.
fn class_close(p: &[char], i: usize, full: &str) -> Result<usize> {
    let start = if p.get(i + 1) == Some(&'^') { i + 3 } else { i + 2 };
    if start > p.len() {
        return Err(err(full, "no matching ']'"));
    }
    p[start..]
        .iter()
        .position(|&c| c == ']')
        .map(|off| start + off)
        .ok_or_else(|| err(full, "no matching ']'"))
}

type Piece = (Vec<char>, Vec<char>);

/// Split a concatenation into (atom, quantifier) pieces.
fn cat_split(p: &[char], full: &str) -> Result<Vec<Piece>> {
    if p.is_empty() {
        return Ok(Vec::new());
    }
    if p[0] == '(' {
        // find the matching nested ')'
        let mut opened = 1;
        let mut i = 1;
        while opened > 0 {
            if i >= p.len() {
                return Err(err(full, "no matching ')'"));
            }
            match p[i] {
                ')' => opened -= 1,
                '(' => opened += 1,
                '\\' => i += 1,
                '[' => i = class_close(p, i, full)?,
                _ => {}
            }
            i += 1;
        }
        let end = skip_repeat(p, i, full)?;
        let mut out = vec![(p[0..i].to_vec(), p[i..end].to_vec())];
        out.extend(cat_split(&p[end..], full)?);
        return Ok(out);
    }
    if p[0] == '[' {
        let i = class_close(p, 0, full)? + 1;
        let end = skip_repeat(p, i, full)?;
        let mut out = vec![(p[0..i].to_vec(), p[i..end].to_vec())];
        out.extend(cat_split(&p[end..], full)?);
        return Ok(out);
    }
    if p[0] == '.' {
        let end = skip_repeat(p, 1, full)?;
        let mut out = vec![(vec!['.'], p[1..end].to_vec())];
        out.extend(cat_split(&p[end..], full)?);
        return Ok(out);
    }
    // eat possibly escaped characters, expanding \d-style classes on the fly
    let mut i = 0;
    while i < p.len() {
        if p[i] == '\\' && i + 1 < p.len() && class_shorthand(p[i + 1]).is_some() {
            let spec = class_shorthand(p[i + 1]).unwrap();
            let class: Vec<char> = format!("[{}]", spec).chars().collect();
            let end = skip_repeat(p, i + 2, full)?;
            let mut out = Vec::new();
            if i > 0 {
                out.push((p[0..i].to_vec(), Vec::new()));
            }
            out.push((class, p[i + 2..end].to_vec()));
            out.extend(cat_split(&p[end..], full)?);
            return Ok(out);
        } else if p[i] == '\\' {
            i += 1;
            if i >= p.len() {
                return Err(err(full, "cannot end on escape"));
            }
        } else if "{?+*".contains(p[i]) {
            if i == 0 {
                return Err(err(full, "cannot start with repeat"));
            }
            let end = skip_repeat(p, i, full)?;
            let mut out = Vec::new();
            if i > 1 {
                out.push((p[0..i - 1].to_vec(), Vec::new()));
            }
            out.push((p[i - 1..i].to_vec(), p[i..end].to_vec()));
            out.extend(cat_split(&p[end..], full)?);
            return Ok(out);
        } else if p[i] == '(' || p[i] == '[' {
            let mut out = vec![(p[0..i].to_vec(), Vec::new())];
            out.extend(cat_split(&p[i..], full)?);
            return Ok(out);
        }
        i += 1;
    }
    Ok(vec![(p.to_vec(), Vec::new())])
}

/// Split a parenthesized alternation on top-level `|`.
fn alt_split(p: &[char], full: &str) -> Result<Vec<Vec<char>>> {
    if p.first() != Some(&'(') || p.last() != Some(&')') {
        return Err(err(full, "not an alternation"));
    }
    let inner = &p[1..p.len() - 1];
    let mut segments = Vec::new();
    let mut start = 0;
    let mut opened = 0;
    let mut i = 0;
    while i < inner.len() {
        match inner[i] {
            '\\' => i += 1,
            '[' => i = class_close(inner, i, full)?,
            '(' => opened += 1,
            ')' => opened -= 1,
            '|' if opened == 0 => {
                segments.push(inner[start..i].to_vec());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(inner[start..].to_vec());
    Ok(segments)
}

/// Wrap `g` in a repetition per the quantifier text.
fn gen_repeat(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    g: Generator,
    extent: &[char],
    full: &str,
) -> Result<Generator> {
    let text: String = extent.iter().collect();
    if text.is_empty() || text == "{1}" || text == "{1,1}" {
        return Ok(g);
    }
    let bounds = match text.as_str() {
        "?" => "0,1".to_string(),
        "*" => "0,8".to_string(),
        "+" => "1,8".to_string(),
        _ => text[1..text.len() - 1].to_string(),
    };
    let (min, max) = match bounds.split_once(',') {
        Some((lo, hi)) => (lo.trim().parse::<i64>(), hi.trim().parse::<i64>()),
        None => (bounds.parse::<i64>(), bounds.parse::<i64>()),
    };
    let (min, max) = match (min, max) {
        (Ok(lo), Ok(hi)) if 0 <= lo && lo <= hi => (lo, hi),
        _ => return Err(err(full, format!("bad quantifier '{}'", text))),
    };
    let mut dirs = DirectiveMap::new();
    let rg = RepeatGen::with_sub(g, min, max, &mut dirs, att, ctx, full)
        .map_err(|e| err(full, e.to_string()))?;
    Ok(wrap_kind(ctx, att, GenKind::Repeat(rg), full))
}

fn const_node(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    text: &str,
    full: &str,
) -> Result<Generator> {
    let c = ConstGen::literal(text, true).map_err(|e| err(full, e.to_string()))?;
    Ok(wrap_kind(ctx, att, GenKind::Const(c), full))
}

fn class_node(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    chars: Vec<char>,
    full: &str,
) -> Result<Generator> {
    let g = CharsGen::class(ctx, att, chars, full).map_err(|e| err(full, e.to_string()))?;
    Ok(wrap_kind(ctx, att, GenKind::Chars(g), full))
}

/// Compile a single atom: `(...)`, `[...]`, `.`, `[:...:]` or literal text.
fn gen_alt(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    piece: &[char],
    extent: &[char],
    full: &str,
) -> Result<Generator> {
    if piece.is_empty() {
        return const_node(ctx, att, "", full);
    }
    let text: String = piece.iter().collect();
    if text == "." {
        let chars = parse_char_sequence(PRINTABLE, full).map_err(|e| err(full, e.to_string()))?;
        let g = class_node(ctx, att, chars, full)?;
        return gen_repeat(ctx, att, g, extent, full);
    }
    if text.starts_with("[:") && text.ends_with(":]") && text.len() >= 4 {
        let desc = &text[2..text.len() - 2];
        if let Some(spec) = posix_class(desc) {
            let chars =
                parse_char_sequence(spec, full).map_err(|e| err(full, e.to_string()))?;
            let g = class_node(ctx, att, chars, full)?;
            return gen_repeat(ctx, att, g, extent, full);
        }
        // embedded generator, e.g. [:count start=10 format=08X:]
        let params = tokenize(desc, &ctx.macros.clone(), full)?;
        let g = build_generator(ctx, att, None, params, full)?;
        return gen_repeat(ctx, att, g, extent, full);
    }
    if piece[0] == '(' {
        let alternatives = alt_split(piece, full)?;
        if alternatives.len() == 1 && alternatives[0].is_empty() && !extent.is_empty() {
            return Err(err(full, "quantifier on empty group"));
        }
        let g = if alternatives.len() == 1 {
            gen_cat(ctx, att, &alternatives[0], &[], full)?
        } else {
            let mut subs = Vec::with_capacity(alternatives.len());
            for alt in &alternatives {
                subs.push(gen_cat(ctx, att, alt, &[], full)?);
            }
            wrap_kind(ctx, att, GenKind::Alt(AltGen::from_parts(subs)), full)
        };
        return gen_repeat(ctx, att, g, extent, full);
    }
    if piece[0] == '[' {
        if piece.len() < 3 || *piece.last().unwrap() != ']' {
            return Err(err(full, "malformed character class"));
        }
        let g = if piece.get(1) == Some(&'^') {
            let inner: String = piece[2..piece.len() - 1].iter().collect();
            let excluded =
                parse_char_sequence(&inner, full).map_err(|e| err(full, e.to_string()))?;
            let all =
                parse_char_sequence(PRINTABLE, full).map_err(|e| err(full, e.to_string()))?;
            let mut diff: Vec<char> =
                all.into_iter().filter(|c| !excluded.contains(c)).collect();
            diff.sort_unstable();
            diff.dedup();
            class_node(ctx, att, diff, full)?
        } else {
            let inner: String = piece[1..piece.len() - 1].iter().collect();
            let chars =
                parse_char_sequence(&inner, full).map_err(|e| err(full, e.to_string()))?;
            class_node(ctx, att, chars, full)?
        };
        return gen_repeat(ctx, att, g, extent, full);
    }
    // possibly repeated constant text
    let g = const_node(ctx, att, &text, full)?;
    gen_repeat(ctx, att, g, extent, full)
}

/// Compile a concatenation like `(foo|bla){1,3}stuff[abc]{5}`.
fn gen_cat(
    ctx: &mut GenerationContext,
    att: Option<&Attribute>,
    p: &[char],
    extent: &[char],
    full: &str,
) -> Result<Generator> {
    if p.is_empty() {
        if !extent.is_empty() {
            return Err(err(full, "quantifier on empty group"));
        }
        return const_node(ctx, att, "", full);
    }
    let pieces = cat_split(p, full)?;
    let g = match pieces.len() {
        0 => {
            if !extent.is_empty() {
                return Err(err(full, "quantifier on empty group"));
            }
            return const_node(ctx, att, "", full);
        }
        1 => gen_alt(ctx, att, &pieces[0].0, &pieces[0].1, full)?,
        _ => {
            let mut subs = Vec::with_capacity(pieces.len());
            for (atom, quant) in &pieces {
                subs.push(gen_alt(ctx, att, atom, quant, full)?);
            }
            wrap_kind(ctx, att, GenKind::Cat(CatGen::from_parts(subs)), full)
        }
    };
    gen_repeat(ctx, att, g, extent, full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::directive::builtin_macros;
    use crate::generate::value::Value;

    fn ctx() -> GenerationContext {
        let config = RunConfig {
            seed: Some("t".to_string()),
            size: Some(100),
            ..RunConfig::default()
        };
        GenerationContext::new(config, builtin_macros())
    }

    fn draw_strings(pattern: &str, n: usize) -> Vec<String> {
        let mut c = ctx();
        let mut g = compile(&mut c, None, pattern).unwrap();
        g.suppress_null_tree();
        (0..n)
            .map(|_| {
                c.advance_row();
                match g.produce(&mut c).unwrap() {
                    Value::Text(s) => s,
                    v => panic!("expected text, got {:?}", v),
                }
            })
            .collect()
    }

    #[test]
    fn test_literal_pattern() {
        for s in draw_strings("abc", 5) {
            assert_eq!(s, "abc");
        }
    }

    #[test]
    fn test_alternation_with_quantifier() {
        for s in draw_strings("(a|b){2,3}", 100) {
            assert!((2..=3).contains(&s.len()), "bad length: '{}'", s);
            assert!(s.chars().all(|c| c == 'a' || c == 'b'), "bad chars: '{}'", s);
        }
    }

    #[test]
    fn test_digit_class_exact_count() {
        for s in draw_strings("[0-9]{4}", 50) {
            assert_eq!(s.len(), 4, "'{}'", s);
            assert!(s.chars().all(|c| c.is_ascii_digit()), "'{}'", s);
        }
    }

    #[test]
    fn test_class_shorthand_and_posix() {
        for s in draw_strings(r"\d{2}[:lower:]{2}", 50) {
            assert_eq!(s.len(), 4, "'{}'", s);
            assert!(s[0..2].chars().all(|c| c.is_ascii_digit()), "'{}'", s);
            assert!(s[2..4].chars().all(|c| c.is_ascii_lowercase()), "'{}'", s);
        }
    }

    #[test]
    fn test_negated_class() {
        for s in draw_strings("[^0-9]{3}", 50) {
            assert!(s.chars().all(|c| !c.is_ascii_digit()), "'{}'", s);
            assert!(s.chars().all(|c| (' '..='~').contains(&c)), "'{}'", s);
        }
    }

    #[test]
    fn test_optional_and_plus() {
        for s in draw_strings("x?", 50) {
            assert!(s.is_empty() || s == "x", "'{}'", s);
        }
        for s in draw_strings("y+", 50) {
            assert!((1..=8).contains(&s.len()), "'{}'", s);
            assert!(s.chars().all(|c| c == 'y'));
        }
    }

    #[test]
    fn test_escaped_dot_is_literal() {
        for s in draw_strings(r"a\.b", 5) {
            assert_eq!(s, "a.b");
        }
    }

    #[test]
    fn test_email_shape() {
        for s in draw_strings(r"[a-z]{3,8}\.[a-z]{3,8}@(gmail|yahoo)\.com", 30) {
            assert!(
                s.ends_with("@gmail.com") || s.ends_with("@yahoo.com"),
                "'{}'",
                s
            );
            let local = s.split('@').next().unwrap();
            let parts: Vec<&str> = local.split('.').collect();
            assert_eq!(parts.len(), 2, "'{}'", s);
            for part in parts {
                assert!((3..=8).contains(&part.len()), "'{}'", s);
            }
        }
    }

    #[test]
    fn test_embedded_count_generator() {
        let out = draw_strings("N=[:count:]", 3);
        assert_eq!(out, vec!["N=1", "N=2", "N=3"]);
    }

    #[test]
    fn test_embedded_count_hex_format() {
        let out = draw_strings("[:count start=9 format=X:]", 3);
        assert_eq!(out, vec!["9", "A", "B"]);
    }

    #[test]
    fn test_uuid_preset_shape() {
        for s in draw_strings(r"\h{4}(\h{4}-){4}\h{12}", 10) {
            assert_eq!(s.len(), 36, "'{}'", s);
            let ok = uuid::Uuid::parse_str(&s);
            assert!(ok.is_ok(), "'{}' must parse as a UUID: {:?}", s, ok);
        }
    }

    #[test]
    fn test_unmatched_paren_is_compile_error() {
        let mut c = ctx();
        assert!(compile(&mut c, None, "(ab").is_err());
        assert!(compile(&mut c, None, "[ab").is_err());
    }

    #[test]
    fn test_trailing_backslash_is_compile_error() {
        let mut c = ctx();
        assert!(compile(&mut c, None, "ab\\").is_err());
    }

    #[test]
    fn test_leading_quantifier_is_compile_error() {
        let mut c = ctx();
        assert!(compile(&mut c, None, "{3}x").is_err());
    }

    #[test]
    fn test_quantifier_on_empty_group_is_compile_error() {
        let mut c = ctx();
        assert!(compile(&mut c, None, "(){3}").is_err());
    }

    #[test]
    fn test_unknown_embedded_generator_is_compile_error() {
        let mut c = ctx();
        assert!(compile(&mut c, None, "[:unknown:]").is_err());
    }

    #[test]
    fn test_empty_pattern_yields_empty_string() {
        for s in draw_strings("", 3) {
            assert_eq!(s, "");
        }
    }
}
