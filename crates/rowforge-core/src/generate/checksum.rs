//! Checksummed code generators: Luhn (bank-card style) and the EAN family
//! (EAN13, ISBN, ISSN, ISMN and their EAN13-embedded variants, UPC).
//!
//! Digits come from a second RNG stream reseeded per draw from the index
//! selection, so code content never correlates with positional selection.

use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::Rng;
use regex::Regex;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::{rng_from_seed, GenerationContext};
use crate::generate::int::IntDraw;
use crate::generate::value::Value;
use crate::schema::types::{ean_length, Attribute};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckKind {
    /// Luhn's algorithm, default length 16.
    Luhn,
    /// Weighted mod-10 (EAN13/UPC/ISMN; 'M' counts as 3).
    WeightedMod10,
    /// Weighted mod-11 with an 'X' sentinel (ISBN-10, ISSN-8).
    Mod11,
}

pub struct ChecksumGen {
    length: usize,
    prefix: String,
    kind: CheckKind,
    pub draw: IntDraw,
}

static RE_DECIMAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d*$").unwrap());
static RE_ISN_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^M?\d*$").unwrap());

impl ChecksumGen {
    pub fn luhn_from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<ChecksumGen> {
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let length = dirs.take_int("length", owner)?.unwrap_or(16);
        if length < 2 {
            return Err(RowforgeError::directive(
                owner,
                "length",
                format!("{} must be > 1", length),
            ));
        }
        if draw.size().is_none() {
            draw.set_size(ctx.config.resolved_size(), &mut ctx.build_rng, owner)?;
        }
        let prefix = dirs.take_text("prefix").unwrap_or_default();
        if !RE_DECIMAL_PREFIX.is_match(&prefix) {
            return Err(RowforgeError::directive(
                owner,
                "prefix",
                format!("'{}' not decimal", prefix),
            ));
        }
        if prefix.len() >= length as usize {
            return Err(RowforgeError::directive(
                owner,
                "prefix",
                format!("\"{}\" length not smaller than 'length' {}", prefix, length),
            ));
        }
        Ok(ChecksumGen {
            length: length as usize,
            prefix,
            kind: CheckKind::Luhn,
            draw,
        })
    }

    pub fn ean_from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<ChecksumGen> {
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        dirs.take("length");
        if draw.size().is_none() {
            draw.set_size(ctx.config.resolved_size(), &mut ctx.build_rng, owner)?;
        }
        let subtype = match type_text {
            Some(t) if ean_length(t).is_some() => t.to_string(),
            _ => "ean13".to_string(),
        };
        let length = ean_length(&subtype).expect("subtype verified above");
        // IS*N codes embedded in EAN13 carry their registration prefix
        let prefix = match dirs.take_text("prefix") {
            Some(p) => p,
            None => match subtype.as_str() {
                "issn13" => "977",
                "isbn13" => "978",
                "ismn13" => "9790",
                "ismn" => "M",
                _ => "",
            }
            .to_string(),
        };
        if !RE_ISN_PREFIX.is_match(&prefix) {
            return Err(RowforgeError::directive(
                owner,
                "prefix",
                format!("invalid prefix '{}'", prefix),
            ));
        }
        if prefix.len() >= length {
            return Err(RowforgeError::directive(
                owner,
                "prefix",
                format!("\"{}\" length must be smaller than 'length' {}", prefix, length),
            ));
        }
        let kind = match subtype.as_str() {
            "isbn" | "issn" => CheckKind::Mod11,
            _ => CheckKind::WeightedMod10,
        };
        Ok(ChecksumGen {
            length,
            prefix,
            kind,
            draw,
        })
    }

    pub fn produce(&mut self, seed: &str, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let mut rng2 = rng_from_seed(&format!("{}{}", seed, n));
        let mut code = self.prefix.clone();
        for _ in 0..self.length - self.prefix.len() - 1 {
            code.push(char::from_digit(rng2.random_range(0..10), 10).unwrap());
        }
        let check = match self.kind {
            CheckKind::Luhn => luhn_digit(&code),
            CheckKind::WeightedMod10 => weighted_mod10_digit(&code),
            CheckKind::Mod11 => mod11_digit(&code),
        };
        code.push(check);
        Ok(Value::Text(code))
    }
}

/// Luhn check digit over the code body.
fn luhn_digit(s: &str) -> char {
    let digits: Vec<u32> = s.chars().filter_map(|c| c.to_digit(10)).collect();
    let mut total = 0;
    for (i, d) in digits.iter().rev().enumerate() {
        if i % 2 == 0 {
            // doubled positions contribute their digit sum
            let doubled = 2 * d;
            total += doubled / 10 + doubled % 10;
        } else {
            total += d;
        }
    }
    char::from_digit(9 * total % 10, 10).unwrap()
}

/// EAN13/UPC/ISMN weighted mod-10 checksum; 'M' counts as 3.
fn weighted_mod10_digit(s: &str) -> char {
    let mut total: u32 = 0;
    let mut weight = 3;
    for c in s.chars().rev() {
        let v = if c == 'M' { 3 } else { c.to_digit(10).unwrap_or(0) };
        total += weight * v;
        weight = 4 - weight; // 3 -> 1 -> 3 ...
    }
    char::from_digit((10 - total % 10) % 10, 10).unwrap()
}

/// ISBN-10/ISSN-8 weighted mod-11 checksum with an 'X' sentinel.
fn mod11_digit(s: &str) -> char {
    let mut total: u32 = 0;
    for (i, c) in s.chars().rev().enumerate() {
        total += c.to_digit(10).unwrap_or(0) * (i as u32 + 2);
    }
    match total % 11 {
        0 => '0',
        1 => 'X',
        t => char::from_digit(11 - t, 10).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::directive::{builtin_macros, tokenize, MacroTable};
    use rand::SeedableRng;

    fn ctx() -> GenerationContext {
        let config = RunConfig {
            seed: Some("t".to_string()),
            size: Some(100),
            ..RunConfig::default()
        };
        GenerationContext::new(config, builtin_macros())
    }

    fn dirs(s: &str) -> DirectiveMap {
        tokenize(s, &MacroTable::new(), "t").unwrap()
    }

    fn codes(g: &mut ChecksumGen, n: usize) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(1);
        (0..n)
            .map(|_| match g.produce("s_", &mut rng, "t").unwrap() {
                Value::Text(s) => s,
                v => panic!("expected text, got {:?}", v),
            })
            .collect()
    }

    /// Standard Luhn validation: the full code must sum to 0 mod 10.
    fn luhn_valid(code: &str) -> bool {
        let digits: Vec<u32> = code.chars().filter_map(|c| c.to_digit(10)).collect();
        let mut total = 0;
        for (i, d) in digits.iter().rev().enumerate() {
            if i % 2 == 1 {
                let doubled = 2 * d;
                total += doubled / 10 + doubled % 10;
            } else {
                total += d;
            }
        }
        total % 10 == 0
    }

    /// Standard EAN validation: weighted sum of the full code is 0 mod 10.
    fn ean_valid(code: &str) -> bool {
        let mut total = 0;
        let mut weight = 1;
        for c in code.chars().rev() {
            let v = if c == 'M' { 3 } else { c.to_digit(10).unwrap() };
            total += weight * v;
            weight = 4 - weight;
        }
        total % 10 == 0
    }

    #[test]
    fn test_luhn_codes_validate() {
        let mut c = ctx();
        let mut g = ChecksumGen::luhn_from_directives(&mut dirs(""), None, &mut c, "t").unwrap();
        for code in codes(&mut g, 50) {
            assert_eq!(code.len(), 16);
            assert!(luhn_valid(&code), "invalid Luhn code {}", code);
        }
    }

    #[test]
    fn test_luhn_prefix_preserved() {
        let mut c = ctx();
        let mut g =
            ChecksumGen::luhn_from_directives(&mut dirs("prefix=4800"), None, &mut c, "t").unwrap();
        for code in codes(&mut g, 20) {
            assert!(code.starts_with("4800"), "{}", code);
            assert!(luhn_valid(&code), "invalid Luhn code {}", code);
        }
    }

    #[test]
    fn test_luhn_bad_config_rejected() {
        let mut c = ctx();
        assert!(
            ChecksumGen::luhn_from_directives(&mut dirs("length=1"), None, &mut c, "t").is_err()
        );
        assert!(ChecksumGen::luhn_from_directives(
            &mut dirs("length=4 prefix=4800"),
            None,
            &mut c,
            "t"
        )
        .is_err());
        assert!(
            ChecksumGen::luhn_from_directives(&mut dirs("prefix=000B"), None, &mut c, "t").is_err()
        );
    }

    #[test]
    fn test_ean13_codes_validate() {
        let mut c = ctx();
        let mut g =
            ChecksumGen::ean_from_directives(&mut dirs(""), None, &mut c, Some("ean13"), "t")
                .unwrap();
        for code in codes(&mut g, 50) {
            assert_eq!(code.len(), 13);
            assert!(ean_valid(&code), "invalid EAN {}", code);
        }
    }

    #[test]
    fn test_isbn13_prefix() {
        let mut c = ctx();
        let mut g =
            ChecksumGen::ean_from_directives(&mut dirs(""), None, &mut c, Some("isbn13"), "t")
                .unwrap();
        for code in codes(&mut g, 20) {
            assert!(code.starts_with("978"), "{}", code);
            assert_eq!(code.len(), 13);
            assert!(ean_valid(&code), "invalid ISBN13 {}", code);
        }
    }

    #[test]
    fn test_isbn10_mod11_validates() {
        let mut c = ctx();
        let mut g =
            ChecksumGen::ean_from_directives(&mut dirs(""), None, &mut c, Some("isbn"), "t")
                .unwrap();
        for code in codes(&mut g, 50) {
            assert_eq!(code.len(), 10);
            // ISBN-10 check: sum of digit * position-weight (10..1) is 0 mod 11
            let total: u32 = code
                .chars()
                .rev()
                .enumerate()
                .map(|(i, ch)| {
                    let v = if ch == 'X' { 10 } else { ch.to_digit(10).unwrap() };
                    v * (i as u32 + 1)
                })
                .sum();
            assert_eq!(total % 11, 0, "invalid ISBN-10 {}", code);
        }
    }

    #[test]
    fn test_ismn_m_prefix() {
        let mut c = ctx();
        let mut g = ChecksumGen::ean_from_directives(&mut dirs(""), None, &mut c, Some("ismn"), "t")
            .unwrap();
        for code in codes(&mut g, 20) {
            assert!(code.starts_with('M'), "{}", code);
            assert_eq!(code.len(), 10);
        }
    }

    #[test]
    fn test_ean_oversized_prefix_rejected() {
        let mut c = ctx();
        assert!(ChecksumGen::ean_from_directives(
            &mut dirs("prefix=12345678"),
            None,
            &mut c,
            Some("issn"),
            "t"
        )
        .is_err());
    }
}
