//! Composite generators: combinators over owned sub-generator trees.

use rand::rngs::StdRng;
use rand::Rng;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::GenerationContext;
use crate::generate::int::IntDraw;
use crate::generate::node::{build_generator, macro_generator, Generator, GENERATOR_NAMES};
use crate::generate::textual::LenBounds;
use crate::generate::value::Value;
use crate::schema::types::Attribute;

/// Parse a comma-separated list of macro names (or bare generator names)
/// into sub-generators.
fn list_of_generators(
    spec: &str,
    ctx: &mut GenerationContext,
    owner: &str,
) -> Result<Vec<Generator>> {
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    let mut gens = Vec::new();
    for name in spec.split(',') {
        let g = if ctx.macros.contains_key(name) {
            macro_generator(ctx, name, None, owner)?
        } else if GENERATOR_NAMES.contains(&name) {
            build_generator(ctx, None, Some(name), DirectiveMap::new(), owner)?
        } else {
            return Err(RowforgeError::UnknownMacro {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        };
        gens.push(g);
    }
    Ok(gens)
}

/// SQL arrays: a sub-generator repeated N times, N drawn from an internal
/// integer draw over the length bounds. No sub-generator means empty arrays.
pub struct ArrayGen {
    pub sub: Option<Box<Generator>>,
    pub count: IntDraw,
}

impl ArrayGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        type_text: Option<&str>,
        owner: &str,
    ) -> Result<ArrayGen> {
        let sub = match dirs.take_text("array") {
            Some(name) if !name.is_empty() => {
                Some(Box::new(macro_generator(ctx, &name, None, owner)?))
            }
            _ => None,
        };
        let mut count = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let len = LenBounds::from_directives(dirs, type_text, 5, 25, owner)?;
        if sub.is_some() {
            count.set_size(len.max - len.min + 1, &mut ctx.build_rng, owner)?;
            count.offset = len.min;
        } else {
            count.set_size(1, &mut ctx.build_rng, owner)?;
            count.offset = 0;
        }
        Ok(ArrayGen { sub, count })
    }

    pub fn produce(
        &mut self,
        rng: &mut StdRng,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<Value> {
        let n = self.count.produce(rng, owner)?;
        let mut items = Vec::with_capacity(n.max(0) as usize);
        if let Some(sub) = &mut self.sub {
            for _ in 0..n.max(0) {
                items.push(sub.produce(ctx)?);
            }
        }
        Ok(Value::List(items))
    }
}

/// A repeated sub-generator joined into one string; the repetition count
/// comes from an `extent=min-max` directive (or the pattern quantifier).
pub struct RepeatGen {
    pub sub: Box<Generator>,
    pub count: IntDraw,
}

impl RepeatGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<RepeatGen> {
        let name = dirs.take_text("repeat").unwrap_or_default();
        if name.is_empty() {
            return Err(RowforgeError::directive(owner, "repeat", "mandatory directive"));
        }
        let sub = macro_generator(ctx, &name, None, owner)?;
        let (min, max) = take_extent(dirs, owner)?;
        Self::with_sub(sub, min, max, dirs, att, ctx, owner)
    }

    /// Constructor used by the pattern compiler for quantifiers.
    pub(crate) fn with_sub(
        sub: Generator,
        min: i64,
        max: i64,
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<RepeatGen> {
        let mut count = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        count.set_size(max - min + 1, &mut ctx.build_rng, owner)?;
        count.offset = min;
        Ok(RepeatGen {
            sub: Box::new(sub),
            count,
        })
    }

    pub fn produce(
        &mut self,
        rng: &mut StdRng,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<Value> {
        let n = self.count.produce(rng, owner)?;
        let mut out = String::new();
        for _ in 0..n.max(0) {
            out.push_str(&self.sub.produce(ctx)?.to_string());
        }
        Ok(Value::Text(out))
    }
}

fn take_extent(dirs: &mut DirectiveMap, owner: &str) -> Result<(i64, i64)> {
    match dirs.take("extent") {
        None => Ok((1, 1)),
        Some(v) => {
            for k in ["length", "lenvar", "lenmin", "lenmax"] {
                if dirs.contains(k) {
                    return Err(RowforgeError::directive(
                        owner,
                        "extent",
                        "both 'extent' and 'len*' directives",
                    ));
                }
            }
            let text = v.as_text();
            let (min, max) = match text.split_once('-') {
                Some((lo, hi)) => (lo.parse::<i64>(), hi.parse::<i64>()),
                None => (text.parse::<i64>(), text.parse::<i64>()),
            };
            match (min, max) {
                (Ok(lo), Ok(hi)) if 0 <= lo && lo <= hi => Ok((lo, hi)),
                _ => Err(RowforgeError::directive(
                    owner,
                    "extent",
                    format!("bad 'extent' {}", text),
                )),
            }
        }
    }
}

/// Concatenation of sub-generator outputs into one string.
pub struct CatGen {
    pub subs: Vec<Generator>,
}

impl CatGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        _att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<CatGen> {
        let spec = dirs.take_text("cat").unwrap_or_default();
        Ok(CatGen {
            subs: list_of_generators(&spec, ctx, owner)?,
        })
    }

    pub(crate) fn from_parts(subs: Vec<Generator>) -> CatGen {
        CatGen { subs }
    }

    pub fn produce(&mut self, ctx: &mut GenerationContext) -> Result<Value> {
        let mut out = String::new();
        for sub in &mut self.subs {
            out.push_str(&sub.draw(ctx)?.to_string());
        }
        Ok(Value::Text(out))
    }
}

/// A fixed tuple of named sub-generators.
pub struct TupleGen {
    pub subs: Vec<Generator>,
}

impl TupleGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        _att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<TupleGen> {
        let spec = dirs.take_text("tuple").unwrap_or_default();
        Ok(TupleGen {
            subs: list_of_generators(&spec, ctx, owner)?,
        })
    }

    pub fn produce(&mut self, ctx: &mut GenerationContext) -> Result<Value> {
        let mut items = Vec::with_capacity(self.subs.len());
        for sub in &mut self.subs {
            items.push(sub.draw(ctx)?);
        }
        Ok(Value::Tuple(items))
    }
}

/// Reduction operators for [`ReduceGen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Add,
    Mul,
    Min,
    Max,
    Cat,
}

impl ReduceOp {
    fn parse(s: &str, owner: &str) -> Result<ReduceOp> {
        Ok(match s {
            "+" => ReduceOp::Add,
            "*" => ReduceOp::Mul,
            "min" => ReduceOp::Min,
            "max" => ReduceOp::Max,
            "cat" => ReduceOp::Cat,
            _ => {
                return Err(RowforgeError::directive(
                    owner,
                    "op",
                    format!("unexpected operation '{}', expecting *, +, cat, max, min", s),
                ))
            }
        })
    }
}

/// A left-fold of sub-generator outputs under one operator.
pub struct ReduceGen {
    pub subs: Vec<Generator>,
    op: ReduceOp,
}

impl ReduceGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        _att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<ReduceGen> {
        let spec = dirs.take_text("reduce").unwrap_or_default();
        let subs = list_of_generators(&spec, ctx, owner)?;
        if subs.is_empty() {
            return Err(RowforgeError::directive(owner, "reduce", "empty generator list"));
        }
        let op = ReduceOp::parse(&dirs.take_text("op").unwrap_or_else(|| "+".into()), owner)?;
        Ok(ReduceGen { subs, op })
    }

    pub fn produce(&mut self, ctx: &mut GenerationContext, owner: &str) -> Result<Value> {
        let mut acc: Option<Value> = None;
        for sub in &mut self.subs {
            let v = sub.draw(ctx)?;
            acc = Some(match acc {
                None => v,
                Some(a) => apply_op(self.op, a, v, owner)?,
            });
        }
        Ok(acc.expect("non-empty checked at construction"))
    }
}

fn apply_op(op: ReduceOp, a: Value, b: Value, owner: &str) -> Result<Value> {
    let numeric = |v: &Value| -> Result<f64> {
        v.as_f64().ok_or_else(|| RowforgeError::directive(
            owner,
            "reduce",
            format!("non-numeric value {:?}", v),
        ))
    };
    Ok(match op {
        ReduceOp::Add => Value::Float(numeric(&a)? + numeric(&b)?),
        ReduceOp::Mul => Value::Float(numeric(&a)? * numeric(&b)?),
        ReduceOp::Min | ReduceOp::Max => {
            let keep_a = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => {
                    if op == ReduceOp::Min {
                        x <= y
                    } else {
                        x > y
                    }
                }
                _ => {
                    let (x, y) = (a.to_string(), b.to_string());
                    if op == ReduceOp::Min {
                        x <= y
                    } else {
                        x > y
                    }
                }
            };
            if keep_a {
                a
            } else {
                b
            }
        }
        ReduceOp::Cat => Value::Text(format!("{}{}", a, b)),
    })
}

/// Weighted alternation: one uniform draw over the total weight, then a
/// cumulative scan selects the sub-generator.
pub struct AltGen {
    pub subs: Vec<Generator>,
    weights: Vec<i64>,
    total_weight: i64,
}

impl AltGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        _att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<AltGen> {
        let spec = dirs.take_text("alt").unwrap_or_default();
        if spec.is_empty() {
            return Err(RowforgeError::directive(owner, "alt", "mandatory directive"));
        }
        let mut subs = Vec::new();
        let mut weights = Vec::new();
        let mut total_weight = 0;
        // weighted macro list: 'macro1:3,macro2,macro3:3'
        for entry in spec.split(',') {
            let (name, weight) = match entry.split_once(':') {
                Some((m, w)) => {
                    let w: i64 = w.parse().map_err(|_| {
                        RowforgeError::directive(owner, "alt", format!("bad weight in '{}'", entry))
                    })?;
                    (m, w)
                }
                None => (entry, 1),
            };
            if weight <= 0 {
                return Err(RowforgeError::directive(
                    owner,
                    "alt",
                    format!("weight {} must be > 0", weight),
                ));
            }
            subs.push(macro_generator(ctx, name, None, owner)?);
            weights.push(weight);
            total_weight += weight;
        }
        Ok(AltGen {
            subs,
            weights,
            total_weight,
        })
    }

    /// Equal-weight constructor used by the pattern compiler.
    pub(crate) fn from_parts(subs: Vec<Generator>) -> AltGen {
        let total_weight = subs.len() as i64;
        let weights = vec![1; subs.len()];
        AltGen {
            subs,
            weights,
            total_weight,
        }
    }

    pub fn produce(&mut self, rng: &mut StdRng, ctx: &mut GenerationContext) -> Result<Value> {
        let mut weight = rng.random_range(0..self.total_weight);
        let mut index = 0;
        while weight >= self.weights[index] {
            weight -= self.weights[index];
            index += 1;
        }
        self.subs[index].produce(ctx)
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
        let mut ctx = GenerationContext::new(config, builtin_macros());
        for (name, spec) in [
            ("ints", "int size=9 offset=0"),
            ("words", "word=:one,two,three"),
            ("f1", "float"),
            ("i1", "int size=2 offset=0"),
            ("zero", "chars='0' length=1 lenvar=0"),
        ] {
            ctx.macros.insert(
                name.to_string(),
                tokenize(spec, &MacroTable::new(), name).unwrap(),
            );
        }
        ctx
    }

    fn dirs(s: &str) -> DirectiveMap {
        tokenize(s, &MacroTable::new(), "t").unwrap()
    }

    #[test]
    fn test_array_without_sub_is_empty() {
        let mut c = ctx();
        let mut g = ArrayGen::from_directives(&mut dirs(""), None, &mut c, None, "t").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(g.produce(&mut rng, &mut c, "t").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_array_repeats_sub() {
        let mut c = ctx();
        let mut g = ArrayGen::from_directives(
            &mut dirs("array=ints lenmin=2 lenmax=2"),
            None,
            &mut c,
            None,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        match g.produce(&mut rng, &mut c, "t").unwrap() {
            Value::List(items) => {
                assert_eq!(items.len(), 2);
                assert!(items.iter().all(|v| matches!(v, Value::Int(0..=8))));
            }
            v => panic!("expected list, got {:?}", v),
        }
    }

    #[test]
    fn test_repeat_extent_bounds() {
        let mut c = ctx();
        let mut g = RepeatGen::from_directives(
            &mut dirs("repeat=zero extent=1-5"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            match g.produce(&mut rng, &mut c, "t").unwrap() {
                Value::Text(s) => {
                    assert!((1..=5).contains(&s.len()), "bad extent: '{}'", s);
                    assert!(s.chars().all(|ch| ch == '0'));
                }
                v => panic!("expected text, got {:?}", v),
            }
        }
    }

    #[test]
    fn test_repeat_bad_extent_rejected() {
        let mut c = ctx();
        assert!(
            RepeatGen::from_directives(&mut dirs("repeat=zero extent=5-1"), None, &mut c, "t")
                .is_err()
        );
        assert!(
            RepeatGen::from_directives(&mut dirs("repeat=zero extent=x"), None, &mut c, "t")
                .is_err()
        );
    }

    #[test]
    fn test_cat_concatenates() {
        let mut c = ctx();
        let mut g =
            CatGen::from_directives(&mut dirs("cat=i1,words"), None, &mut c, "t").unwrap();
        match g.produce(&mut c).unwrap() {
            Value::Text(s) => {
                assert!(
                    s.starts_with('0') || s.starts_with('1'),
                    "int part first: {}",
                    s
                );
            }
            v => panic!("expected text, got {:?}", v),
        }
    }

    #[test]
    fn test_tuple_shape() {
        let mut c = ctx();
        let mut g =
            TupleGen::from_directives(&mut dirs("tuple=i1,words"), None, &mut c, "t").unwrap();
        match g.produce(&mut c).unwrap() {
            Value::Tuple(items) => assert_eq!(items.len(), 2),
            v => panic!("expected tuple, got {:?}", v),
        }
    }

    #[test]
    fn test_empty_tuple() {
        let mut c = ctx();
        let mut g = TupleGen::from_directives(&mut dirs("tuple="), None, &mut c, "t").unwrap();
        assert_eq!(g.produce(&mut c).unwrap(), Value::Tuple(vec![]));
    }

    #[test]
    fn test_reduce_add_and_mul() {
        let mut c = ctx();
        let mut g =
            ReduceGen::from_directives(&mut dirs("reduce=i1,i1"), None, &mut c, "t").unwrap();
        match g.produce(&mut c, "t").unwrap() {
            Value::Float(v) => assert!((0.0..=2.0).contains(&v)),
            v => panic!("expected float, got {:?}", v),
        }
        let mut g =
            ReduceGen::from_directives(&mut dirs("reduce=f1,i1 op=max"), None, &mut c, "t")
                .unwrap();
        assert!(g.produce(&mut c, "t").is_ok());
    }

    #[test]
    fn test_reduce_bad_op_rejected() {
        let mut c = ctx();
        assert!(
            ReduceGen::from_directives(&mut dirs("reduce=f1,f1 op=sum"), None, &mut c, "t")
                .is_err()
        );
    }

    #[test]
    fn test_alt_weighted_choice() {
        let mut c = ctx();
        c.macros.insert(
            "a".to_string(),
            tokenize("const=A", &MacroTable::new(), "a").unwrap(),
        );
        c.macros.insert(
            "b".to_string(),
            tokenize("const=B", &MacroTable::new(), "b").unwrap(),
        );
        let mut g =
            AltGen::from_directives(&mut dirs("alt=a:9,b"), None, &mut c, "t").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut counts = (0, 0);
        for _ in 0..1000 {
            match g.produce(&mut rng, &mut c).unwrap() {
                Value::Text(s) if s == "A" => counts.0 += 1,
                Value::Text(s) if s == "B" => counts.1 += 1,
                v => panic!("unexpected {:?}", v),
            }
        }
        assert!(counts.0 > 800, "9:1 weighting, got {:?}", counts);
        assert!(counts.1 > 30, "minority branch still drawn, got {:?}", counts);
    }

    #[test]
    fn test_alt_zero_weight_rejected() {
        let mut c = ctx();
        assert!(AltGen::from_directives(&mut dirs("alt=ints:0"), None, &mut c, "t").is_err());
    }
}
