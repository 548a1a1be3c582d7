//! Boolean, float and counter generators.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Beta, Distribution, Exp, Gamma, LogNormal, Normal, Pareto, Weibull};

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::value::Value;

/// Generate true/false at a given `rate`.
pub struct BoolGen {
    rate: f64,
}

impl BoolGen {
    pub fn from_directives(dirs: &mut DirectiveMap, owner: &str) -> Result<BoolGen> {
        let rate = dirs.take_float("rate", owner)?.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&rate) {
            return Err(RowforgeError::directive(
                owner,
                "rate",
                format!("{} not in [0,1]", rate),
            ));
        }
        Ok(BoolGen { rate })
    }

    pub fn produce(&self, rng: &mut StdRng) -> Value {
        Value::Bool(if self.rate == 0.0 {
            false
        } else if self.rate == 1.0 {
            true
        } else {
            rng.random::<f64>() < self.rate
        })
    }
}

/// Floats under one of several distributions, driven by the `float` sub-type
/// and the `alpha`/`beta` parameters.
pub struct FloatGen {
    dist: FloatDist,
}

enum FloatDist {
    Uniform { lo: f64, hi: f64 },
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Exp(Exp<f64>),
    Gamma(Gamma<f64>),
    Beta(Beta<f64>),
    Pareto(Pareto<f64>),
    Weibull(Weibull<f64>),
}

impl FloatGen {
    pub fn from_directives(dirs: &mut DirectiveMap, owner: &str) -> Result<FloatGen> {
        let sub = match dirs.take_text("float") {
            Some(s) if !s.is_empty() => s,
            _ => "uniform".to_string(),
        };
        // exp and pareto are one-parameter distributions
        if matches!(sub.as_str(), "exp" | "pareto") && dirs.contains("beta") {
            return Err(RowforgeError::directive(
                owner,
                "beta",
                format!("unexpected for float generator '{}'", sub),
            ));
        }
        let alpha = dirs.take_float("alpha", owner)?.unwrap_or(0.0);
        let beta = dirs.take_float("beta", owner)?.unwrap_or(1.0);
        let bad = |what: &str| RowforgeError::directive(owner, "float", what.to_string());
        let dist = match sub.as_str() {
            "uniform" => FloatDist::Uniform { lo: alpha, hi: beta },
            "gauss" | "norm" => FloatDist::Normal(
                Normal::new(alpha, beta).map_err(|e| bad(&format!("gauss: {}", e)))?,
            ),
            "log" => FloatDist::LogNormal(
                LogNormal::new(alpha, beta).map_err(|e| bad(&format!("log: {}", e)))?,
            ),
            "exp" => FloatDist::Exp(Exp::new(alpha).map_err(|e| bad(&format!("exp: {}", e)))?),
            "gamma" => FloatDist::Gamma(
                Gamma::new(alpha, beta).map_err(|e| bad(&format!("gamma: {}", e)))?,
            ),
            "beta" => {
                FloatDist::Beta(Beta::new(alpha, beta).map_err(|e| bad(&format!("beta: {}", e)))?)
            }
            "pareto" => FloatDist::Pareto(
                Pareto::new(1.0, alpha).map_err(|e| bad(&format!("pareto: {}", e)))?,
            ),
            "weibull" => FloatDist::Weibull(
                Weibull::new(alpha, beta).map_err(|e| bad(&format!("weibull: {}", e)))?,
            ),
            other => {
                return Err(RowforgeError::directive(
                    owner,
                    "float",
                    format!("unexpected float generator '{}'", other),
                ))
            }
        };
        Ok(FloatGen { dist })
    }

    pub fn produce(&self, rng: &mut StdRng) -> Value {
        let v = match &self.dist {
            FloatDist::Uniform { lo, hi } => lo + (hi - lo) * rng.random::<f64>(),
            FloatDist::Normal(d) => d.sample(rng),
            FloatDist::LogNormal(d) => d.sample(rng),
            FloatDist::Exp(d) => d.sample(rng),
            FloatDist::Gamma(d) => d.sample(rng),
            FloatDist::Beta(d) => d.sample(rng),
            FloatDist::Pareto(d) => d.sample(rng),
            FloatDist::Weibull(d) => d.sample(rng),
        };
        Value::Float(v)
    }
}

/// A simple counter with `start`, `step` and a d/o/x/X/b output format.
pub struct CountGen {
    start: i64,
    step: i64,
    format: CountFormat,
    draws: i64,
}

struct CountFormat {
    zero_pad: bool,
    width: usize,
    radix: char,
}

impl CountGen {
    pub fn from_directives(dirs: &mut DirectiveMap, owner: &str) -> Result<CountGen> {
        let start = dirs.take_int_lenient("start", owner)?.unwrap_or(1);
        let step = dirs.take_int("step", owner)?.unwrap_or(1);
        if step == 0 {
            return Err(RowforgeError::directive(owner, "step", "must not be zero"));
        }
        let format = CountFormat::parse(&dirs.take_text("format").unwrap_or_else(|| "d".into()))
            .ok_or_else(|| RowforgeError::directive(owner, "format", "expected [0][width][doxXb]"))?;
        Ok(CountGen {
            start,
            step,
            format,
            draws: 0,
        })
    }

    pub fn produce(&mut self) -> Value {
        self.draws += 1;
        let n = (self.draws - 1) * self.step + self.start;
        Value::Text(self.format.render(n))
    }
}

impl CountFormat {
    fn parse(spec: &str) -> Option<CountFormat> {
        let mut chars: Vec<char> = spec.chars().collect();
        let radix = match chars.last() {
            Some(c) if "doxXb".contains(*c) => {
                let c = *c;
                chars.pop();
                c
            }
            _ => 'd',
        };
        let zero_pad = chars.first() == Some(&'0') && chars.len() > 1;
        let digits: String = chars.into_iter().collect();
        let width = if digits.is_empty() {
            0
        } else {
            digits.parse().ok()?
        };
        Some(CountFormat {
            zero_pad,
            width,
            radix,
        })
    }

    fn render(&self, n: i64) -> String {
        if n < 0 {
            return format!("-{}", self.render_abs(n.unsigned_abs()));
        }
        self.render_abs(n as u64)
    }

    fn render_abs(&self, n: u64) -> String {
        let w = self.width;
        match (self.radix, self.zero_pad) {
            ('d', true) => format!("{:0w$}", n),
            ('d', false) => format!("{:w$}", n),
            ('o', true) => format!("{:0w$o}", n),
            ('o', false) => format!("{:w$o}", n),
            ('x', true) => format!("{:0w$x}", n),
            ('x', false) => format!("{:w$x}", n),
            ('X', true) => format!("{:0w$X}", n),
            ('X', false) => format!("{:w$X}", n),
            ('b', true) => format!("{:0w$b}", n),
            _ => format!("{:w$b}", n),
        }
    }
}
