//! # Integer Draws
//!
//! `IntDraw` is the machinery shared by the `int` generator and everything
//! built on top of it (word, string, date, timestamp, interval, inet, ean,
//! luhn, mac, blob, file, array, repeat, text): a sub-type selects a base
//! index in `[0, size)`, then a bijective permutation mangles it:
//!
//! ```text
//! value = offset + (shift + step * (base "^" xor)) % size
//! ```
//!
//! `step` must be coprime with `size` (it is silently reset to 1 with a
//! warning otherwise); the xor stage is applied only within the largest
//! power-of-two block that fits `size`, which preserves bijectivity.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::warn;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::schema::types::Attribute;

/// 60 handy primes for step mangling, about every 10,000,000.
pub const STEP_PRIMES: [i64; 60] = [
    1234567129, 1244567413, 1254567911, 1264567631, 1274567381,
    1284567247, 1294567787, 1304567897, 1314568139, 1324568251,
    1334568007, 1344567943, 1354567987, 1364568089, 1374568339,
    1384568699, 1394567981, 1404568153, 1414568359, 1424568473,
    1434567973, 1444568269, 1454567999, 1464568463, 1474568531,
    1484568011, 1494568219, 1504568887, 1514568533, 1524567899,
    1534568531, 1544568271, 1554568441, 1564568519, 1574568419,
    1584567949, 1594568149, 1604568283, 1614568231, 1624568417,
    1634568427, 1644568397, 1654568557, 1664568677, 1674568109,
    1684568321, 1694568241, 1704567959, 1714568899, 1724568239,
    1734567899, 1744567901, 1754567891, 1764567913, 1774567901,
    1784567899, 1794567911, 1804567907, 1814567891, 1824567893,
];

/// Index-selection sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSub {
    /// A counter modulo size: distinct values up to size draws.
    Serial,
    /// Serial for the first `size` draws, then uniform.
    Serand,
    /// Uniform over `[0, size)`.
    Uniform,
    /// `floor(size * U^alpha)`: skewed towards 0.
    Power,
    /// `floor(size * v / ((1-alpha)*v + alpha))`: a shallower skew.
    Scale,
}

impl IntSub {
    fn parse(s: &str, owner: &str) -> Result<IntSub> {
        Ok(match s {
            "serial" => IntSub::Serial,
            "serand" => IntSub::Serand,
            "uniform" => IntSub::Uniform,
            "power" => IntSub::Power,
            "scale" => IntSub::Scale,
            _ => {
                return Err(RowforgeError::directive(
                    owner,
                    "sub",
                    format!("invalid int generator '{}'", s),
                ))
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntDraw {
    sub: IntSub,
    pub offset: i64,
    size: Option<i64>,
    step: i64,
    shift: Option<i64>,
    xor: Option<i64>,
    mask: i64,
    mangle: bool,
    alpha: Option<f64>,
    rate: Option<f64>,
    draws: i64,
}

impl IntDraw {
    /// Drain the int-generator directives. `build_rng` supplies the
    /// construction-time randomness used by `mangle`; `global_offset` is the
    /// run-level primary-key offset.
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        global_offset: Option<i64>,
        build_rng: &mut StdRng,
        owner: &str,
    ) -> Result<IntDraw> {
        let sub = match dirs.take_text("sub") {
            Some(s) => IntSub::parse(&s, owner)?,
            None => {
                if att.map(|a| a.is_unique_role()).unwrap_or(false) {
                    IntSub::Serial
                } else {
                    IntSub::Uniform
                }
            }
        };

        let offset = if let Some(o) = dirs.take_int("offset", owner)? {
            o
        } else if att.map(|a| a.is_pk || a.fk.is_some()).unwrap_or(false) {
            global_offset.unwrap_or(1)
        } else {
            1
        };

        let has_alpha = dirs.contains("alpha");
        let has_rate = dirs.contains("rate");
        if (has_alpha || has_rate) && !matches!(sub, IntSub::Power | IntSub::Scale) {
            return Err(RowforgeError::directive(
                owner,
                if has_alpha { "alpha" } else { "rate" },
                format!("unexpected for int generator '{:?}'", sub),
            ));
        }
        if has_alpha && has_rate {
            return Err(RowforgeError::directive(
                owner,
                "alpha",
                "not both 'alpha' and 'rate'",
            ));
        }
        let alpha = dirs.take_float("alpha", owner)?;
        let rate = dirs.take_float("rate", owner)?;

        let mangle = dirs.take_flag("mangle", owner)?;
        let step = if let Some(s) = dirs.take_int("step", owner)? {
            s
        } else if mangle {
            STEP_PRIMES[build_rng.random_range(0..STEP_PRIMES.len())]
        } else {
            1
        };
        if step == 0 {
            return Err(RowforgeError::directive(owner, "step", "must not be zero"));
        }
        let shift = dirs.take_int("shift", owner)?;
        let xor = dirs.take_int("xor", owner)?;

        let mut draw = IntDraw {
            sub,
            offset,
            size: None,
            step,
            shift,
            xor,
            mask: 0,
            mangle,
            alpha,
            rate,
            draws: 0,
        };
        if let Some(size) = dirs.take_int("size", owner)? {
            draw.set_size(size, build_rng, owner)?;
        } else if let Some(size) = att.and_then(|a| a.size) {
            draw.set_size(size, build_rng, owner)?;
        }
        Ok(draw)
    }

    pub fn size(&self) -> Option<i64> {
        self.size
    }

    /// Fix the domain size and derive the size-dependent parameters: the
    /// coprimality of `step`, the xor mask, and the skew `alpha` when only a
    /// target zero-probability `rate` was given.
    pub fn set_size(&mut self, size: i64, build_rng: &mut StdRng, owner: &str) -> Result<()> {
        if size <= 0 {
            return Err(RowforgeError::directive(
                owner,
                "size",
                format!("{} must be > 0", size),
            ));
        }
        self.size = Some(size);
        if size <= 1 {
            self.shift = Some(0);
            return Ok(());
        }
        if self.step != 1 && gcd(size, self.step.abs()) != 1 {
            // very unlikely for big prime steps
            warn!("{}: step {} ignored for size {}", owner, self.step, size);
            self.step = 1;
        }
        if self.xor.is_none() {
            self.xor = Some(if self.mangle {
                build_rng.random_range(1..size.saturating_mul(1000))
            } else {
                0
            });
        }
        if self.shift.is_none() {
            self.shift = Some(if self.mangle {
                build_rng.random_range(0..size)
            } else {
                0
            });
        }
        if self.xor != Some(0) {
            // largest power of two <= size
            let mut m: i64 = 1;
            while m <= size / 2 {
                m *= 2;
            }
            self.mask = m;
        }
        if matches!(self.sub, IntSub::Power | IntSub::Scale) {
            if let Some(rate) = self.rate {
                if !(0.0 < rate && rate < 1.0) {
                    return Err(RowforgeError::directive(
                        owner,
                        "rate",
                        format!("{} not in (0,1)", rate),
                    ));
                }
                self.alpha = Some(match self.sub {
                    IntSub::Power => -(size as f64).ln() / rate.ln(),
                    _ => rate * (size as f64 - 1.0) / (1.0 - rate),
                });
            } else if self.alpha.is_none() {
                self.alpha = Some(1.0);
            }
            let alpha = self.alpha.unwrap();
            if alpha <= 0.0 {
                return Err(RowforgeError::directive(
                    owner,
                    "alpha",
                    format!("{} not > 0", alpha),
                ));
            }
        }
        Ok(())
    }

    /// Draw the next value in `[offset, offset+size-1]`.
    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<i64> {
        let size = self.size.ok_or_else(|| RowforgeError::SizeNotSet {
            owner: owner.to_string(),
        })?;
        self.draws += 1;
        if size == 1 {
            return Ok(self.offset);
        }
        let alpha = self.alpha.unwrap_or(1.0);
        let mut base = match self.sub {
            IntSub::Serial => (self.draws - 1) % size,
            IntSub::Serand if self.draws - 1 < size => (self.draws - 1) % size,
            IntSub::Serand | IntSub::Uniform => rng.random_range(0..size),
            IntSub::Power => (size as f64 * rng.random::<f64>().powf(alpha)) as i64,
            IntSub::Scale => {
                let v: f64 = rng.random();
                (size as f64 * (v / ((1.0 - alpha) * v + alpha))) as i64
            }
        };
        debug_assert!((0..size).contains(&base), "base {} not in [0,{})", base, size);
        base = base.clamp(0, size - 1);
        if self.xor.unwrap_or(0) != 0 {
            // non linear step: xor the largest power-of-two block that both
            // fits under size and contains the base index
            let xor = self.xor.unwrap();
            let mut m = self.mask;
            while m > 0 {
                if m & size != 0 && m & base == 0 {
                    base = ((base ^ xor) & (m - 1)) | (base & !(m - 1));
                    break;
                }
                m /= 2;
            }
        }
        let shift = self.shift.unwrap_or(0);
        let mangled =
            (shift as i128 + self.step as i128 * base as i128).rem_euclid(size as i128) as i64;
        Ok(self.offset + mangled)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
