//! Date, timestamp and interval generators: integer-driven offsets from a
//! reference instant at a configurable precision.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::GenerationContext;
use crate::generate::int::IntDraw;
use crate::generate::value::Value;
use crate::schema::types::Attribute;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dates counted in `prec`-day steps from a reference date; with both
/// `start` and `end` given the domain size is inferred from the span.
pub struct DateGen {
    reference: NaiveDate,
    direction: i64,
    prec: i64,
    pub draw: IntDraw,
}

impl DateGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<DateGen> {
        let start = dirs.take_text("start");
        let end = dirs.take_text("end");
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        draw.offset = 0;
        let parse = |key: &str, s: &str| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| {
                RowforgeError::directive(owner, key, format!("bad date '{}'", s))
            })
        };
        let (reference, direction) = match (&start, &end) {
            (Some(s), _) => (parse("start", s)?, 1),
            (None, Some(e)) => (parse("end", e)?, -1),
            (None, None) => (chrono::Local::now().date_naive(), -1),
        };
        let prec = dirs.take_int("prec", owner)?.unwrap_or(1);
        if prec <= 0 {
            return Err(RowforgeError::directive(
                owner,
                "prec",
                format!("{} not > 0", prec),
            ));
        }
        if let (Some(_), Some(e)) = (&start, &end) {
            let end_date = parse("end", e)?;
            if end_date < reference {
                return Err(RowforgeError::directive(
                    owner,
                    "end",
                    "'end' must be after 'start'",
                ));
            }
            let span = (end_date - reference).num_days() / prec;
            draw.set_size(span + 1, &mut ctx.build_rng, owner)?;
        }
        Ok(DateGen {
            reference,
            direction,
            prec,
            draw,
        })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let d = self.reference + Duration::days(self.direction * self.prec * n);
        Ok(Value::Text(d.format(DATE_FORMAT).to_string()))
    }
}

/// Timestamps in `prec`-second steps from a reference instant, with an
/// optional time zone suffix.
pub struct TimestampGen {
    reference: NaiveDateTime,
    direction: i64,
    prec: i64,
    tz: Option<String>,
    pub draw: IntDraw,
}

impl TimestampGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<TimestampGen> {
        let start = dirs.take_text("start");
        let end = dirs.take_text("end");
        let tz = dirs.take_text("tz");
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        draw.offset = 0;
        let parse = |key: &str, s: &str| {
            NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| {
                RowforgeError::directive(owner, key, format!("bad timestamp '{}'", s))
            })
        };
        let (reference, direction) = match (&start, &end) {
            (Some(s), _) => (parse("start", s)?, 1),
            (None, Some(e)) => (parse("end", e)?, -1),
            (None, None) => (chrono::Local::now().naive_local(), -1),
        };
        let prec = dirs.take_int("prec", owner)?.unwrap_or(60);
        if prec <= 0 {
            return Err(RowforgeError::directive(
                owner,
                "prec",
                format!("{} not > 0", prec),
            ));
        }
        if let (Some(_), Some(e)) = (&start, &end) {
            let end_ts = parse("end", e)?;
            if end_ts < reference {
                return Err(RowforgeError::directive(
                    owner,
                    "end",
                    "'end' must be after 'start'",
                ));
            }
            let span = (end_ts - reference).num_seconds() / prec;
            draw.set_size(span + 1, &mut ctx.build_rng, owner)?;
        }
        Ok(TimestampGen {
            reference,
            direction,
            prec,
            tz,
            draw,
        })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        let t = self.reference + Duration::seconds(self.direction * self.prec * n);
        let mut text = t.format(TIMESTAMP_FORMAT).to_string();
        if let Some(tz) = &self.tz {
            text.push(' ');
            text.push_str(tz);
        }
        Ok(Value::Text(text))
    }
}

/// Time intervals rendered as `<value> <unit>`.
pub struct IntervalGen {
    unit: String,
    pub draw: IntDraw,
}

impl IntervalGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<IntervalGen> {
        let draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let unit = dirs.take_text("unit").unwrap_or_else(|| "s".to_string());
        Ok(IntervalGen { unit, draw })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let n = self.draw.produce(rng, owner)?;
        Ok(Value::Text(format!("{} {}", n, self.unit)))
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

    #[test]
    fn test_date_span_inferred_size() {
        let mut c = ctx();
        let mut g = DateGen::from_directives(
            &mut dirs("start=2038-01-19 end=2038-01-21"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        assert_eq!(g.draw.size(), Some(3));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..30 {
            match g.produce(&mut rng, "t").unwrap() {
                Value::Text(s) => assert!(
                    ["2038-01-19", "2038-01-20", "2038-01-21"].contains(&s.as_str()),
                    "bad date {}",
                    s
                ),
                v => panic!("expected text, got {:?}", v),
            }
        }
    }

    #[test]
    fn test_date_single_day() {
        let mut c = ctx();
        let mut g = DateGen::from_directives(
            &mut dirs("start=2038-01-19 end=2038-01-19"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        match g.produce(&mut rng, "t").unwrap() {
            Value::Text(s) => assert_eq!(s, "2038-01-19"),
            v => panic!("expected text, got {:?}", v),
        }
    }

    #[test]
    fn test_date_end_before_start_rejected() {
        let mut c = ctx();
        assert!(DateGen::from_directives(
            &mut dirs("start=2038-01-19 end=2038-01-18"),
            None,
            &mut c,
            "t"
        )
        .is_err());
    }

    #[test]
    fn test_date_bad_literal_rejected() {
        let mut c = ctx();
        assert!(DateGen::from_directives(&mut dirs("start=notadate"), None, &mut c, "t").is_err());
    }

    #[test]
    fn test_date_counts_backwards_from_end() {
        let mut c = ctx();
        let mut g = DateGen::from_directives(
            &mut dirs("end=1970-03-20 size=10"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..30 {
            match g.produce(&mut rng, "t").unwrap() {
                Value::Text(s) => {
                    let d = NaiveDate::parse_from_str(&s, DATE_FORMAT).unwrap();
                    let end = NaiveDate::from_ymd_opt(1970, 3, 20).unwrap();
                    let delta = (end - d).num_days();
                    assert!((0..10).contains(&delta), "bad date {}", s);
                }
                v => panic!("expected text, got {:?}", v),
            }
        }
    }

    #[test]
    fn test_timestamp_precision_steps() {
        let mut c = ctx();
        let mut g = TimestampGen::from_directives(
            &mut dirs("start='2013-12-26 17:31:05' size=7 prec=10"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let start =
            NaiveDateTime::parse_from_str("2013-12-26 17:31:05", TIMESTAMP_FORMAT).unwrap();
        for _ in 0..30 {
            match g.produce(&mut rng, "t").unwrap() {
                Value::Text(s) => {
                    let t = NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).unwrap();
                    let secs = (t - start).num_seconds();
                    assert!(secs % 10 == 0 && (0..70).contains(&secs), "bad ts {}", s);
                }
                v => panic!("expected text, got {:?}", v),
            }
        }
    }

    #[test]
    fn test_timestamp_span_size() {
        let mut c = ctx();
        let g = TimestampGen::from_directives(
            &mut dirs("start='2013-12-26 17:31:05' end='2013-12-26 17:32:05' prec=10"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        assert_eq!(g.draw.size(), Some(7));
    }

    #[test]
    fn test_timestamp_tz_suffix() {
        let mut c = ctx();
        let mut g = TimestampGen::from_directives(
            &mut dirs("start='2013-12-26 17:31:05' size=3 tz=UTC"),
            None,
            &mut c,
            "t",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        match g.produce(&mut rng, "t").unwrap() {
            Value::Text(s) => assert!(s.ends_with(" UTC"), "bad ts {}", s),
            v => panic!("expected text, got {:?}", v),
        }
    }

    #[test]
    fn test_interval_unit() {
        let mut c = ctx();
        let mut g =
            IntervalGen::from_directives(&mut dirs("unit=d size=365"), None, &mut c, "t").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        match g.produce(&mut rng, "t").unwrap() {
            Value::Text(s) => {
                assert!(s.ends_with(" d"), "bad interval {}", s);
                let n: i64 = s.split(' ').next().unwrap().parse().unwrap();
                assert!((1..=365).contains(&n));
            }
            v => panic!("expected text, got {:?}", v),
        }
    }
}
