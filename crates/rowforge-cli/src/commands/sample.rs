use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::bail;
use regex::Regex;
use rowforge_core::directive::{builtin_macros, tokenize};
use rowforge_core::generate::context::GenerationContext;
use rowforge_core::generate::node::{
    build_generator, find_directive_generator, kind_for_type, GENERATOR_NAMES,
};
use rowforge_core::RunConfig;

use crate::args::SampleArgs;

static RE_MACRO_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\w.]+)\s*:\s*(.*)$").unwrap());

/// Exercise generators from directive strings, the way a schema attribute
/// would configure them. `name: directives` defines a macro for later specs;
/// a leading `!` prints a value histogram, a leading `-` a one-line sample.
pub fn run(args: &SampleArgs) -> anyhow::Result<()> {
    let mut config = RunConfig {
        size: args.size,
        seed: args.seed.clone(),
        ..RunConfig::default()
    };
    config.finalize(&mut Default::default())?;
    let mut ctx = GenerationContext::new(config, builtin_macros());

    for (i, spec) in args.specs.iter().enumerate() {
        println!("-- sample {}: {}", i + 1, spec);
        if let Some(c) = RE_MACRO_DEF.captures(spec) {
            let name = c[1].to_string();
            if GENERATOR_NAMES.contains(&name.as_str()) {
                bail!("do not use generator name '{}' as a macro name", name);
            }
            let map = tokenize(&c[2], &ctx.macros, &name)?;
            ctx.macros.insert(name, map);
            continue;
        }
        let (mode, body) = match spec.trim_start().chars().next() {
            Some('!') => (Mode::Histogram, spec.trim_start()[1..].to_string()),
            Some('-') => (Mode::Short, spec.trim_start()[1..].to_string()),
            _ => (Mode::Lines, spec.to_string()),
        };
        let dirs = tokenize(&body, &ctx.macros, "sample")?;
        let kind = match find_directive_generator(&dirs, "sample")? {
            Some(k) => k,
            None => match dirs
                .get("type")
                .map(|v| v.as_text().to_lowercase())
                .as_deref()
                .and_then(kind_for_type)
            {
                Some(k) => k.to_string(),
                None => bail!("must specify a generator: {}", spec),
            },
        };
        let mut g = build_generator(&mut ctx, None, Some(&kind), dirs, "sample")?;
        g.set_default_size(args.size.unwrap_or(10), &mut ctx)?;
        match mode {
            Mode::Histogram => {
                let n = args.size.unwrap_or(10000);
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                for _ in 0..n {
                    ctx.advance_row();
                    g.sync_row(&mut ctx)?;
                    let v = g.draw(&mut ctx)?;
                    *counts.entry(v.to_string()).or_default() += 1;
                }
                println!("histogram on {} draws", n);
                for (value, count) in counts {
                    println!("{}: {:6.3} %", value, 100.0 * count as f64 / n as f64);
                }
            }
            Mode::Short | Mode::Lines => {
                let n = args.size.unwrap_or(10);
                let mut shown = Vec::new();
                for j in 0..n {
                    ctx.advance_row();
                    g.sync_row(&mut ctx)?;
                    let v = g.draw(&mut ctx)?;
                    if matches!(mode, Mode::Short) {
                        shown.push(v.to_string());
                    } else {
                        println!("{}: {}", j, v);
                    }
                }
                if matches!(mode, Mode::Short) {
                    println!("{}", shown.join(" "));
                }
            }
        }
    }
    Ok(())
}

enum Mode {
    Histogram,
    Short,
    Lines,
}
