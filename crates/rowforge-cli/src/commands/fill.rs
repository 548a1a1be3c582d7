use std::io::{BufWriter, Write};

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use rowforge_core::output::write_program;
use rowforge_core::schema::scan::scan_schema;
use rowforge_core::RunConfig;

use crate::args::FillArgs;
use crate::commands::read_input;

pub fn run(args: &FillArgs) -> anyhow::Result<()> {
    let mut config = RunConfig {
        size: args.size,
        seed: args.seed.clone(),
        null_rate: args.null,
        offset: args.offset,
        tries: args.tries,
        target: args.target.clone().into(),
        transaction: args.transaction,
        truncate: args.truncate,
        drop_tables: args.drop,
        // --drop needs the schema in the output, or there is nothing to fill
        filter: (args.filter || args.drop) && !args.no_filter,
        freeze: !args.no_freeze,
        quiet: args.quiet,
        custom_types: args.custom_types.clone(),
    };
    if config.filter && config.truncate {
        bail!("option --truncate does not make sense with --filter");
    }

    let lines = read_input(&args.files)?;
    let mut schema = scan_schema(&lines, &config)?;
    let mut schema_dirs = schema.directives.clone();
    config.finalize(&mut schema_dirs)?;
    schema.directives = schema_dirs;
    schema.resolve_sizes(&config)?;

    let input = if config.filter { Some(lines.as_slice()) } else { None };

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut out = BufWriter::new(file);
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} rows",
                )
                .expect("static template"),
            );
            let progress = |table: &str, done: u64, total: u64| {
                bar.set_length(total);
                bar.set_position(done);
                bar.set_message(table.to_string());
            };
            write_program(&schema, config, input, &mut out, Some(&progress))?;
            bar.finish_and_clear();
            out.flush().context("flushing output")?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            write_program(&schema, config, input, &mut out, None)?;
            out.flush().context("flushing output")?;
        }
    }
    Ok(())
}
