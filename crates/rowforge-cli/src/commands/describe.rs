use comfy_table::{presets::UTF8_FULL, Cell, Table as DisplayTable};
use rowforge_core::schema::scan::scan_schema;
use rowforge_core::RunConfig;

use crate::args::{DescribeArgs, DescribeFormat};
use crate::commands::read_input;

pub fn run(args: &DescribeArgs) -> anyhow::Result<()> {
    let mut config = RunConfig {
        size: args.size,
        custom_types: args.custom_types.clone(),
        ..RunConfig::default()
    };
    let lines = read_input(&args.files)?;
    let mut schema = scan_schema(&lines, &config)?;
    let mut schema_dirs = schema.directives.clone();
    config.finalize(&mut schema_dirs)?;
    schema.directives = schema_dirs;
    schema.resolve_sizes(&config)?;

    match args.format {
        DescribeFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        DescribeFormat::Table => {
            for table in &schema.tables {
                println!(
                    "{} ({} rows{})",
                    table.display_name(),
                    table.size.unwrap_or(0),
                    if table.skip > 0.0 {
                        format!(", skip {}", table.skip)
                    } else {
                        String::new()
                    }
                );
                let mut display = DisplayTable::new();
                display.load_preset(UTF8_FULL);
                display.set_header(vec!["attribute", "type", "flags", "size", "references"]);
                for att in &table.attributes {
                    let mut flags = Vec::new();
                    if att.is_pk {
                        flags.push("PK");
                    }
                    if att.is_unique {
                        flags.push("UNIQUE");
                    }
                    if att.not_null {
                        flags.push("NOT NULL");
                    }
                    if att.is_enum {
                        flags.push("ENUM");
                    }
                    let fk = att
                        .fk
                        .as_ref()
                        .map(|f| match &f.attribute {
                            Some(a) => format!("{}({})", f.table, a),
                            None => f.table.clone(),
                        })
                        .unwrap_or_default();
                    display.add_row(vec![
                        Cell::new(att.display_name()),
                        Cell::new(&att.type_text),
                        Cell::new(flags.join(" ")),
                        Cell::new(att.size.map(|s| s.to_string()).unwrap_or_default()),
                        Cell::new(fk),
                    ]);
                }
                println!("{display}");
                println!();
            }
            if !schema.enums.is_empty() {
                println!(
                    "enums: {}",
                    schema
                        .enums
                        .iter()
                        .map(|(k, v)| format!("{} ({} labels)", k, v.len()))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
    }
    Ok(())
}
