use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rowforge_core::Target;

#[derive(Parser, Debug)]
#[command(
    name = "rowforge",
    about = "Generate constraint-respecting random rows from SQL schemas annotated with directives",
    version,
    after_help = "Examples:\n  rowforge fill --size 1000 schema.sql > data.sql\n  rowforge fill --size 1000 --filter schema.sql | psql mydb\n  rowforge fill --target csv --seed Calvin schema.sql\n  rowforge describe schema.sql\n  rowforge sample 'int size=10 mangle' '!bool rate=0.3'"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read schema files and emit generated data
    Fill(FillArgs),

    /// Show the parsed schema model: tables, attributes, sizes, directives
    Describe(DescribeArgs),

    /// Exercise one generator from a directive string
    Sample(SampleArgs),
}

#[derive(Parser, Debug)]
pub struct FillArgs {
    /// Schema files to process; standard input when empty
    pub files: Vec<PathBuf>,

    /// Global scale: table sizes are mult * size
    #[arg(short, long)]
    pub size: Option<i64>,

    /// Seed the run for reproducible output
    #[arg(short = 'S', long)]
    pub seed: Option<String>,

    /// Probability of generating NULL for nullable attributes
    #[arg(short, long)]
    pub null: Option<f64>,

    /// Default offset for integer primary keys
    #[arg(short = 'O', long)]
    pub offset: Option<i64>,

    /// How hard to try to satisfy unique constraints
    #[arg(long, default_value = "10")]
    pub tries: usize,

    /// Target database engine
    #[arg(short, long, default_value = "postgresql")]
    pub target: TargetArg,

    /// Wrap the output in a transaction
    #[arg(short = 'T', long)]
    pub transaction: bool,

    /// Truncate table contents before filling
    #[arg(long)]
    pub truncate: bool,

    /// Drop tables before recreating them (implies --filter)
    #[arg(long)]
    pub drop: bool,

    /// Echo the input schema before the data
    #[arg(short, long)]
    pub filter: bool,

    /// Turn filtering back off
    #[arg(long)]
    pub no_filter: bool,

    /// Do not use PostgreSQL COPY FREEZE
    #[arg(long)]
    pub no_freeze: bool,

    /// Less verbose SQL output
    #[arg(short, long)]
    pub quiet: bool,

    /// Add a custom type (repeatable)
    #[arg(long = "type")]
    pub custom_types: Vec<String>,

    /// Write to this file instead of standard output
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DescribeArgs {
    /// Schema files to process; standard input when empty
    pub files: Vec<PathBuf>,

    /// Global scale used to resolve table sizes
    #[arg(short, long)]
    pub size: Option<i64>,

    /// Add a custom type (repeatable)
    #[arg(long = "type")]
    pub custom_types: Vec<String>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: DescribeFormat,
}

#[derive(Parser, Debug)]
pub struct SampleArgs {
    /// Directive strings; 'name: directives' defines a macro, a leading '!'
    /// shows a histogram, a leading '-' prints values on one line
    pub specs: Vec<String>,

    /// Number of draws (default 10, histograms 10000)
    #[arg(short, long)]
    pub size: Option<i64>,

    /// Seed the draws for reproducible output
    #[arg(short = 'S', long)]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum TargetArg {
    Postgresql,
    Mysql,
    Csv,
}

impl From<TargetArg> for Target {
    fn from(t: TargetArg) -> Target {
        match t {
            TargetArg::Postgresql => Target::Postgres,
            TargetArg::Mysql => Target::Mysql,
            TargetArg::Csv => Target::Csv,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum DescribeFormat {
    Table,
    Json,
}
