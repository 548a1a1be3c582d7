pub mod describe;
pub mod fill;
pub mod sample;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;

/// Read the schema input: the given files concatenated, or standard input.
pub fn read_input(files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    let mut text = String::new();
    if files.is_empty() {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading standard input")?;
    } else {
        for path in files {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            text.push_str(&body);
        }
    }
    Ok(text.lines().map(str::to_string).collect())
}
