//! File-contents generator: draws a file from a set of path patterns and
//! inlines its contents, as bytes or text. The file is opened lazily, once
//! per draw.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;

use crate::directive::DirectiveMap;
use crate::error::{Result, RowforgeError};
use crate::generate::context::GenerationContext;
use crate::generate::int::IntDraw;
use crate::generate::value::Value;
use crate::schema::types::Attribute;

pub struct FileGen {
    files: Vec<PathBuf>,
    text_mode: bool,
    pub draw: IntDraw,
}

impl FileGen {
    pub fn from_directives(
        dirs: &mut DirectiveMap,
        att: Option<&Attribute>,
        ctx: &mut GenerationContext,
        owner: &str,
    ) -> Result<FileGen> {
        let spec = dirs.take_text("file").unwrap_or_default();
        if spec.is_empty() {
            return Err(RowforgeError::directive(owner, "file", "mandatory directive"));
        }
        let mut draw = IntDraw::from_directives(
            dirs,
            att,
            ctx.config.offset,
            &mut ctx.build_rng,
            owner,
        )?;
        let mut files = Vec::new();
        for pattern in spec.split(':') {
            files.extend(expand_pattern(pattern)?);
        }
        files.sort();
        if files.is_empty() {
            return Err(RowforgeError::directive(
                owner,
                "file",
                format!("no file matches '{}'", spec),
            ));
        }
        let text_mode = match dirs.take_text("mode").as_deref() {
            None | Some("blob") => false,
            Some("text") => true,
            Some(other) => {
                return Err(RowforgeError::directive(
                    owner,
                    "mode",
                    format!("'{}' must be 'blob' or 'text'", other),
                ))
            }
        };
        let count = files.len() as i64;
        match draw.size() {
            None => draw.set_size(count, &mut ctx.build_rng, owner)?,
            Some(size) if size > count => draw.set_size(count, &mut ctx.build_rng, owner)?,
            _ => {}
        }
        draw.offset = 0;
        Ok(FileGen {
            files,
            text_mode,
            draw,
        })
    }

    pub fn produce(&mut self, rng: &mut StdRng, owner: &str) -> Result<Value> {
        let ix = self.draw.produce(rng, owner)?;
        let path = &self.files[ix as usize];
        let bytes = std::fs::read(path).map_err(|e| RowforgeError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        if self.text_mode {
            let text = String::from_utf8(bytes).map_err(|e| RowforgeError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
            Ok(Value::Text(text))
        } else {
            Ok(Value::Bytes(bytes))
        }
    }
}

/// Expand one path pattern. A `*` in the final component matches a prefix
/// and suffix against the directory's entries; anything else is a literal
/// path (kept only if it exists).
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    if !name.contains('*') {
        let p = PathBuf::from(pattern);
        return Ok(if p.is_file() { vec![p] } else { Vec::new() });
    }
    let (prefix, suffix) = name.split_once('*').expect("checked above");
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let entries = std::fs::read_dir(&dir).map_err(|e| RowforgeError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RowforgeError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let fname = entry.file_name();
        let Some(fname) = fname.to_str() else { continue };
        if fname.starts_with(prefix)
            && fname.ends_with(suffix)
            && fname.len() >= prefix.len() + suffix.len()
            && entry.path().is_file()
        {
            out.push(entry.path());
        }
    }
    Ok(out)
}
