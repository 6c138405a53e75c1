//! Input handling for the traced query and substituted source queries.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read the query from `file`, or from stdin if no file is given.
pub fn read_query(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => read_file(path),
        None => read_from_stdin(),
    }
}

/// Read every `NAME=FILE` source into a name to SQL map.
pub fn read_sources(sources: &[(String, PathBuf)]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (name, path) in sources {
        let sql = read_file(path).with_context(|| format!("Failed to load source '{name}'"))?;
        if map.insert(name.clone(), sql).is_some() {
            bail!("source '{name}' given more than once");
        }
    }
    Ok(map)
}

fn read_from_stdin() -> Result<String> {
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read from stdin")?;
    Ok(content)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
}
