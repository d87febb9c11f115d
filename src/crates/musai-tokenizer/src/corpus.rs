//! Token corpus files: one `{"ids": [...], "programs": [...]}` document per MIDI file

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TokenizerError};
use crate::params::TOKEN_PARAMS_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFile {
    pub ids: Vec<u32>,
    /// `(program, is_drum)` of every track
    pub programs: Vec<(u8, bool)>,
}

pub fn save_tokens(path: &Path, tokens: &TokenFile) -> Result<()> {
    let json = serde_json::to_string(tokens).map_err(|e| TokenizerError::json(path, e))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_tokens(path: &Path) -> Result<TokenFile> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| TokenizerError::json(path, e))
}

/// Corpus file stem for a MIDI path: the lowercased file name with every run of other
/// characters than `[0-9a-z_]` replaced by `_`
pub fn sanitize_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut name = String::with_capacity(file_name.len());
    let mut in_run = false;
    for c in file_name.chars() {
        if c.is_ascii_digit() || c.is_ascii_lowercase() || c == '_' {
            name.push(c);
            in_run = false;
        } else if !in_run {
            name.push('_');
            in_run = true;
        }
    }
    name
}

/// Corpus file names for a sorted list of MIDI paths
///
/// Later paths whose sanitized name is already taken get `_2`, `_3`, ... suffixes.
pub fn unique_names(paths: &[PathBuf]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    paths
        .iter()
        .map(|path| {
            let stem = sanitize_name(path);
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, count)
            }
        })
        .collect()
}

/// Corpus files directly under a directory, sorted, without the params file
pub fn list_token_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let is_params = path.file_name().is_some_and(|name| name == TOKEN_PARAMS_NAME);
        if path.is_file() && is_json && !is_params {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
