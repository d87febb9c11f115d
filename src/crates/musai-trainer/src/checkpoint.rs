use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ModelCheckpoint;
use crate::error::{Result, TrainerError};

const CHECKPOINT_PATTERN: &str = r"^rwkv-(\d+)\.pth$";

/// Name of the weights saved after an epoch
pub fn checkpoint_name(epoch: u32) -> String {
    format!("rwkv-{}.pth", epoch)
}

/// Model weights saved after a finished epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: u32,
    pub path: PathBuf,
}

/// Every `rwkv-<n>.pth` in a directory, by epoch
pub fn list_checkpoints(dir: &Path) -> Result<Vec<Checkpoint>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = Regex::new(CHECKPOINT_PATTERN)?;

    let mut checkpoints = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let epoch = pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        if let Some(epoch) = epoch {
            checkpoints.push(Checkpoint { epoch, path });
        }
    }
    checkpoints.sort_by_key(|c| c.epoch);
    Ok(checkpoints)
}

/// The checkpoint of the highest epoch in a directory
pub fn find_latest_checkpoint(dir: &Path) -> Result<Option<Checkpoint>> {
    Ok(list_checkpoints(dir)?.pop())
}

/// Weights to load and the epoch to continue from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub path: PathBuf,
    pub epoch_begin: u32,
}

/// Work out where a run resumes from
///
/// `auto` picks the latest checkpoint in the output path and starts fresh when there is
/// none. An explicit checkpoint must exist; its epoch is read from the name when it
/// follows the `rwkv-<n>.pth` scheme.
pub fn resolve_resume(model_ckpt: Option<&ModelCheckpoint>, output_path: &Path) -> Result<Option<Resume>> {
    match model_ckpt {
        None => Ok(None),
        Some(ModelCheckpoint::Auto) => {
            let latest = find_latest_checkpoint(output_path)?;
            match &latest {
                Some(c) => info!("Resuming from {} (epoch {})", c.path.display(), c.epoch),
                None => info!("No checkpoint in {}, starting fresh", output_path.display()),
            }
            Ok(latest.map(|c| Resume {
                path: c.path,
                epoch_begin: c.epoch + 1,
            }))
        }
        Some(ModelCheckpoint::Path(path)) => {
            if !path.is_file() {
                return Err(TrainerError::MissingCheckpoint(path.clone()));
            }
            let pattern = Regex::new(CHECKPOINT_PATTERN)?;
            let epoch_begin = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| pattern.captures(name))
                .and_then(|caps| caps[1].parse::<u32>().ok())
                .map_or(0, |epoch| epoch + 1);
            Ok(Some(Resume {
                path: path.clone(),
                epoch_begin,
            }))
        }
    }
}
