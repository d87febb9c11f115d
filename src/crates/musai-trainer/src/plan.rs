//! The plan handed to the training process as `train_config.json`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::Resume;
use crate::config::{TinyAttention, TrainConfig};
use crate::dataset::Dataset;
use crate::error::{Result, TrainerError};
use crate::schedule::LrSchedule;

pub const PLAN_FILE: &str = "train_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub config: TrainConfig,
    /// binidx prefix of the training data
    pub data_file: PathBuf,
    pub data_type: String,
    /// Token value width in the `.bin` file, in bytes
    pub token_bytes: usize,
    pub vocab_size: u32,
    pub dataset_tokens: usize,
    pub epoch_begin: u32,
    /// Weights to start from: a resumed checkpoint, else the base model
    pub load_model: Option<PathBuf>,
    pub tiny_attention: Option<TinyAttention>,
    pub schedule: LrSchedule,
    /// Rate of every remaining epoch, starting at `epoch_begin`
    pub learning_rates: Vec<f64>,
    pub samples_per_epoch: usize,
}

impl TrainingPlan {
    pub fn new(config: &TrainConfig, dataset: &Dataset, resume: Option<&Resume>) -> Result<Self> {
        let epoch_begin = resume.map_or(0, |r| r.epoch_begin);
        if epoch_begin >= config.epochs {
            return Err(TrainerError::InvalidConfig(format!(
                "resuming at epoch {} leaves nothing to train in {} epochs",
                epoch_begin, config.epochs
            )));
        }
        let schedule = LrSchedule::from_config(config);
        Ok(TrainingPlan {
            config: config.clone(),
            data_file: dataset.prefix().to_path_buf(),
            data_type: "binidx".to_string(),
            token_bytes: dataset.dtype().size(),
            vocab_size: dataset.vocab_size(),
            dataset_tokens: dataset.len(),
            epoch_begin,
            load_model: resume
                .map(|r| r.path.clone())
                .or_else(|| config.base_model.clone()),
            tiny_attention: config.tiny_attention(),
            schedule,
            learning_rates: schedule.epoch_rates(epoch_begin),
            samples_per_epoch: config.samples_per_epoch(),
        })
    }

    /// Write the plan into a directory, returning the file path
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PLAN_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|source| TrainerError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|source| TrainerError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
