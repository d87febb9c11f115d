//! Training driver for MusAI sequence models
//!
//! The trainer does not run the model itself. It turns a token corpus (or an existing
//! binidx) into the Megatron binidx files RWKV-LM reads, works out where a run resumes,
//! computes the learning-rate schedule and writes everything into `train_config.json`.
//! A [`TrainingBackend`] then carries out the plan, usually an external training
//! process driven by [`ExternalProcessBackend`].

pub mod backend;
pub mod binidx;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod plan;
pub mod schedule;

pub use backend::{DryRunBackend, ExternalProcessBackend, TrainingBackend, TrainingReport};
pub use binidx::{write_binidx, BinIdx, DType};
pub use checkpoint::{find_latest_checkpoint, resolve_resume, Checkpoint, Resume};
pub use config::{LoraParams, ModelCheckpoint, TinyAttention, TrainConfig};
pub use dataset::Dataset;
pub use error::{Result, TrainerError};
pub use plan::{TrainingPlan, PLAN_FILE};
pub use schedule::LrSchedule;
