//! Command line surface shared by the `trainer` binary and `musai train`

use anyhow::{bail, Context, Result};
use clap::Args;
use log::info;
use std::path::PathBuf;

use crate::backend::{DryRunBackend, ExternalProcessBackend, TrainingBackend, TrainingReport};
use crate::checkpoint::resolve_resume;
use crate::config::{LoraParams, ModelCheckpoint, TrainConfig};
use crate::dataset::Dataset;
use crate::plan::TrainingPlan;

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Token corpus directory, or a binidx prefix with --binidx
    #[arg(short, long)]
    pub dataset_path: PathBuf,

    /// Read the dataset as a binidx prefix (<path>.bin / <path>.idx)
    #[arg(short = 'i', long)]
    pub binidx: bool,

    /// Directory for the plan, the binidx and the model checkpoints
    #[arg(short, long)]
    pub output_path: PathBuf,

    /// Pretrained model to fine-tune
    #[arg(short = 'm', long)]
    pub base_model: Option<PathBuf>,

    /// LoRA checkpoint to continue from
    #[arg(short = 'r', long)]
    pub lora_ckpt: Option<PathBuf>,

    /// Model checkpoint to resume, or `auto` for the latest in the output path
    #[arg(short = 'c', long)]
    pub model_ckpt: Option<ModelCheckpoint>,

    /// Context length
    #[arg(short = 'x', long, default_value_t = 2048)]
    pub ctx_len: usize,

    /// Batch size
    #[arg(short, long, default_value_t = 8)]
    pub batches: usize,

    /// Embedding size
    #[arg(short, long, default_value_t = 512)]
    pub embed: usize,

    /// Number of layers
    #[arg(short = 'n', long, default_value_t = 8)]
    pub layers: usize,

    /// Number of epochs
    #[arg(short = 'p', long, default_value_t = 100)]
    pub epochs: u32,

    /// Steps per epoch
    #[arg(short, long, default_value_t = 1000)]
    pub steps: usize,

    /// Initial learning rate
    #[arg(short, long, default_value_t = 8e-4)]
    pub lr_rate: f64,

    /// Final learning rate, reached on the last epoch
    #[arg(short = 'a', long, default_value_t = 1e-5)]
    pub lr_decay: f64,

    /// Linear learning rate warm-up, in steps
    #[arg(long, default_value_t = 0)]
    pub warmup_steps: usize,

    /// Enable tiny attention
    #[arg(short, long)]
    pub tiny_att: bool,

    /// Tiny attention dimension (default: embedding size)
    #[arg(long)]
    pub tiny_att_dim: Option<usize>,

    /// Layer holding tiny attention (default: the last one)
    #[arg(long)]
    pub tiny_att_layer: Option<usize>,

    /// Train a LoRA adapter on top of the base model
    #[arg(short = 'u', long)]
    pub lora: bool,

    /// Enable gradient checkpointing
    #[arg(short, long)]
    pub grad_cp: bool,

    /// Enable the head-QK trick
    #[arg(short = 'k', long)]
    pub head_qk: bool,

    #[arg(long, default_value_t = 8)]
    pub lora_r: u32,

    #[arg(long, default_value_t = 32.0)]
    pub lora_alpha: f64,

    #[arg(long, default_value_t = 0.01)]
    pub lora_dropout: f64,

    /// Random seed for the training process
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Training command; it is called with `--config <output>/train_config.json`
    #[arg(long)]
    pub backend_cmd: Option<String>,

    /// Prepare the dataset and the plan without training
    #[arg(long)]
    pub dry_run: bool,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            dataset_path: self.dataset_path.clone(),
            binidx: self.binidx,
            output_path: self.output_path.clone(),
            base_model: self.base_model.clone(),
            lora_ckpt: self.lora_ckpt.clone(),
            model_ckpt: self.model_ckpt.clone(),
            ctx_len: self.ctx_len,
            batch_size: self.batches,
            n_embd: self.embed,
            n_layer: self.layers,
            epochs: self.epochs,
            epoch_steps: self.steps,
            lr_init: self.lr_rate,
            lr_final: self.lr_decay,
            warmup_steps: self.warmup_steps,
            tiny_att: self.tiny_att,
            tiny_att_dim: self.tiny_att_dim,
            tiny_att_layer: self.tiny_att_layer,
            lora: self.lora,
            lora_params: LoraParams {
                r: self.lora_r,
                alpha: self.lora_alpha,
                dropout: self.lora_dropout,
            },
            grad_cp: self.grad_cp,
            head_qk: self.head_qk,
            seed: self.seed,
        }
    }

    fn backend(&self) -> Result<Box<dyn TrainingBackend>> {
        if self.dry_run {
            return Ok(Box::new(DryRunBackend));
        }
        let Some(command) = &self.backend_cmd else {
            bail!("No training command: pass --backend-cmd, or --dry-run to only write the plan");
        };
        Ok(Box::new(ExternalProcessBackend::from_command_line(command)?))
    }
}

/// Load the dataset for a validated config, writing a binidx for token corpora
async fn load_dataset(config: &TrainConfig) -> Result<Dataset> {
    let config = config.clone();
    let dataset = tokio::task::spawn_blocking(move || {
        if config.binidx {
            Dataset::from_binidx(&config.dataset_path, config.ctx_len)
        } else {
            Dataset::from_token_corpus(&config.dataset_path, config.ctx_len, &config.output_path)
        }
    })
    .await
    .context("Dataset loading panicked")??;
    Ok(dataset)
}

pub async fn run_train(args: &TrainArgs) -> Result<TrainingReport> {
    let config = args.to_config();
    config.validate()?;
    let backend = args.backend()?;

    let dataset = load_dataset(&config)
        .await
        .with_context(|| format!("Failed to load dataset {}", config.dataset_path.display()))?;
    info!(
        "Dataset: {} tokens, vocabulary size {}",
        dataset.len(),
        dataset.vocab_size()
    );

    let resume = resolve_resume(config.model_ckpt.as_ref(), &config.output_path)?;
    let plan = TrainingPlan::new(&config, &dataset, resume.as_ref())?;
    let plan_path = plan
        .write(&config.output_path)
        .with_context(|| format!("Failed to write the plan to {}", config.output_path.display()))?;

    let report = backend.train(&plan, &plan_path).await?;
    info!(
        "{} finished with {} checkpoints in {}",
        report.backend,
        report.checkpoints.len(),
        config.output_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binidx;
    use crate::plan::PLAN_FILE;
    use clap::Parser;
    use musai_tokenizer::{save_tokens, Algorithm, MidiTokenizer, TokenFile, TokenizerConfig};
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: TrainArgs,
    }

    fn parse(args: &[&str]) -> TrainArgs {
        Cli::try_parse_from(std::iter::once("trainer").chain(args.iter().copied()))
            .unwrap()
            .args
    }

    fn corpus(dir: &Path) {
        let tokenizer = MidiTokenizer::new(TokenizerConfig::default(), Algorithm::Mmm).unwrap();
        tokenizer.to_params().save(dir).unwrap();
        for i in 0..3u32 {
            let file = TokenFile {
                ids: (10..20).map(|id| id + i).collect(),
                programs: vec![(0, false)],
            };
            save_tokens(&dir.join(format!("song_{}.json", i)), &file).unwrap();
        }
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&[
            "-d", "tokens", "-o", "out", "-c", "auto", "-x", "512", "-b", "4", "-e", "256", "-n", "6",
            "-p", "10", "-s", "20", "-l", "1e-3", "-a", "1e-4", "-t", "-g", "-k",
        ]);
        let config = args.to_config();
        assert_eq!(config.model_ckpt, Some(ModelCheckpoint::Auto));
        assert_eq!((config.ctx_len, config.batch_size, config.n_embd, config.n_layer), (512, 4, 256, 6));
        assert_eq!((config.epochs, config.epoch_steps), (10, 20));
        assert_eq!((config.lr_init, config.lr_final), (1e-3, 1e-4));
        assert!(config.tiny_att && config.grad_cp && config.head_qk && !config.lora);
        config.validate().unwrap();
    }

    #[test]
    fn test_lora_flags() {
        let args = parse(&[
            "-d", "tokens", "-o", "out", "-m", "base.pth", "-u", "-r", "lora.pth", "--lora-r", "16",
        ]);
        let config = args.to_config();
        assert_eq!(config.lora_params.r, 16);
        assert_eq!(config.lora_ckpt, Some(PathBuf::from("lora.pth")));
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_writes_plan_and_binidx() {
        let tokens = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        corpus(tokens.path());

        let args = parse(&[
            "-d",
            tokens.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
            "-x",
            "8",
            "-p",
            "3",
            "--dry-run",
        ]);
        let report = run_train(&args).await.unwrap();
        assert_eq!(report.backend, "dry-run");

        let plan = TrainingPlan::read(&out.path().join(PLAN_FILE)).unwrap();
        assert_eq!(plan.dataset_tokens, 33);
        assert_eq!(plan.learning_rates.len(), 3);
        assert!(binidx::idx_path(&plan.data_file).is_file());
    }

    #[tokio::test]
    async fn test_needs_a_backend() {
        let tokens = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        corpus(tokens.path());
        let args = parse(&[
            "-d",
            tokens.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
        ]);
        assert!(run_train(&args).await.is_err());
        assert!(!out.path().join(PLAN_FILE).exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_loading() {
        let out = TempDir::new().unwrap();
        let args = parse(&[
            "-d",
            "does-not-exist",
            "-o",
            out.path().to_str().unwrap(),
            "-e",
            "100",
            "--dry-run",
        ]);
        let err = run_train(&args).await.unwrap_err();
        assert!(err.to_string().contains("n_embd"));
    }
}
