use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::checkpoint::{list_checkpoints, Checkpoint};
use crate::error::{Result, TrainerError};
use crate::plan::TrainingPlan;

/// What a finished run left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    pub backend: String,
    pub plan_path: PathBuf,
    /// Checkpoints in the output path after the run, by epoch
    pub checkpoints: Vec<Checkpoint>,
}

/// Something that can carry out a training plan
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn train(&self, plan: &TrainingPlan, plan_path: &Path) -> Result<TrainingReport>;
}

/// Runs an external trainer as `<command> --config <train_config.json>`
#[derive(Debug, Clone)]
pub struct ExternalProcessBackend {
    program: String,
    args: Vec<String>,
}

impl ExternalProcessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        ExternalProcessBackend {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| TrainerError::InvalidConfig("empty training command".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Log every line of a child stream, returning the last non-empty one
async fn forward_lines<R>(reader: R, program: &str, is_stderr: bool) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut last = None;
    while let Some(line) = lines.next_line().await? {
        if is_stderr {
            warn!("[{}] {}", program, line);
        } else {
            info!("[{}] {}", program, line);
        }
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }
    Ok(last)
}

#[async_trait]
impl TrainingBackend for ExternalProcessBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn train(&self, plan: &TrainingPlan, plan_path: &Path) -> Result<TrainingReport> {
        let command_line = self.command_line();
        info!("Running `{} --config {}`", command_line, plan_path.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--config")
            .arg(plan_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrainerError::backend(&command_line, format!("failed to start: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainerError::backend(&command_line, "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrainerError::backend(&command_line, "stderr was not captured"))?;

        let (out, err) = tokio::join!(
            forward_lines(stdout, &self.program, false),
            forward_lines(stderr, &self.program, true)
        );
        out?;
        let last_error = err?;

        let status = child.wait().await?;
        if !status.success() {
            let mut message = format!("exited with {}", status);
            if let Some(line) = last_error {
                message.push_str(": ");
                message.push_str(&line);
            }
            return Err(TrainerError::backend(command_line, message));
        }

        let checkpoints = list_checkpoints(&plan.config.output_path)?;
        match checkpoints.last() {
            Some(latest) => info!(
                "Training finished, {} checkpoints, latest {}",
                checkpoints.len(),
                latest.path.display()
            ),
            None => warn!("Training finished without checkpoints in {}", plan.config.output_path.display()),
        }

        Ok(TrainingReport {
            backend: self.name().to_string(),
            plan_path: plan_path.to_path_buf(),
            checkpoints,
        })
    }
}

/// Stops after the plan is written
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunBackend;

#[async_trait]
impl TrainingBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn train(&self, plan: &TrainingPlan, plan_path: &Path) -> Result<TrainingReport> {
        info!(
            "Dry run: {} tokens, vocabulary {}, epochs {}..{}",
            plan.dataset_tokens, plan.vocab_size, plan.epoch_begin, plan.config.epochs
        );
        if let (Some(first), Some(last)) = (plan.learning_rates.first(), plan.learning_rates.last()) {
            debug!("Learning rate {:e} -> {:e}", first, last);
        }
        info!("Plan written to {}", plan_path.display());

        Ok(TrainingReport {
            backend: self.name().to_string(),
            plan_path: plan_path.to_path_buf(),
            checkpoints: list_checkpoints(&plan.config.output_path)?,
        })
    }
}
