use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TrainerError};

/// Where to resume model weights from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCheckpoint {
    /// Latest `rwkv-<n>.pth` in the output path, if any
    Auto,
    Path(PathBuf),
}

impl FromStr for ModelCheckpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(ModelCheckpoint::Auto)
        } else {
            Ok(ModelCheckpoint::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for ModelCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelCheckpoint::Auto => write!(f, "auto"),
            ModelCheckpoint::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoraParams {
    pub r: u32,
    pub alpha: f64,
    pub dropout: f64,
}

impl Default for LoraParams {
    fn default() -> Self {
        LoraParams {
            r: 8,
            alpha: 32.0,
            dropout: 0.01,
        }
    }
}

/// Tiny attention settings once defaults are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TinyAttention {
    pub dim: usize,
    pub layer: usize,
}

/// Hyperparameters and paths of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset_path: PathBuf,
    /// The dataset path is a binidx prefix rather than a token corpus
    pub binidx: bool,
    pub output_path: PathBuf,
    pub base_model: Option<PathBuf>,
    pub lora_ckpt: Option<PathBuf>,
    pub model_ckpt: Option<ModelCheckpoint>,
    pub ctx_len: usize,
    pub batch_size: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub epochs: u32,
    pub epoch_steps: usize,
    pub lr_init: f64,
    pub lr_final: f64,
    pub warmup_steps: usize,
    pub tiny_att: bool,
    pub tiny_att_dim: Option<usize>,
    pub tiny_att_layer: Option<usize>,
    pub lora: bool,
    pub lora_params: LoraParams,
    pub grad_cp: bool,
    pub head_qk: bool,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            dataset_path: PathBuf::from("tokens"),
            binidx: false,
            output_path: PathBuf::from("out"),
            base_model: None,
            lora_ckpt: None,
            model_ckpt: None,
            ctx_len: 2048,
            batch_size: 8,
            n_embd: 512,
            n_layer: 8,
            epochs: 100,
            epoch_steps: 1000,
            lr_init: 8e-4,
            lr_final: 1e-5,
            warmup_steps: 0,
            tiny_att: false,
            tiny_att_dim: None,
            tiny_att_layer: None,
            lora: false,
            lora_params: LoraParams::default(),
            grad_cp: false,
            head_qk: false,
            seed: 42,
        }
    }
}

fn invalid(message: impl Into<String>) -> TrainerError {
    TrainerError::InvalidConfig(message.into())
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ctx_len", self.ctx_len),
            ("batch_size", self.batch_size),
            ("n_embd", self.n_embd),
            ("n_layer", self.n_layer),
            ("epoch_steps", self.epoch_steps),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.epochs == 0 {
            return Err(invalid("epochs must be greater than 0"));
        }
        if self.n_embd % 32 != 0 {
            return Err(invalid(format!("n_embd {} is not a multiple of 32", self.n_embd)));
        }

        if !(self.lr_final > 0.0 && self.lr_init.is_finite() && self.lr_init >= self.lr_final) {
            return Err(invalid(format!(
                "learning rates must satisfy lr_init >= lr_final > 0, got {} and {}",
                self.lr_init, self.lr_final
            )));
        }

        if self.lora_ckpt.is_some() && !self.lora {
            return Err(invalid("a LoRA checkpoint needs --lora"));
        }
        if self.lora {
            if self.base_model.is_none() {
                return Err(invalid("LoRA training needs a base model"));
            }
            let lora = &self.lora_params;
            if lora.r == 0 || !(0.0..1.0).contains(&lora.dropout) || lora.alpha <= 0.0 {
                return Err(invalid(format!(
                    "invalid LoRA parameters r={} alpha={} dropout={}",
                    lora.r, lora.alpha, lora.dropout
                )));
            }
        }

        if let Some(tiny) = self.tiny_attention() {
            if tiny.dim == 0 {
                return Err(invalid("tiny attention dimension must be greater than 0"));
            }
            if tiny.layer >= self.n_layer {
                return Err(invalid(format!(
                    "tiny attention layer {} is out of range for {} layers",
                    tiny.layer, self.n_layer
                )));
            }
        }

        Ok(())
    }

    /// Tiny attention settings with their defaults, when enabled
    pub fn tiny_attention(&self) -> Option<TinyAttention> {
        self.tiny_att.then(|| TinyAttention {
            dim: self.tiny_att_dim.unwrap_or(self.n_embd),
            layer: self.tiny_att_layer.unwrap_or(self.n_layer.saturating_sub(1)),
        })
    }

    /// Training samples drawn per epoch
    pub fn samples_per_epoch(&self) -> usize {
        self.epoch_steps * self.batch_size
    }
}
