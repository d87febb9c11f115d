use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;

/// Warm-up starts at this fraction of the epoch rate
const WARMUP_START: f64 = 0.01;

/// Exponential per-epoch decay from `lr_init` to `lr_final`, with a linear warm-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LrSchedule {
    pub lr_init: f64,
    pub lr_final: f64,
    pub epochs: u32,
    pub warmup_steps: usize,
}

impl LrSchedule {
    pub fn from_config(config: &TrainConfig) -> Self {
        LrSchedule {
            lr_init: config.lr_init,
            lr_final: config.lr_final,
            epochs: config.epochs,
            warmup_steps: config.warmup_steps,
        }
    }

    /// Rate for a whole epoch, `lr_init` at epoch 0 and `lr_final` at the last one
    pub fn lr_at_epoch(&self, epoch: u32) -> f64 {
        if self.lr_init == self.lr_final {
            return self.lr_init;
        }
        if self.epochs <= 1 {
            return self.lr_init;
        }
        let progress = (epoch.min(self.epochs - 1) as f64) / ((self.epochs - 1) as f64);
        let lr = self.lr_init * (self.lr_final / self.lr_init).powf(progress);
        lr.clamp(self.lr_final, self.lr_init)
    }

    /// Rate at a global step, with warm-up applied over the first `warmup_steps`
    pub fn lr_at_step(&self, epoch: u32, global_step: usize) -> f64 {
        let lr = self.lr_at_epoch(epoch);
        if global_step >= self.warmup_steps {
            return lr;
        }
        let progress = global_step as f64 / self.warmup_steps as f64;
        lr * (WARMUP_START + (1.0 - WARMUP_START) * progress)
    }

    /// Rates for every epoch from `epoch_begin` on
    pub fn epoch_rates(&self, epoch_begin: u32) -> Vec<f64> {
        (epoch_begin..self.epochs).map(|e| self.lr_at_epoch(e)).collect()
    }
}
