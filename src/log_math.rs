//! Log-domain arithmetic in a configurable base.
//!
//! Probabilities inside the engine are `f32` logarithms in the working base
//! (1.0001 by default, which keeps adjacent values distinguishable after
//! quantization). Dump files store log10 values, so everything read from disk
//! passes through [`LogMath::log10_to_log`] exactly once.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogMath {
    base: f64,
    ln_base: f64,
}

impl LogMath {
    /// Log value standing in for linear zero.
    pub const LOG_ZERO: f32 = -f32::MAX;

    /// Creates a log domain of the given base.
    ///
    /// # Errors
    /// * [`Error::InvalidConfig`] unless `base` is finite and greater than 1
    pub fn new(base: f64) -> Result<Self> {
        if !(base > 1.0) || !base.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "log base {} must be a finite value greater than 1",
                base
            )));
        }
        Ok(Self {
            base,
            ln_base: base.ln(),
        })
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn log_zero(&self) -> f32 {
        Self::LOG_ZERO
    }

    /// Converts a linear value; zero and negative inputs map to [`LogMath::LOG_ZERO`].
    pub fn linear_to_log(&self, linear: f64) -> f32 {
        if linear <= 0.0 {
            return Self::LOG_ZERO;
        }
        clamp_log(linear.ln() / self.ln_base)
    }

    pub fn log_to_linear(&self, log: f32) -> f64 {
        if log <= Self::LOG_ZERO {
            return 0.0;
        }
        (log as f64 * self.ln_base).exp()
    }

    pub fn log10_to_log(&self, log10: f32) -> f32 {
        clamp_log(log10 as f64 * std::f64::consts::LN_10 / self.ln_base)
    }

    pub fn log_to_log10(&self, log: f32) -> f32 {
        (log as f64 * self.ln_base / std::f64::consts::LN_10) as f32
    }

    pub fn log_to_ln(&self, log: f32) -> f32 {
        (log as f64 * self.ln_base) as f32
    }

    /// Returns `log(linear(a) + linear(b))` without leaving the log domain.
    pub fn add_as_linear(&self, a: f32, b: f32) -> f32 {
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        if lo <= Self::LOG_ZERO || lo.is_infinite() {
            return hi;
        }
        let diff = (lo as f64 - hi as f64) * self.ln_base;
        clamp_log(hi as f64 + diff.exp().ln_1p() / self.ln_base)
    }
}

impl Default for LogMath {
    fn default() -> Self {
        Self {
            base: 1.0001,
            ln_base: 1.0001f64.ln(),
        }
    }
}

fn clamp_log(value: f64) -> f32 {
    if value <= LogMath::LOG_ZERO as f64 {
        LogMath::LOG_ZERO
    } else {
        value as f32
    }
}
