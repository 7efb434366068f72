//! Konfigurasi pipe
//!
//! Default: 64 KiB ring, max record = batas struktural, writer tidur 1 ms
//! per putaran saat ring penuh. Bisa di-override lewat environment:
//!
//! - `LOCKLESS_PIPE_CAPACITY` (bytes)
//! - `LOCKLESS_PIPE_MAX_RECORD` (bytes)
//! - `LOCKLESS_PIPE_BLOCK_US` (mikrodetik)

use std::time::Duration;

use crate::core::LEN_PREFIX;
use crate::error::{PipeError, Result};

/// Capacity terkecil yang masih masuk akal (max record tetap > 0)
pub const MIN_CAPACITY: u32 = 16;

/// Offset disimpan di 32 bit; separuh range dipakai supaya
/// `offset + len` tidak pernah overflow.
pub const MAX_CAPACITY: u32 = u32::MAX / 2;

pub const DEFAULT_CAPACITY: u32 = 64 * 1024;

/// Lama writer tidur per putaran saat ring penuh
pub const DEFAULT_BLOCK_QUANTUM: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConfig {
    pub capacity: u32,
    /// Hanya bisa menurunkan batas struktural, tidak menaikkan
    pub max_record_size: Option<u32>,
    pub block_quantum: Duration,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_record_size: None,
            block_quantum: DEFAULT_BLOCK_QUANTUM,
        }
    }
}

impl PipeConfig {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn max_record_size(mut self, max: u32) -> Self {
        self.max_record_size = Some(max);
        self
    }

    pub fn block_quantum(mut self, quantum: Duration) -> Self {
        self.block_quantum = quantum;
        self
    }

    /// Batas record dari capacity saja.
    ///
    /// Record tidak pernah wrap di dalam dirinya sendiri, jadi prefix +
    /// payload harus <= separuh ring. Satu byte ekstra menjaga write cursor
    /// tidak pernah menyamai read cursor saat ring penuh.
    pub const fn structural_max(capacity: u32) -> u32 {
        capacity / 2 - (LEN_PREFIX + 1)
    }

    /// Validasi dan hitung max record size yang berlaku
    pub fn effective_max_record_size(&self) -> Result<u32> {
        if self.capacity < MIN_CAPACITY {
            return Err(PipeError::InvalidCapacity {
                capacity: self.capacity,
                reason: format!("must be at least {} bytes", MIN_CAPACITY),
            });
        }
        if self.capacity > MAX_CAPACITY {
            return Err(PipeError::InvalidCapacity {
                capacity: self.capacity,
                reason: format!("must be at most {} bytes", MAX_CAPACITY),
            });
        }

        let structural = Self::structural_max(self.capacity);
        match self.max_record_size {
            None => Ok(structural),
            Some(max) if max <= structural => Ok(max),
            Some(max) => Err(PipeError::Config(format!(
                "max record size {} exceeds {} allowed by capacity {}",
                max, structural, self.capacity
            ))),
        }
    }

    /// Default yang di-override environment variable
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("LOCKLESS_PIPE_CAPACITY") {
            config.capacity = parse_var("LOCKLESS_PIPE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("LOCKLESS_PIPE_MAX_RECORD") {
            config.max_record_size = Some(parse_var("LOCKLESS_PIPE_MAX_RECORD", &v)?);
        }
        if let Some(v) = lookup("LOCKLESS_PIPE_BLOCK_US") {
            config.block_quantum = Duration::from_micros(parse_var("LOCKLESS_PIPE_BLOCK_US", &v)?);
        }

        config.effective_max_record_size()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipeError::Config(format!("{}={:?} is not a valid number", key, value)))
}
