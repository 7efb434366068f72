//! Lockless Pipe - single-writer/single-reader byte pipe
//!
//! Arsitektur:
//! - Fixed-capacity ring, record `[u32 len][payload]` tidak pernah terpotong
//! - Versioned cursor (generation + offset) membedakan kosong dari penuh
//! - Wakeup policy yang bisa dipilih: sleep polling atau condvar
//! - Validator dan dump state untuk debugging di production

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::PipeConfig;
pub use crate::core::{
    CondvarWakeup, Cursor, LocklessPipe, PipeSnapshot, Reader, SleepWakeup, Violation, WakeupPolicy,
    WriteSlot, Writer,
};
pub use crate::error::{PipeError, Result};
