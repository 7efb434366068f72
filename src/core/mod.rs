//! Core module: Lockless Pipe untuk record panjang variabel
//!
//! Prinsip desain:
//! - Lock-Free: data path hanya atomic load/store + fence
//! - No-Allocation: byte region di-alokasi sekali saat init
//! - Zero-Copy ke writer: payload ditulis langsung ke ring lewat `WriteSlot`
//! - Shared Memory: backing bisa heap atau file mmap antar proses

mod cursor;
mod diagnostics;
mod layout;
mod pipe;
mod reader;
mod storage;
mod wakeup;
mod writer;

pub use cursor::Cursor;
pub use diagnostics::{PipeSnapshot, Violation};
pub use layout::LEN_PREFIX;
pub use pipe::LocklessPipe;
pub use reader::Reader;
pub use wakeup::{CondvarWakeup, SleepWakeup, WakeupPolicy, DEFAULT_QUANTUM};
pub use writer::{WriteSlot, Writer};
