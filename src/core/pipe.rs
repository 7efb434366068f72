//! Lockless Pipe: single-writer/single-reader untuk record panjang variabel
//!
//! `LocklessPipe` memegang state bersama (control block, byte region,
//! wakeup policy) dan semua operasi yang netral terhadap role. Data path
//! hanya ada di `Writer` dan `Reader`, dan `split()` hanya bisa dipanggil
//! sekali per instance, jadi kontrak satu writer + satu reader dijaga oleh
//! ownership.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::cursor::Cursor;
use super::layout;
use super::reader::Reader;
use super::storage::{ControlBlock, RingStorage};
use super::wakeup::{SleepWakeup, WakeupPolicy};
use super::writer::Writer;
use crate::config::PipeConfig;
use crate::error::Result;

pub struct LocklessPipe<W: WakeupPolicy = SleepWakeup> {
    pub(super) storage: RingStorage,
    pub(super) policy: W,
    pub(super) block_quantum: Duration,
}

impl LocklessPipe<SleepWakeup> {
    /// Pipe heap dengan konfigurasi default dan capacity tertentu
    pub fn new(capacity: u32) -> Result<Self> {
        Self::with_policy(&PipeConfig::with_capacity(capacity), SleepWakeup::default())
    }
}

impl<W: WakeupPolicy> LocklessPipe<W> {
    pub fn with_policy(config: &PipeConfig, policy: W) -> Result<Self> {
        let max_record_size = config.effective_max_record_size()?;
        let storage = RingStorage::heap(config.capacity, max_record_size)?;
        debug!(capacity = config.capacity, max_record_size, policy = %policy, "pipe created");

        Ok(Self {
            storage,
            policy,
            block_quantum: config.block_quantum,
        })
    }

    /// Pipe di atas file segment baru (shared memory)
    pub(super) fn create_mapped<P: AsRef<Path>>(path: P, config: &PipeConfig, policy: W) -> Result<Self> {
        let max_record_size = config.effective_max_record_size()?;
        let storage = RingStorage::create_mapped(path, config.capacity, max_record_size)?;

        Ok(Self {
            storage,
            policy,
            block_quantum: config.block_quantum,
        })
    }

    /// Pipe di atas segment yang sudah ada
    pub(super) fn attach_mapped<P: AsRef<Path>>(path: P, policy: W) -> Result<Self> {
        let storage = RingStorage::open_mapped(path)?;

        Ok(Self {
            storage,
            policy,
            block_quantum: crate::config::DEFAULT_BLOCK_QUANTUM,
        })
    }

    /// Pecah menjadi satu-satunya handle writer dan reader
    pub fn split(self) -> (Writer<W>, Reader<W>) {
        let shared = Arc::new(self);
        (Writer::new(Arc::clone(&shared)), Reader::new(shared))
    }

    #[inline(always)]
    pub(crate) fn control(&self) -> &ControlBlock {
        self.storage.control()
    }

    #[inline(always)]
    pub(crate) fn read_cursor(&self) -> Cursor {
        Cursor::from_raw(self.control().read_cursor.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn write_cursor(&self) -> Cursor {
        Cursor::from_raw(self.control().write_cursor.load(Ordering::Acquire))
    }

    pub fn policy(&self) -> &W {
        &self.policy
    }

    /// Ukuran byte region
    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.storage.capacity()
    }

    /// Payload terbesar yang boleh di-push
    #[inline(always)]
    pub fn max_record_size(&self) -> u32 {
        self.control().max_record_size
    }

    pub fn is_mapped(&self) -> bool {
        self.storage.is_mapped()
    }

    pub fn is_writer_running(&self) -> bool {
        self.control().writer_running.load(Ordering::Acquire)
    }

    pub fn is_reader_running(&self) -> bool {
        self.control().reader_running.load(Ordering::Acquire)
    }

    /// Semua `push` berikutnya (dan yang sedang menunggu) gagal dengan
    /// `Interrupted`
    pub fn stop_writer(&self) {
        self.control().writer_running.store(false, Ordering::Release);
        info!("pipe writer stopped");
    }

    /// Tidak berpengaruh kalau writer sudah berjalan
    pub fn start_writer(&self) {
        self.control().writer_running.store(true, Ordering::Release);
        info!("pipe writer started");
    }

    /// Semua `pop` berikutnya (dan yang sedang menunggu) gagal dengan
    /// `Interrupted`
    pub fn stop_reader(&self) {
        self.control().reader_running.store(false, Ordering::Release);
        self.policy.wake();
        info!("pipe reader stopped");
    }

    pub fn start_reader(&self) {
        self.control().reader_running.store(true, Ordering::Release);
        info!("pipe reader started");
    }

    /// Kosong kalau kedua cursor identik (offset dan generation)
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.read_cursor() == self.write_cursor()
    }

    /// Tidak ada ruang untuk record `len` byte?
    #[inline(always)]
    pub fn is_full(&self, len: u32) -> bool {
        if len > self.max_record_size() {
            return true;
        }
        !layout::fits(self.write_cursor(), self.read_cursor(), len, self.capacity())
    }

    /// Jumlah record yang belum dibaca
    pub fn count(&self) -> u64 {
        let read = self.control().num_read.load(Ordering::Acquire);
        let written = self.control().num_written.load(Ordering::Acquire);
        written.saturating_sub(read)
    }

    /// Persentase byte region yang terisi (termasuk ekor yang dilewati)
    pub fn percent_full(&self) -> f64 {
        let capacity = self.capacity() as f64;
        let read = self.read_cursor().offset();
        let write = self.write_cursor().offset();

        let used = if read > write {
            capacity - (read - write) as f64
        } else {
            (write - read) as f64
        };
        100.0 * used / capacity
    }

    pub fn num_written(&self) -> u64 {
        self.control().num_written.load(Ordering::Acquire)
    }

    pub fn num_read(&self) -> u64 {
        self.control().num_read.load(Ordering::Acquire)
    }

    pub fn num_failed_writes(&self) -> u64 {
        self.control().num_failed_writes.load(Ordering::Relaxed)
    }

    /// Bangunkan reader kalau ada data. No-op untuk `SleepWakeup`.
    pub fn wakeup_reader(&self) {
        if !self.is_empty() {
            self.policy.wake();
        }
    }
}
