//! Write path (producer side)
//!
//! `reserve` → isi payload → `commit`. Urutan publish:
//!
//! 1. simpan cursor tujuan di `next_write_cursor`
//! 2. release fence, lalu tulis length prefix
//! 3. caller mengisi payload
//! 4. `num_written += 1`, release fence, baru `write_cursor = next`
//!
//! Reader yang melihat write cursor baru dijamin melihat record utuh di
//! bawahnya. Reservasi yang tidak di-commit tidak pernah terlihat reader.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, trace, warn};

use super::cursor::Cursor;
use super::layout::RecordLayout;
use super::pipe::LocklessPipe;
use super::wakeup::WakeupPolicy;
use crate::config::PipeConfig;
use crate::error::{PipeError, Result};

/// Satu-satunya handle producer untuk sebuah pipe
pub struct Writer<W: WakeupPolicy> {
    pipe: Arc<LocklessPipe<W>>,
}

impl<W: WakeupPolicy> Writer<W> {
    pub(super) fn new(pipe: Arc<LocklessPipe<W>>) -> Self {
        Self { pipe }
    }

    /// Buat segment shared memory baru di `path` dan jadi writer-nya.
    ///
    /// Reader di proses lain attach dengan `Reader::attach_mapped`.
    pub fn create_mapped<P: AsRef<Path>>(path: P, config: &PipeConfig, policy: W) -> Result<Self> {
        let pipe = LocklessPipe::create_mapped(path, config, policy)?;
        Ok(Self::new(Arc::new(pipe)))
    }

    /// State bersama, untuk stop/validate/describe dari thread lain
    pub fn pipe(&self) -> &Arc<LocklessPipe<W>> {
        &self.pipe
    }

    /// Reservasi ruang untuk record `len` byte, menunggu kalau ring penuh.
    ///
    /// Gagal dengan `Interrupted` kalau writer di-stop selama menunggu.
    pub fn reserve(&mut self, len: usize) -> Result<WriteSlot<'_, W>> {
        self.start_write(len, true)
    }

    /// Seperti `reserve`, tapi langsung `WouldBlock` kalau ring penuh
    pub fn try_reserve(&mut self, len: usize) -> Result<WriteSlot<'_, W>> {
        self.start_write(len, false)
    }

    /// Push record, blocking kalau ring penuh
    pub fn push(&mut self, record: &[u8]) -> Result<()> {
        let mut slot = self.reserve(record.len())?;
        slot.copy_from_slice(record);
        slot.commit();
        Ok(())
    }

    /// Push record tanpa menunggu. Ring penuh → `WouldBlock` dan counter
    /// failed writes bertambah.
    pub fn try_push(&mut self, record: &[u8]) -> Result<()> {
        let mut slot = self.try_reserve(record.len())?;
        slot.copy_from_slice(record);
        slot.commit();
        Ok(())
    }

    fn start_write(&mut self, len: usize, block: bool) -> Result<WriteSlot<'_, W>> {
        let pipe: &LocklessPipe<W> = &self.pipe;

        let max = pipe.max_record_size();
        if len > max as usize {
            warn!(len, max, "record larger than the pipe allows");
            return Err(PipeError::RecordTooLarge { len, max });
        }
        let len = len as u32;

        let mut full = pipe.is_full(len);
        if full && block && pipe.is_writer_running() {
            debug!(len, count = pipe.count(), "pipe full, writer waiting for space");
        }
        while full && block && pipe.is_writer_running() {
            // Reader yang tidur di condvar harus dibangunkan, kalau tidak
            // pipe penuh bisa macet selamanya
            pipe.policy.wake();
            thread::sleep(pipe.block_quantum);
            full = pipe.is_full(len);
        }

        if !pipe.is_writer_running() {
            return Err(PipeError::Interrupted);
        }

        if full {
            pipe.control().num_failed_writes.fetch_add(1, Ordering::Relaxed);
            return Err(PipeError::WouldBlock);
        }

        let control = pipe.control();
        let write = Cursor::from_raw(control.write_cursor.load(Ordering::Relaxed));
        let layout = RecordLayout::at(write, len, pipe.capacity());

        control.next_write_cursor.store(layout.next.raw(), Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: hanya writer yang sampai di sini, dan is_full menjamin
        // range prefix + payload tidak sedang dipegang reader
        let payload = unsafe {
            pipe.storage.write_bytes(layout.prefix.offset(), &len.to_ne_bytes());
            pipe.storage.slice_mut(layout.payload.offset(), len as usize)
        };

        trace!(len, at = %layout.prefix, next = %layout.next, "reserved");
        Ok(WriteSlot { pipe, payload })
    }
}

/// Ruang payload yang sudah direservasi.
///
/// `commit()` mem-publish record ke reader. Di-drop tanpa commit berarti
/// dibatalkan: write cursor tidak bergerak.
pub struct WriteSlot<'a, W: WakeupPolicy> {
    pipe: &'a LocklessPipe<W>,
    payload: &'a mut [u8],
}

impl<'a, W: WakeupPolicy> WriteSlot<'a, W> {
    pub fn commit(self) {
        let control = self.pipe.control();

        // num_written naik sebelum fence supaya validator tidak pernah
        // melihat num_read > num_written
        let written = control.num_written.load(Ordering::Relaxed);
        control.num_written.store(written + 1, Ordering::Release);

        fence(Ordering::Release);

        let next = control.next_write_cursor.load(Ordering::Relaxed);
        control.write_cursor.store(next, Ordering::Relaxed);

        self.pipe.policy.wake();
    }
}

impl<'a, W: WakeupPolicy> Deref for WriteSlot<'a, W> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.payload
    }
}

impl<'a, W: WakeupPolicy> DerefMut for WriteSlot<'a, W> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.payload
    }
}
