//! Read path (consumer side)
//!
//! Tunggu minimal satu record, salin ke buffer milik caller, lalu majukan
//! read cursor. `num_read` dinaikkan setelah salinan selesai sehingga
//! validator tidak pernah melihat `num_read > num_written`.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, trace};

use super::cursor::Cursor;
use super::layout::{self, RecordLayout, LEN_PREFIX};
use super::pipe::LocklessPipe;
use super::wakeup::WakeupPolicy;
use crate::error::{PipeError, Result};

/// Timeout di bawah ini cukup satu kali tidur, tanpa membaca jam
/// berulang-ulang
const SHORT_WAIT: Duration = Duration::from_millis(1);

/// Satu-satunya handle consumer untuk sebuah pipe
pub struct Reader<W: WakeupPolicy> {
    pipe: Arc<LocklessPipe<W>>,
}

impl<W: WakeupPolicy> Reader<W> {
    pub(super) fn new(pipe: Arc<LocklessPipe<W>>) -> Self {
        Self { pipe }
    }

    /// Attach ke segment shared memory yang dibuat `Writer::create_mapped`
    pub fn attach_mapped<P: AsRef<Path>>(path: P, policy: W) -> Result<Self> {
        let pipe = LocklessPipe::attach_mapped(path, policy)?;
        Ok(Self::new(Arc::new(pipe)))
    }

    pub fn pipe(&self) -> &Arc<LocklessPipe<W>> {
        &self.pipe
    }

    /// Tunggu sampai ada data, reader di-stop, atau timeout habis.
    ///
    /// - `None`: tidak pernah timeout
    /// - di bawah 1 ms: satu kali tidur sepanjang timeout
    /// - selain itu: loop sampai deadline (dihitung sekali di awal)
    ///
    /// `pre_wait` dipanggil tepat sebelum setiap kali tidur.
    pub fn wait_for_data(&self, timeout: Option<Duration>, mut pre_wait: Option<&mut dyn FnMut()>) {
        let pipe: &LocklessPipe<W> = &self.pipe;
        let policy = &pipe.policy;
        let waiting = || pipe.is_empty() && pipe.is_reader_running();

        match timeout {
            None => {
                while waiting() {
                    if let Some(f) = pre_wait.as_deref_mut() {
                        f();
                    }
                    policy.wait(policy.quantum());
                }
            }
            Some(timeout) if timeout < SHORT_WAIT => {
                if !timeout.is_zero() && waiting() {
                    if let Some(f) = pre_wait.as_deref_mut() {
                        f();
                    }
                    policy.wait(timeout);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while waiting() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    if let Some(f) = pre_wait.as_deref_mut() {
                        f();
                    }
                    policy.wait(remaining.min(policy.quantum()));
                }
            }
        }
    }

    /// Baca record berikutnya ke `buf`.
    ///
    /// `Ok(None)` kalau pipe masih kosong setelah menunggu. Dengan
    /// `peek = true` read cursor tidak bergerak.
    pub fn read(
        &mut self,
        buf: &mut [u8],
        peek: bool,
        timeout: Option<Duration>,
        pre_wait: Option<&mut dyn FnMut()>,
    ) -> Result<Option<usize>> {
        self.wait_for_data(timeout, pre_wait);

        let pipe: &LocklessPipe<W> = &self.pipe;
        if !pipe.is_reader_running() {
            return Err(PipeError::Interrupted);
        }

        let control = pipe.control();
        let capacity = pipe.capacity();
        let read = Cursor::from_raw(control.read_cursor.load(Ordering::Relaxed));
        let write = Cursor::from_raw(control.write_cursor.load(Ordering::Acquire));
        if read == write {
            return Ok(None);
        }

        let prefix = layout::prefix_at(read, capacity);
        let mut len_bytes = [0u8; LEN_PREFIX as usize];
        // SAFETY: record di read cursor sudah di-publish (read != write)
        unsafe { pipe.storage.read_bytes(prefix.offset(), &mut len_bytes) };
        let len = u32::from_ne_bytes(len_bytes);

        if len > pipe.max_record_size() {
            error!(len, at = %prefix, "length prefix exceeds maximum record size");
            return Err(PipeError::Corrupted(format!(
                "record length {} at {} exceeds maximum {}",
                len,
                prefix,
                pipe.max_record_size()
            )));
        }
        if len as usize > buf.len() {
            return Err(PipeError::BufferTooSmall {
                needed: len as usize,
                available: buf.len(),
            });
        }

        let layout = RecordLayout::at(read, len, capacity);
        // SAFETY: sama seperti prefix; writer tidak menyentuh range ini
        // sampai read cursor melewatinya
        unsafe {
            pipe.storage
                .read_bytes(layout.payload.offset(), &mut buf[..len as usize])
        };

        if !peek {
            let num_read = control.num_read.load(Ordering::Relaxed);
            control.num_read.store(num_read + 1, Ordering::Release);
            control.read_cursor.store(layout.next.raw(), Ordering::Release);
        }

        trace!(len, peek, at = %read, "read");
        Ok(Some(len as usize))
    }

    /// Lihat record berikutnya tanpa menunggu dan tanpa mengonsumsinya
    pub fn peek(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.read(buf, true, Some(Duration::ZERO), None)
    }

    /// Ambil record berikutnya, menunggu selama perlu
    pub fn pop<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b [u8]> {
        self.pop_inner(buf, None)
    }

    /// Seperti `pop`, dengan callback sebelum setiap kali tidur (misalnya
    /// untuk flush output milik caller)
    pub fn pop_with<'b>(&mut self, buf: &'b mut [u8], pre_wait: &mut dyn FnMut()) -> Result<&'b [u8]> {
        self.pop_inner(buf, Some(pre_wait))
    }

    fn pop_inner<'b>(&mut self, buf: &'b mut [u8], pre_wait: Option<&mut dyn FnMut()>) -> Result<&'b [u8]> {
        match self.read(buf, false, None, pre_wait)? {
            Some(len) => Ok(&buf[..len]),
            None => {
                error!(pipe = %self.pipe.describe(), "reader woke up with no data");
                Err(PipeError::InternalRead)
            }
        }
    }

    /// `pop` dengan batas waktu; `Ok(None)` kalau timeout
    pub fn timed_pop<'b>(&mut self, buf: &'b mut [u8], timeout: Duration) -> Result<Option<&'b [u8]>> {
        match self.read(buf, false, Some(timeout), None)? {
            Some(len) => Ok(Some(&buf[..len])),
            None => Ok(None),
        }
    }

    /// `pop` ke `Vec` baru seukuran max record
    pub fn pop_vec(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.pipe.max_record_size() as usize];
        let len = self.pop(&mut buf)?.len();
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipeConfig;
    use crate::core::{CondvarWakeup, LocklessPipe};
    use std::thread;

    #[test]
    fn test_peek_does_not_consume() {
        let (mut writer, mut reader) = LocklessPipe::new(128).unwrap().split();
        let mut buf = [0u8; 64];
        assert_eq!(reader.peek(&mut buf).unwrap(), None);

        writer.push(b"peekaboo").unwrap();
        assert_eq!(reader.peek(&mut buf).unwrap(), Some(8));
        assert_eq!(&buf[..8], b"peekaboo");
        assert_eq!(reader.pipe().count(), 1);
        assert_eq!(reader.pipe().num_read(), 0);

        assert_eq!(reader.pop(&mut buf).unwrap(), b"peekaboo");
        assert!(reader.pipe().is_empty());
    }

    #[test]
    fn test_buffer_too_small_keeps_record() {
        let (mut writer, mut reader) = LocklessPipe::new(128).unwrap().split();
        writer.push(b"0123456789").unwrap();

        let mut small = [0u8; 4];
        assert!(matches!(
            reader.pop(&mut small),
            Err(PipeError::BufferTooSmall { needed: 10, available: 4 })
        ));

        let mut buf = [0u8; 16];
        assert_eq!(reader.pop(&mut buf).unwrap(), b"0123456789");
    }

    #[test]
    fn test_empty_record_roundtrip() {
        let (mut writer, mut reader) = LocklessPipe::new(64).unwrap().split();
        writer.push(b"").unwrap();
        assert_eq!(reader.pipe().count(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(reader.pop(&mut buf).unwrap(), b"");
        assert!(reader.pipe().is_empty());
    }

    #[test]
    fn test_timed_pop_times_out() {
        let (_writer, mut reader) = LocklessPipe::new(64).unwrap().split();
        let mut buf = [0u8; 32];

        let start = Instant::now();
        assert_eq!(reader.timed_pop(&mut buf, Duration::from_millis(20)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(20));

        // Timeout pendek: satu kali tidur saja
        assert_eq!(reader.timed_pop(&mut buf, Duration::from_micros(100)).unwrap(), None);
    }

    #[test]
    fn test_pre_wait_callback_runs_before_sleep() {
        let (mut writer, mut reader) = LocklessPipe::new(64).unwrap().split();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.push(b"late").unwrap();
            writer
        });

        let mut calls = 0u32;
        let mut buf = [0u8; 32];
        let record = reader.pop_with(&mut buf, &mut || calls += 1).unwrap().to_vec();
        assert_eq!(record, b"late");
        assert!(calls > 0);
        producer.join().unwrap();
    }

    #[test]
    fn test_stopped_reader_is_interrupted() {
        let (mut writer, mut reader) = LocklessPipe::new(64).unwrap().split();
        writer.push(b"data").unwrap();
        reader.pipe().stop_reader();

        let mut buf = [0u8; 32];
        assert!(matches!(reader.pop(&mut buf), Err(PipeError::Interrupted)));
        assert!(matches!(reader.peek(&mut buf), Err(PipeError::Interrupted)));

        reader.pipe().start_reader();
        assert_eq!(reader.pop(&mut buf).unwrap(), b"data");
    }

    #[test]
    fn test_blocked_pop_interrupted_by_stop() {
        let config = PipeConfig::with_capacity(64);
        let pipe = LocklessPipe::with_policy(&config, CondvarWakeup::new(Duration::from_secs(10))).unwrap();
        let (_writer, mut reader) = pipe.split();

        let pipe = Arc::clone(reader.pipe());
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            pipe.stop_reader();
        });

        // stop_reader membangunkan condvar, jadi tidak perlu menunggu 10 detik
        let start = Instant::now();
        let mut buf = [0u8; 32];
        assert!(matches!(reader.pop(&mut buf), Err(PipeError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn test_corrupted_length_prefix_detected() {
        let (mut writer, mut reader) = LocklessPipe::new(64).unwrap().split();
        writer.push(b"ok").unwrap();
        // Timpa length prefix di offset 0
        unsafe { reader.pipe().storage.write_bytes(0, &1000u32.to_ne_bytes()) };

        let mut buf = [0u8; 64];
        let err = reader.pop(&mut buf).unwrap_err();
        assert!(err.is_fatal());
    }
}
