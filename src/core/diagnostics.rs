//! Diagnostics: validator dan dump state
//!
//! `validate()` hanya advisory: boleh dipanggil bersamaan dengan writer dan
//! reader, tidak mengubah apa pun, dan tidak pernah menghentikan proses.
//! Caller yang memutuskan apakah pelanggaran dianggap fatal.

use std::fmt;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tracing::error;

use super::cursor::Cursor;
use super::pipe::LocklessPipe;
use super::storage::GUARD;
use super::wakeup::WakeupPolicy;

const CURSOR_SAMPLE_ATTEMPTS: usize = 64;

/// Satu temuan korupsi dari validator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("num written/num read out of sync: num read {read}, num written {written}")]
    CountersOutOfSync { read: u64, written: u64 },

    #[error("generations out of sync: write generation {write}, read generation {read}")]
    GenerationDrift { write: u32, read: u32 },

    #[error("write cursor out of bounds: {cursor} (capacity {capacity})")]
    WriteCursorOutOfBounds { cursor: Cursor, capacity: u32 },

    #[error("read cursor out of bounds: {cursor} (capacity {capacity})")]
    ReadCursorOutOfBounds { cursor: Cursor, capacity: u32 },

    #[error("corrupt state: write {write} and read {read} share an offset but not a generation")]
    LapMismatch { write: Cursor, read: Cursor },

    #[error("guard words corrupted: {:#x} : {:#x} : {:#x} : {:#x}", .0[0], .0[1], .0[2], .0[3])]
    GuardCorrupted([u64; 4]),
}

/// Potret state pipe pada satu waktu (tidak atomik antar field)
#[derive(Debug, Clone, PartialEq)]
pub struct PipeSnapshot {
    pub count: u64,
    pub percent_full: f64,
    pub capacity: u32,
    pub max_record_size: u32,
    pub write: Cursor,
    pub read: Cursor,
    pub next_write: Cursor,
    pub num_written: u64,
    pub num_read: u64,
    pub num_failed_writes: u64,
    pub writer_running: bool,
    pub reader_running: bool,
    pub policy: String,
}

impl fmt::Display for PipeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tNumber of items in pipe     {}", self.count)?;
        writeln!(f, "\tPercent full                {:.2}", self.percent_full)?;
        writeln!(f, "\tPipe size (in bytes)        {}", self.capacity)?;
        writeln!(f, "\tMax record size             {}", self.max_record_size)?;
        writeln!(f, "\tWriting to location         {}", self.write)?;
        writeln!(f, "\tReading from location       {}", self.read)?;
        writeln!(f, "\tNext write location         {}", self.next_write)?;
        writeln!(f, "\tNum Written                 {}", self.num_written)?;
        writeln!(f, "\tNum Read                    {}", self.num_read)?;
        writeln!(f, "\tNum Failed Writes           {}", self.num_failed_writes)?;
        writeln!(f, "\tPipe Writer is running      {}", self.writer_running)?;
        writeln!(f, "\tPipe Reader is running      {}", self.reader_running)?;
        write!(f, "\tWakeup Policy               {}", self.policy)
    }
}

impl<W: WakeupPolicy> LocklessPipe<W> {
    /// Semua pelanggaran invariant yang terlihat saat ini
    pub fn violations(&self) -> Vec<Violation> {
        let control = self.control();
        let capacity = self.capacity();
        let mut found = Vec::new();

        // num_read dulu: reader menaikkannya (Release) setelah num_written
        // naik, jadi num_written yang dibaca sesudahnya tidak mungkin lebih kecil
        let read_count = control.num_read.load(Ordering::Acquire);
        let written_count = control.num_written.load(Ordering::Acquire);
        if read_count > written_count {
            found.push(Violation::CountersOutOfSync {
                read: read_count,
                written: written_count,
            });
        }

        let (write, read, stable) = self.sample_cursors();

        if write.offset() >= capacity {
            found.push(Violation::WriteCursorOutOfBounds { cursor: write, capacity });
        }
        if read.offset() >= capacity {
            found.push(Violation::ReadCursorOutOfBounds { cursor: read, capacity });
        }
        // Relasi antar cursor hanya bermakna kalau keduanya dari saat yang sama
        if stable {
            if write.generation().wrapping_sub(read.generation()) > 1 {
                found.push(Violation::GenerationDrift {
                    write: write.generation(),
                    read: read.generation(),
                });
            }
            if write.offset() == read.offset() && !write.same_lap(read) {
                found.push(Violation::LapMismatch { write, read });
            }
        }

        let guards = control.guards();
        if guards.iter().any(|&g| g != GUARD) {
            found.push(Violation::GuardCorrupted(guards));
        }

        found
    }

    /// Baca (write, read) sampai write cursor tidak berubah di sekitar load
    /// read cursor. Write cursor dibaca dulu: reader tidak pernah melewati
    /// writer, jadi read cursor yang dibaca sesudahnya ada dalam lap yang
    /// sama atau satu lap di belakang. Tanpa sampel stabil (writer terus
    /// bergerak), flag ketiga `false`.
    fn sample_cursors(&self) -> (Cursor, Cursor, bool) {
        let control = self.control();
        let mut write = Cursor::from_raw(control.write_cursor.load(Ordering::Acquire));

        for _ in 0..CURSOR_SAMPLE_ATTEMPTS {
            let read = Cursor::from_raw(control.read_cursor.load(Ordering::Acquire));
            let again = Cursor::from_raw(control.write_cursor.load(Ordering::Acquire));
            if again == write {
                return (write, read, true);
            }
            write = again;
        }

        let read = Cursor::from_raw(control.read_cursor.load(Ordering::Acquire));
        (write, read, false)
    }

    /// `true` kalau tidak ada pelanggaran. Dengan `report`, setiap
    /// pelanggaran di-log beserta dump state.
    pub fn validate(&self, report: bool) -> bool {
        let found = self.violations();
        if report && !found.is_empty() {
            for violation in &found {
                error!(%violation, "lockless pipe validation failed");
            }
            error!("pipe state:\n{}", self.describe());
        }
        found.is_empty()
    }

    pub fn snapshot(&self) -> PipeSnapshot {
        let control = self.control();

        PipeSnapshot {
            count: self.count(),
            percent_full: self.percent_full(),
            capacity: self.capacity(),
            max_record_size: self.max_record_size(),
            write: self.write_cursor(),
            read: self.read_cursor(),
            next_write: Cursor::from_raw(control.next_write_cursor.load(Ordering::Relaxed)),
            num_written: self.num_written(),
            num_read: self.num_read(),
            num_failed_writes: self.num_failed_writes(),
            writer_running: self.is_writer_running(),
            reader_running: self.is_reader_running(),
            policy: self.policy.to_string(),
        }
    }

    /// Dump state yang bisa dibaca manusia
    pub fn describe(&self) -> String {
        self.snapshot().to_string()
    }
}
