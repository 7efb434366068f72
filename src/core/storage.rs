//! Ring Storage: control block + byte region dalam satu blok memori
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ ControlBlock (cache-line aligned)                   │
//! │   header | counters | guard | read | guard | write  │
//! │   | guard | next write | guard | liveness flags     │
//! ├─────────────────────────────────────────────────────┤
//! │ Data region (capacity bytes)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Blok memori bisa dari heap (satu proses) atau dari file yang di-mmap
//! (shared antar proses, misalnya di `/dev/shm`). Semua field control yang
//! dibaca kedua sisi adalah atomic, jadi layout yang sama berlaku untuk
//! kedua backing.

use memmap2::{MmapMut, MmapOptions};
use std::alloc::{self, Layout};
use std::fs::OpenOptions;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use super::cursor::Cursor;
use crate::config::{PipeConfig, MAX_CAPACITY, MIN_CAPACITY};
use crate::error::{PipeError, Result};

const MAGIC: u64 = 0x4C4B_4C53_5049_5045; // "LKLSPIPE"
const VERSION: u32 = 1;

/// Nilai konstan di guard word. Berubah = control state tertimpa.
pub const GUARD: u64 = 0xDEAD_BEEF;

/// Ukuran control block; data region dimulai tepat setelahnya
pub const CONTROL_SIZE: usize = std::mem::size_of::<ControlBlock>();

const CONTROL_ALIGN: usize = std::mem::align_of::<ControlBlock>();

/// Control state yang dibagi antara writer dan reader.
///
/// Setiap field hanya ditulis oleh satu sisi:
/// - writer: `num_written`, `num_failed_writes`, `write_cursor`, `next_write_cursor`
/// - reader: `num_read`, `read_cursor`
///
/// Liveness flag boleh diubah dari thread mana pun.
#[repr(C, align(64))]
pub(crate) struct ControlBlock {
    pub magic: u64,
    pub version: u32,
    pub capacity: u32,
    pub max_record_size: u32,
    _reserved: u32,

    pub num_read: AtomicU64,
    pub num_written: AtomicU64,
    pub num_failed_writes: AtomicU64,

    pub guard_1: AtomicU64,
    pub read_cursor: AtomicU64,
    pub guard_2: AtomicU64,
    pub write_cursor: AtomicU64,
    pub guard_3: AtomicU64,
    pub next_write_cursor: AtomicU64,
    pub guard_4: AtomicU64,

    pub writer_running: AtomicBool,
    pub reader_running: AtomicBool,
}

impl ControlBlock {
    fn new(capacity: u32, max_record_size: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            capacity,
            max_record_size,
            _reserved: 0,
            num_read: AtomicU64::new(0),
            num_written: AtomicU64::new(0),
            num_failed_writes: AtomicU64::new(0),
            guard_1: AtomicU64::new(GUARD),
            read_cursor: AtomicU64::new(Cursor::ZERO.raw()),
            guard_2: AtomicU64::new(GUARD),
            write_cursor: AtomicU64::new(Cursor::ZERO.raw()),
            guard_3: AtomicU64::new(GUARD),
            next_write_cursor: AtomicU64::new(Cursor::ZERO.raw()),
            guard_4: AtomicU64::new(GUARD),
            writer_running: AtomicBool::new(true),
            reader_running: AtomicBool::new(true),
        }
    }

    pub fn guards(&self) -> [u64; 4] {
        [
            self.guard_1.load(Ordering::Relaxed),
            self.guard_2.load(Ordering::Relaxed),
            self.guard_3.load(Ordering::Relaxed),
            self.guard_4.load(Ordering::Relaxed),
        ]
    }
}

enum Backing {
    Heap { base: NonNull<u8>, layout: Layout },
    Mapped { _mmap: MmapMut },
}

/// Pemilik blok memori ring. Akses byte dilakukan lewat offset yang
/// dicek batasnya terhadap capacity.
pub(crate) struct RingStorage {
    // Harus tetap hidup selama pointer di bawah dipakai
    backing: Backing,
    control: NonNull<ControlBlock>,
    data: NonNull<u8>,
    capacity: u32,
}

// SAFETY: Protokol single-writer/single-reader menjamin byte region tidak
// pernah ditulis dan dibaca bersamaan di range yang sama; control state
// seluruhnya atomic.
unsafe impl Send for RingStorage {}
unsafe impl Sync for RingStorage {}

impl RingStorage {
    /// Alokasi heap, zeroed, aligned ke cache line
    pub fn heap(capacity: u32, max_record_size: u32) -> Result<Self> {
        let layout = Layout::from_size_align(CONTROL_SIZE + capacity as usize, CONTROL_ALIGN)
            .map_err(|e| PipeError::InvalidCapacity {
                capacity,
                reason: e.to_string(),
            })?;

        // SAFETY: layout size > 0 (CONTROL_SIZE > 0)
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        // SAFETY: blok baru, cukup besar dan aligned untuk ControlBlock
        let storage = unsafe { Self::init(Backing::Heap { base, layout }, base, capacity, max_record_size) };
        debug!(capacity, max_record_size, "heap ring storage allocated");
        Ok(storage)
    }

    /// Membuat (atau menimpa) file segment dan me-mmap-nya
    pub fn create_mapped<P: AsRef<Path>>(path: P, capacity: u32, max_record_size: u32) -> Result<Self> {
        let path = path.as_ref();
        let total_size = CONTROL_SIZE + capacity as usize;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_size as u64)?;

        // SAFETY: file baru saja dibuka read/write dan ukurannya sudah di-set
        let mut mmap = unsafe { MmapOptions::new().len(total_size).map_mut(&file)? };
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or_else(|| PipeError::Segment("mmap returned null".into()))?;

        // SAFETY: mmap page-aligned dan berukuran total_size
        let storage = unsafe { Self::init(Backing::Mapped { _mmap: mmap }, base, capacity, max_record_size) };
        debug!(path = %path.display(), capacity, "mapped ring segment created");
        Ok(storage)
    }

    /// Attach ke segment yang sudah dibuat oleh `create_mapped`
    pub fn open_mapped<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len() as usize;

        if file_len < CONTROL_SIZE {
            return Err(PipeError::Segment(format!(
                "segment {} is {} bytes, smaller than the control block ({} bytes)",
                path.display(),
                file_len,
                CONTROL_SIZE
            )));
        }

        // SAFETY: file dibuka read/write; isi divalidasi sebelum dipakai
        let mut mmap = unsafe { MmapOptions::new().len(file_len).map_mut(&file)? };
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or_else(|| PipeError::Segment("mmap returned null".into()))?;
        let control = base.cast::<ControlBlock>();

        // SAFETY: mapping minimal CONTROL_SIZE byte dan page-aligned
        let (magic, version, capacity, max_record_size, guards) = unsafe {
            let c = control.as_ref();
            (c.magic, c.version, c.capacity, c.max_record_size, c.guards())
        };

        if magic != MAGIC {
            return Err(PipeError::Segment(format!(
                "invalid magic: expected 0x{:016X}, got 0x{:016X}",
                MAGIC, magic
            )));
        }
        if version != VERSION {
            return Err(PipeError::Segment(format!(
                "unsupported layout version {} (expected {})",
                version, VERSION
            )));
        }
        if CONTROL_SIZE + capacity as usize != file_len {
            return Err(PipeError::Segment(format!(
                "segment length {} does not match recorded capacity {}",
                file_len, capacity
            )));
        }
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity)
            || max_record_size > PipeConfig::structural_max(capacity)
        {
            return Err(PipeError::Segment(format!(
                "implausible header: capacity {}, max record size {}",
                capacity, max_record_size
            )));
        }
        if guards.iter().any(|&g| g != GUARD) {
            return Err(PipeError::Segment(format!(
                "guard words corrupted: {:#x} : {:#x} : {:#x} : {:#x}",
                guards[0], guards[1], guards[2], guards[3]
            )));
        }

        // SAFETY: CONTROL_SIZE + capacity == file_len
        let data = unsafe { NonNull::new_unchecked(base.as_ptr().add(CONTROL_SIZE)) };
        debug!(path = %path.display(), capacity, "attached to mapped ring segment");

        Ok(Self {
            backing: Backing::Mapped { _mmap: mmap },
            control,
            data,
            capacity,
        })
    }

    /// # Safety
    /// `base` harus menunjuk ke blok milik `backing` yang aligned ke
    /// `CONTROL_ALIGN` dan berukuran minimal `CONTROL_SIZE + capacity`.
    unsafe fn init(backing: Backing, base: NonNull<u8>, capacity: u32, max_record_size: u32) -> Self {
        let control = base.cast::<ControlBlock>();
        ptr::write(control.as_ptr(), ControlBlock::new(capacity, max_record_size));
        let data = NonNull::new_unchecked(base.as_ptr().add(CONTROL_SIZE));

        Self {
            backing,
            control,
            data,
            capacity,
        }
    }

    #[inline(always)]
    pub fn control(&self) -> &ControlBlock {
        // SAFETY: diinisialisasi di init/open_mapped, hidup selama backing hidup
        unsafe { self.control.as_ref() }
    }

    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped { .. })
    }

    #[inline(always)]
    fn check_range(&self, offset: u32, len: usize) {
        assert!(
            offset as usize + len <= self.capacity as usize,
            "ring access out of bounds: offset {} len {} capacity {}",
            offset,
            len,
            self.capacity
        );
    }

    /// Salin `src` ke data region mulai dari `offset`.
    ///
    /// # Safety
    /// Hanya writer yang boleh memanggil, dan range tersebut tidak sedang
    /// dibaca reader (dijamin oleh pengecekan full).
    #[inline(always)]
    pub unsafe fn write_bytes(&self, offset: u32, src: &[u8]) {
        self.check_range(offset, src.len());
        ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr().add(offset as usize), src.len());
    }

    /// Salin data region mulai dari `offset` ke `dst`.
    ///
    /// # Safety
    /// Hanya reader yang boleh memanggil, untuk range yang sudah di-publish
    /// writer lewat write cursor.
    #[inline(always)]
    pub unsafe fn read_bytes(&self, offset: u32, dst: &mut [u8]) {
        self.check_range(offset, dst.len());
        ptr::copy_nonoverlapping(self.data.as_ptr().add(offset as usize), dst.as_mut_ptr(), dst.len());
    }

    /// Slice mutable ke data region untuk diisi writer.
    ///
    /// # Safety
    /// Sama seperti `write_bytes`; tidak boleh ada slice lain yang overlap
    /// selama slice ini hidup.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, offset: u32, len: usize) -> &mut [u8] {
        self.check_range(offset, len);
        std::slice::from_raw_parts_mut(self.data.as_ptr().add(offset as usize), len)
    }
}

impl Drop for RingStorage {
    fn drop(&mut self) {
        if let Backing::Heap { base, layout } = self.backing {
            // SAFETY: dialokasikan di heap() dengan layout yang sama
            unsafe { alloc::dealloc(base.as_ptr(), layout) };
        }
    }
}
