//! Penempatan record di dalam ring
//!
//! Format record: `[len: u32 native-endian][payload]`
//!
//! Record tidak pernah dipotong di ujung fisik buffer. Kalau prefix atau
//! payload tidak muat sebelum ujung, sisa byte di ekor ditinggalkan dan
//! bagian itu mulai lagi di offset 0 dengan generation + 1.
//! Writer dan reader sama-sama memakai fungsi di sini supaya posisi record
//! selalu identik di kedua sisi.

use super::cursor::Cursor;

/// Ukuran length prefix di depan setiap record
pub const LEN_PREFIX: u32 = std::mem::size_of::<u32>() as u32;

/// Posisi satu record yang dimulai dari cursor tertentu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordLayout {
    pub prefix: Cursor,
    pub payload: Cursor,
    /// Cursor setelah record, sudah dinormalisasi (offset < capacity)
    pub next: Cursor,
}

/// Lokasi length prefix untuk record yang dimulai di `cursor`
#[inline(always)]
pub(crate) fn prefix_at(cursor: Cursor, capacity: u32) -> Cursor {
    if cursor.offset() + LEN_PREFIX > capacity {
        cursor.wrapped()
    } else {
        cursor
    }
}

impl RecordLayout {
    /// `len` harus <= capacity / 2, dijamin oleh batas max record size.
    #[inline(always)]
    pub(crate) fn at(cursor: Cursor, len: u32, capacity: u32) -> Self {
        let prefix = prefix_at(cursor, capacity);

        let mut payload = prefix.with_offset(prefix.offset() + LEN_PREFIX);
        if payload.offset() + len > capacity {
            payload = payload.wrapped();
        }

        let end = payload.offset() + len;
        let next = if end == capacity {
            payload.wrapped()
        } else {
            payload.with_offset(end)
        };

        Self {
            prefix,
            payload,
            next,
        }
    }
}

/// Apakah record `len` byte muat di depan reader?
///
/// - `read > write` (writer sudah satu lap di depan): record harus selesai
///   sebelum offset reader tanpa wrap.
/// - `read <= write` (lap yang sama): tanpa wrap selalu muat; kalau wrap,
///   ujung record di lap berikutnya harus masih di bawah offset reader.
///
/// Ujung record tidak boleh sama dengan offset reader karena itu kondisi
/// kosong.
#[inline(always)]
pub(crate) fn fits(write: Cursor, read: Cursor, len: u32, capacity: u32) -> bool {
    let next = RecordLayout::at(write, len, capacity).next;
    let no_wrap = next.same_lap(write);

    if read.offset() > write.offset() {
        no_wrap && next.offset() < read.offset()
    } else {
        no_wrap || next.offset() < read.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: u32 = 64;

    #[test]
    fn test_layout_without_wrap() {
        let l = RecordLayout::at(Cursor::pack(0, 10), 6, CAP);
        assert_eq!(l.prefix, Cursor::pack(0, 10));
        assert_eq!(l.payload, Cursor::pack(0, 14));
        assert_eq!(l.next, Cursor::pack(0, 20));
    }

    #[test]
    fn test_prefix_wraps() {
        // Hanya 2 byte tersisa: prefix pindah ke awal
        let l = RecordLayout::at(Cursor::pack(2, 62), 6, CAP);
        assert_eq!(l.prefix, Cursor::pack(3, 0));
        assert_eq!(l.payload, Cursor::pack(3, 4));
        assert_eq!(l.next, Cursor::pack(3, 10));
    }

    #[test]
    fn test_payload_wraps_prefix_stays() {
        let l = RecordLayout::at(Cursor::pack(0, 56), 6, CAP);
        assert_eq!(l.prefix, Cursor::pack(0, 56));
        assert_eq!(l.payload, Cursor::pack(1, 0));
        assert_eq!(l.next, Cursor::pack(1, 6));
    }

    #[test]
    fn test_exact_end_normalises_to_next_lap() {
        let l = RecordLayout::at(Cursor::pack(0, 54), 6, CAP);
        assert_eq!(l.payload, Cursor::pack(0, 58));
        assert_eq!(l.next, Cursor::pack(1, 0));
    }

    #[test]
    fn test_prefix_exactly_at_end() {
        // Prefix tepat mengisi 4 byte terakhir, payload mulai di lap baru
        let l = RecordLayout::at(Cursor::pack(0, 60), 3, CAP);
        assert_eq!(l.prefix, Cursor::pack(0, 60));
        assert_eq!(l.payload, Cursor::pack(1, 0));
        assert_eq!(l.next, Cursor::pack(1, 3));

        // Record kosong di posisi yang sama selesai tepat di ujung
        let l = RecordLayout::at(Cursor::pack(0, 60), 0, CAP);
        assert_eq!(l.next, Cursor::pack(1, 0));
    }

    #[test]
    fn test_fits_empty_ring_accepts_max_record() {
        let max = CAP / 2 - (LEN_PREFIX + 1);
        for offset in 0..CAP {
            let c = Cursor::pack(0, offset);
            assert!(fits(c, c, max, CAP), "offset {offset}");
        }
    }

    #[test]
    fn test_fits_writer_one_lap_ahead() {
        let read = Cursor::pack(0, 20);
        // 4 + 6 byte mulai di 10 selesai di 20: menyentuh reader
        assert!(!fits(Cursor::pack(1, 10), read, 6, CAP));
        assert!(fits(Cursor::pack(1, 10), read, 5, CAP));
    }

    #[test]
    fn test_fits_same_lap_wrap_checks_reader() {
        let write = Cursor::pack(0, 56);
        assert!(!fits(write, Cursor::pack(0, 6), 6, CAP));
        assert!(fits(write, Cursor::pack(0, 7), 6, CAP));
    }

    #[test]
    fn test_fits_end_of_buffer_collides_with_reader_at_zero() {
        let write = Cursor::pack(0, 54);
        assert!(!fits(write, Cursor::ZERO, 6, CAP));
        assert!(fits(write, Cursor::pack(0, 1), 6, CAP));
    }
}
