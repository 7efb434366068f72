//! Versioned Cursor: offset byte + generasi lap dalam satu `u64`
//!
//! Layout:
//! ```text
//! ┌──────────────────────────┬──────────────────────────┐
//! │ generation (32 bit high) │ offset (32 bit low)      │
//! └──────────────────────────┴──────────────────────────┘
//! ```
//!
//! Membandingkan offset saja tidak bisa membedakan "reader tertinggal satu
//! lap penuh" dengan "reader dan writer di titik yang sama" (masalah ABA).
//! Field generation yang membedakan keduanya.

use std::fmt;

/// Posisi di dalam ring: offset byte plus berapa kali sudah wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Cursor(u64);

impl Cursor {
    /// Posisi awal: generation 0, offset 0
    pub const ZERO: Self = Self(0);

    /// Gabungkan generation dan offset menjadi satu word
    #[inline(always)]
    pub const fn pack(generation: u32, offset: u32) -> Self {
        Self(((generation as u64) << 32) | offset as u64)
    }

    /// Bungkus nilai mentah (misalnya hasil load dari atomic)
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Offset byte di dalam ring (32 bit rendah)
    #[inline(always)]
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// Generasi lap (32 bit tinggi)
    #[inline(always)]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Awal lap berikutnya. Generation boleh rollover ke 0.
    #[inline(always)]
    pub const fn wrapped(self) -> Self {
        Self::pack(self.generation().wrapping_add(1), 0)
    }

    /// Offset baru di lap yang sama
    #[inline(always)]
    pub const fn with_offset(self, offset: u32) -> Self {
        Self::pack(self.generation(), offset)
    }

    #[inline(always)]
    pub const fn same_lap(self, other: Self) -> bool {
        self.generation() == other.generation()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:>8}, {:>8})", self.generation(), self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_zero() {
        let c = Cursor::pack(0, 0);
        assert_eq!(c, Cursor::ZERO);
        assert_eq!(c.raw(), 0);
        assert_eq!(c.offset(), 0);
        assert_eq!(c.generation(), 0);
    }

    #[test]
    fn test_pack_capacity_boundary() {
        let capacity = 1024u32;
        let c = Cursor::pack(7, capacity - 1);
        assert_eq!(c.offset(), 1023);
        assert_eq!(c.generation(), 7);
        assert_eq!(Cursor::from_raw(c.raw()), c);
    }

    #[test]
    fn test_fields_do_not_bleed() {
        let c = Cursor::pack(u32::MAX, u32::MAX);
        assert_eq!(c.raw(), u64::MAX);
        assert_eq!(c.offset(), u32::MAX);
        assert_eq!(c.generation(), u32::MAX);

        let c = Cursor::pack(1, 0);
        assert_eq!(c.raw(), 1 << 32);
        assert_eq!(c.offset(), 0);
    }

    #[test]
    fn test_wrapped_bumps_generation() {
        let c = Cursor::pack(3, 500).wrapped();
        assert_eq!(c.generation(), 4);
        assert_eq!(c.offset(), 0);
    }

    #[test]
    fn test_generation_rollover() {
        let c = Cursor::pack(u32::MAX, 12).wrapped();
        assert_eq!(c.generation(), 0);
        assert_eq!(c.offset(), 0);
    }

    #[test]
    fn test_same_offset_different_lap_is_not_equal() {
        let reader = Cursor::pack(4, 64);
        let writer = Cursor::pack(5, 64);
        assert_ne!(reader, writer);
        assert!(!reader.same_lap(writer));
        assert!(reader.same_lap(reader.with_offset(10)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cursor::pack(1, 2).to_string(), "(       1,        2)");
    }
}
