//! Little-endian decoding for the binary workbook formats.
//!
//! Every accessor is bounds-checked and returns `None` past the end of the slice,
//! so truncated records surface as errors instead of panics.

/// Copies `N` bytes starting at `at`.
#[inline]
fn array<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at.checked_add(N)?)?.try_into().ok()
}

#[inline]
pub(crate) fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
    array(bytes, at).map(u16::from_le_bytes)
}

#[inline]
pub(crate) fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    array(bytes, at).map(u32::from_le_bytes)
}

#[inline]
pub(crate) fn i32_at(bytes: &[u8], at: usize) -> Option<i32> {
    array(bytes, at).map(i32::from_le_bytes)
}

#[inline]
pub(crate) fn u64_at(bytes: &[u8], at: usize) -> Option<u64> {
    array(bytes, at).map(u64::from_le_bytes)
}

#[inline]
pub(crate) fn f64_at(bytes: &[u8], at: usize) -> Option<f64> {
    array(bytes, at).map(f64::from_le_bytes)
}

/// Reads a 32-bit length or index widened to `usize`.
#[inline]
pub(crate) fn usize_at(bytes: &[u8], at: usize) -> Option<usize> {
    u32_at(bytes, at).map(|value| value as usize)
}

/// Splits `bytes` into consecutive 32-bit values; a trailing partial chunk is ignored.
pub(crate) fn usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_values() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(u16_at(&bytes, 0), Some(0x0201));
        assert_eq!(u32_at(&bytes, 0), Some(0x0403_0201));
        assert_eq!(i32_at(&bytes, 4), Some(-1));
        assert_eq!(usize_at(&bytes, 1), Some(0xFF04_0302));
        assert_eq!(f64_at(&1.5f64.to_le_bytes(), 0), Some(1.5));
        assert_eq!(u64_at(&bytes, 0), Some(0xFFFF_FFFF_0403_0201));
    }

    #[test]
    fn out_of_bounds_is_none() {
        let bytes = [0u8; 4];
        assert_eq!(u32_at(&bytes, 1), None);
        assert_eq!(u16_at(&bytes, usize::MAX), None);
        assert_eq!(f64_at(&bytes, 0), None);
        assert_eq!(usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0, 9]).collect::<Vec<_>>(), vec![1, 2]);
    }
}
