use crate::Result;

/// Convert a `usize` into a `u32`, failing when the value does not fit.
///
/// Metadata sizes and offsets are 32-bit on the wire; anything larger cannot be serialized.
///
/// # Errors
/// Returns [`crate::Error::ArgumentOutOfRange`] if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| argument_error!("value {value} exceeds u32::MAX"))
}

/// Round `value` up to the next multiple of `alignment`, which must be a power of two.
#[must_use]
pub fn align_to(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Round `value` up to the next 4-byte boundary, the alignment of every metadata stream.
#[must_use]
pub fn align_to_4_bytes(value: usize) -> usize {
    align_to(value, 4)
}

/// Returns the base-2 exponent of `value` if it is a positive power of two.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // trailing_zeros <= 63 for usize
pub fn is_power_of_two(value: usize) -> Option<u8> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}
