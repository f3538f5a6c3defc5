//! Bit-level helpers for non-contiguous address fields.

use itertools::Itertools;

/// Iterates over the positions of the set bits of `mask`, lowest first.
pub fn bit_positions(mask: u64) -> impl Iterator<Item = u32> {
    (0..u64::BITS).filter(move |bit| mask & (1 << bit) != 0)
}

/// Gathers the bits of `value` selected by `mask` into a right-aligned integer.
///
/// The lowest set bit of `mask` becomes bit 0 of the result, the next one bit 1, and so on.
/// A contiguous mask degenerates to a single shift.
pub fn gather_bits(value: u64, mask: u64) -> u64 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    if (mask >> shift).wrapping_add(1).is_power_of_two() {
        return (value & mask) >> shift;
    }
    bit_positions(mask)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | (((value >> bit) & 1) << i))
}

/// Scatters the low bits of `value` into the positions selected by `mask`.
///
/// Inverse of [`gather_bits`]: bit `i` of `value` lands on the `i`-th lowest set bit of `mask`.
/// Bits of `value` above `mask.count_ones()` are ignored.
pub fn scatter_bits(value: u64, mask: u64) -> u64 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    if (mask >> shift).wrapping_add(1).is_power_of_two() {
        return (value << shift) & mask;
    }
    bit_positions(mask)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | (((value >> i) & 1) << bit))
}

/// Formats the set bit positions of `val`, e.g. `"6 + 7 + 13"`.
pub fn bit_string(val: u64) -> String {
    bit_positions(val).join(" + ")
}

/// Formats `val` as a binary literal without leading zeros, e.g. `"0b101"`.
pub fn int_to_bin(val: u64) -> String {
    format!("{:#b}", val)
}
