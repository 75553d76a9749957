//! Small arithmetic and hashing helpers shared across the crate.

mod hash;
mod math;

pub(crate) use hash::fnv1a;
pub(crate) use math::{align_to, align_to_4_bytes, is_power_of_two, to_u32};
