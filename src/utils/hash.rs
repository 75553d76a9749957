const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over `data`.
///
/// Used as the content hash of the blob heap dictionary, where the value decides the first
/// probe slot. Stable across runs and platforms.
#[must_use]
pub fn fnv1a(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
