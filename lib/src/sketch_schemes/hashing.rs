// The individual digests retained in a sketch
pub type ItemHash = u32;

const PRIME32_2: u32 = 0x85EB_CA77;
const PRIME32_3: u32 = 0xC2B2_AE3D;
const PRIME32_4: u32 = 0x27D4_EB2F;
const PRIME32_5: u32 = 0x1656_67B1;

/// Mixes a single 32-bit value with a seed, following the xxHash32 round and
/// avalanche structure for a 4-byte input.
#[inline]
pub fn hash_f(value: u32, seed: u32) -> ItemHash {
    let mut h32 = seed.wrapping_add(PRIME32_5).wrapping_add(4);
    h32 = h32.wrapping_add(value.wrapping_mul(PRIME32_3));
    h32 = h32.rotate_left(17).wrapping_mul(PRIME32_4);
    h32 ^= h32 >> 15;
    h32 = h32.wrapping_mul(PRIME32_2);
    h32 ^= h32 >> 13;
    h32 = h32.wrapping_mul(PRIME32_3);
    h32 ^= h32 >> 16;
    h32
}

/// The digest actually stored: the hash reduced into `[0, space_size)`.
#[inline]
pub fn digest(value: u32, seed: u32, space_size: u32) -> ItemHash {
    hash_f(value, seed) % space_size
}
