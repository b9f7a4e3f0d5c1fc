/// Seeded, order-dependent string hash.
///
/// Bytes are mixed from last to first so that a table seeded at start-up
/// cannot be flooded with precomputed collisions.
#[inline]
pub fn str_hash(bytes: &[u8], seed: u32) -> u32 {
    let mut h = seed ^ (bytes.len() as u32);
    for &b in bytes.iter().rev() {
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(b as u32);
    }
    h
}

/// Draw a per-process hash seed.
pub fn random_seed() -> u32 {
    let state = ahash::RandomState::new();
    let h = state.hash_one(&state as *const _ as usize);
    (h ^ (h >> 32)) as u32
}
