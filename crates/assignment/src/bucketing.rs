//! Deterministic bucketing for percentage-based rollouts. Uses MurmurHash3
//! (x86 32-bit) so buckets are stable across process restarts and across
//! implementations in other languages; the hash is written out here rather
//! than pulled from a crate to keep the byte-level contract in view.

/// Bucket granularity: [0, 10000) gives 0.01% steps.
pub const BUCKET_COUNT: u32 = 10_000;

const ROLLOUT_SEED: u32 = 0;
const VARIATION_SEED: u32 = 0x9747_b28c;

/// MurmurHash3 x86 32-bit.
pub fn murmur3_32(key: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = key.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k |= (byte as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    h ^= key.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

fn subject_key(flag_id: &str, subject_id: &str) -> String {
    format!("{flag_id}-{subject_id}")
}

/// Stable bucket in [0, BUCKET_COUNT) for a (flag, subject) pair.
pub fn bucket(flag_id: &str, subject_id: &str) -> u32 {
    murmur3_32(subject_key(flag_id, subject_id).as_bytes(), ROLLOUT_SEED) % BUCKET_COUNT
}

/// Percentage rollout gate. `rollout_pct` is in [0, 100]; a subject is in
/// the rollout when its bucket falls below the threshold.
pub fn in_rollout(flag_id: &str, subject_id: &str, rollout_pct: f64) -> bool {
    let threshold = (rollout_pct.clamp(0.0, 100.0) / 100.0 * BUCKET_COUNT as f64).round() as u32;
    bucket(flag_id, subject_id) < threshold
}

/// Pick among named variations using a second, independently-seeded hash
/// over the same key, so variation choice does not correlate with the
/// rollout gate.
pub fn pick_variation<'a>(flag_id: &str, subject_id: &str, variations: &[&'a str]) -> Option<&'a str> {
    if variations.is_empty() {
        return None;
    }
    let hash = murmur3_32(subject_key(flag_id, subject_id).as_bytes(), VARIATION_SEED);
    Some(variations[(hash as usize) % variations.len()])
}
