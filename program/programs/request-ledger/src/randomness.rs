//! Randomness payload helpers: word expansion and pool selection.

use sha2::{Digest, Sha256};

/// Payload delivered for a randomness request: one 32-byte word per requested value.
pub type RandomWords = Vec<[u8; 32]>;

/// Expand base randomness into multiple words: `word[i] = SHA256(randomness || i_le_bytes)`.
pub fn expand_randomness(base_randomness: &[u8; 32], num_words: u32) -> RandomWords {
    let mut words = Vec::with_capacity(num_words as usize);
    for i in 0..num_words {
        let mut hasher = Sha256::new();
        hasher.update(base_randomness);
        hasher.update(i.to_le_bytes());
        let mut word = [0u8; 32];
        word.copy_from_slice(&hasher.finalize());
        words.push(word);
    }
    words
}

/// Interpret the first 8 bytes of a word as a little-endian `u64`.
pub fn word_to_u64(word: &[u8; 32]) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&word[..8]);
    u64::from_le_bytes(head)
}

/// Pick an index into a pool of `pool_len` entries as `random mod pool_len`.
///
/// This is biased whenever `pool_len` does not divide 2^64; the skew is kept
/// as-is. Returns `None` for an empty pool.
pub fn select_index(random: u64, pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }
    Some((random % pool_len as u64) as usize)
}

/// Same as [`select_index`] over a full 256-bit big-endian word (`uint256 % n`).
pub fn select_index_wide(word: &[u8; 32], pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }
    let modulus = pool_len as u128;
    let rem = word
        .iter()
        .fold(0u128, |acc, byte| ((acc << 8) | u128::from(*byte)) % modulus);
    Some(rem as usize)
}
