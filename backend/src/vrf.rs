//! Deterministic randomness computation.
//!
//! Uses HMAC-SHA256 keyed by the oracle's secret to produce a 32-byte
//! pseudo-random output that is deterministic (same inputs = same output)
//! but unpredictable without the secret key.

use hmac::{Hmac, Mac};
use request_ledger::RequestId;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the 32-byte base randomness for a request.
///
/// ```text
/// output = HMAC-SHA256(secret, seed || requested_at_le || request_id)
/// ```
///
/// The caller-provided `seed` prevents the oracle from pre-computing outputs.
/// `requested_at` binds the output to registration time, and `request_id`
/// ensures uniqueness across requests.
pub fn compute_randomness(
    hmac_secret: &[u8],
    seed: &[u8; 32],
    requested_at: u64,
    request_id: &RequestId,
) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(hmac_secret).expect("HMAC accepts keys of any size");

    mac.update(seed);
    mac.update(&requested_at.to_le_bytes());
    mac.update(request_id.as_bytes());

    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let secret = b"test-secret";
        let seed = [1u8; 32];
        let id = RequestId::from(0);

        let r1 = compute_randomness(secret, &seed, 100, &id);
        let r2 = compute_randomness(secret, &seed, 100, &id);
        assert_eq!(r1, r2);
    }

    #[test]
    fn different_for_different_times() {
        let secret = b"test-secret";
        let seed = [1u8; 32];
        let id = RequestId::from(0);

        let r1 = compute_randomness(secret, &seed, 100, &id);
        let r2 = compute_randomness(secret, &seed, 101, &id);
        assert_ne!(r1, r2);
    }

    #[test]
    fn different_for_different_ids() {
        let secret = b"test-secret";
        let seed = [1u8; 32];

        let r1 = compute_randomness(secret, &seed, 100, &RequestId::from(0));
        let r2 = compute_randomness(secret, &seed, 100, &RequestId::from(1));
        assert_ne!(r1, r2);
    }

    #[test]
    fn different_for_different_secrets() {
        let seed = [1u8; 32];
        let id = RequestId::from(0);

        let r1 = compute_randomness(b"secret-a", &seed, 100, &id);
        let r2 = compute_randomness(b"secret-b", &seed, 100, &id);
        assert_ne!(r1, r2);
    }
}
