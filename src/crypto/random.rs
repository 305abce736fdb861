// SecAPI Random Number Generation
// Cryptographically secure random number generation

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate cryptographically secure random bytes.
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Fill an existing buffer with random bytes.
pub fn fill_random(buffer: &mut [u8]) {
    OsRng.fill_bytes(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1 = random_bytes(32);
        let bytes2 = random_bytes(32);

        assert_eq!(bytes1.len(), 32);
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_fill_random() {
        let mut buffer = [0u8; 32];
        fill_random(&mut buffer);
        assert!(buffer.iter().any(|&b| b != 0));
    }
}
