//! Cipher transform - single-byte XOR obfuscation
//!
//! Each output byte is the input byte XOR the shared key, so the same call
//! encrypts and decrypts. This hides the payload from a casual observer and
//! nothing more: a one-byte repeating key falls to anyone who sees a single
//! frame next to a guess of its plaintext. Do not present it as encryption.
//! A real cipher can replace it behind [`FrameTransform`].

use crate::contracts::CipherKey;

/// Byte-stream transform applied to frames before sending and after receipt
///
/// Implementations must be length-preserving and their own inverse.
pub trait FrameTransform: Send + Sync {
    /// Transform `data` in place
    fn apply_in_place(&self, data: &mut [u8]);

    /// Transform `input` into a fresh buffer of the same length
    fn apply(&self, input: &[u8]) -> Vec<u8> {
        let mut out = input.to_vec();
        self.apply_in_place(&mut out);
        out
    }
}

/// XOR every byte with a single key byte
#[derive(Debug, Clone, Copy)]
pub struct XorCipher {
    key: CipherKey,
}

impl XorCipher {
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> CipherKey {
        self.key
    }
}

impl FrameTransform for XorCipher {
    fn apply_in_place(&self, data: &mut [u8]) {
        transform_in_place(data, self.key);
    }
}

/// XOR `input` with `key`, returning a buffer of identical length
#[inline]
pub fn transform(input: &[u8], key: CipherKey) -> Vec<u8> {
    input.iter().map(|b| b ^ key.byte()).collect()
}

#[inline]
pub fn transform_in_place(data: &mut [u8], key: CipherKey) {
    let k = key.byte();
    for b in data.iter_mut() {
        *b ^= k;
    }
}
