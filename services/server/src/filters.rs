//! Transparent byte-level filters around MESSAGE packet payloads (§6).
//! Out of core scope per spec's non-goals beyond *where they plug in*, so
//! these stay small: AES-GCM for encryption, gzip for compression. Control
//! packets (OPEN/CLOSE/PING/PONG/UPGRADE/NOOP) never pass through either.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use rand::RngCore;
use std::io::Read;

use crate::config::{EncryptionAlgorithm, EncryptionConfig};
use crate::error::ServerError;

/// Fixed byte signature prepended to an encrypted MESSAGE payload so a
/// receiver can tell an encrypted frame from a plaintext one without a side
/// channel (§6 "the magic header is detected by a fixed byte signature").
const ENCRYPTION_MAGIC: &[u8] = b"\xE5IOE";
const NONCE_LEN: usize = 12;

pub struct EncryptionFilter {
    algorithm: EncryptionAlgorithm,
    key: Vec<u8>,
}

impl EncryptionFilter {
    pub fn new(config: &EncryptionConfig) -> Result<Self, ServerError> {
        let key = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &config.key)
            .map_err(|_| ServerError::DecryptionError)?;
        let expected_len = match config.algorithm {
            EncryptionAlgorithm::Aes128Gcm => 16,
            EncryptionAlgorithm::Aes256Gcm => 32,
        };
        if key.len() != expected_len {
            return Err(ServerError::DecryptionError);
        }
        Ok(Self {
            algorithm: config.algorithm,
            key,
        })
    }

    /// AEAD encryption only fails past the algorithm's plaintext length
    /// limit (2^39 - 256 bytes for GCM) — unreachable for a single Engine.IO
    /// MESSAGE frame bounded by `maxPacketSize`, but propagated rather than
    /// unwrapped since this runs on the send path, not in test code.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ServerError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(&self.key).expect("key length checked");
                cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| ServerError::EncryptionError)?
            }
            EncryptionAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(&self.key).expect("key length checked");
                cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| ServerError::EncryptionError)?
            }
        };
        let mut out = Vec::with_capacity(ENCRYPTION_MAGIC.len() + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(ENCRYPTION_MAGIC);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Passes non-encrypted frames through untouched; a frame that starts
    /// with the magic header but fails to decrypt is a `DecryptionError`
    /// (§7: close the session, never hand ciphertext to the codec).
    pub fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, ServerError> {
        let Some(rest) = framed.strip_prefix(ENCRYPTION_MAGIC) else {
            return Ok(framed.to_vec());
        };
        if rest.len() < NONCE_LEN {
            return Err(ServerError::DecryptionError);
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        match self.algorithm {
            EncryptionAlgorithm::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(&self.key).expect("key length checked");
                cipher
                    .decrypt(nonce, ciphertext)
                    .map_err(|_| ServerError::DecryptionError)
            }
            EncryptionAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(&self.key).expect("key length checked");
                cipher
                    .decrypt(nonce, ciphertext)
                    .map_err(|_| ServerError::DecryptionError)
            }
        }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// gzip compression for WebSocket frames (§6). Detection of the magic
/// header makes decompression opportunistic rather than config-driven on
/// the receive side, matching spec wording ("receipt detects the magic
/// header").
pub fn maybe_compress(bytes: &[u8], enabled: bool) -> Vec<u8> {
    if !enabled {
        return bytes.to_vec();
    }
    let mut encoder = GzEncoder::new(bytes, Compression::fast());
    let mut out = Vec::new();
    if encoder.read_to_end(&mut out).is_ok() {
        out
    } else {
        bytes.to_vec()
    }
}

pub fn maybe_decompress(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() < 2 || bytes[0..2] != GZIP_MAGIC {
        return bytes.to_vec();
    }
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_ok() {
        out
    } else {
        bytes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aes128_config() -> EncryptionConfig {
        let key = [7u8; 16];
        EncryptionConfig {
            key: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key),
            algorithm: EncryptionAlgorithm::Aes128Gcm,
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let filter = EncryptionFilter::new(&aes128_config()).unwrap();
        let framed = filter.encrypt(b"hello message").unwrap();
        assert!(framed.starts_with(ENCRYPTION_MAGIC));
        let decoded = filter.decrypt(&framed).unwrap();
        assert_eq!(decoded, b"hello message");
    }

    #[test]
    fn plaintext_without_magic_passes_through() {
        let filter = EncryptionFilter::new(&aes128_config()).unwrap();
        let decoded = filter.decrypt(b"4plain text frame").unwrap();
        assert_eq!(decoded, b"4plain text frame");
    }

    #[test]
    fn tampered_ciphertext_is_decryption_error() {
        let filter = EncryptionFilter::new(&aes128_config()).unwrap();
        let mut framed = filter.encrypt(b"hello").unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        assert!(matches!(
            filter.decrypt(&framed),
            Err(ServerError::DecryptionError)
        ));
    }

    #[test]
    fn compression_round_trips() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = maybe_compress(&original, true);
        assert!(compressed.starts_with(&GZIP_MAGIC));
        assert_eq!(maybe_decompress(&compressed), original);
    }

    #[test]
    fn compression_disabled_is_passthrough() {
        let original = b"hello".to_vec();
        assert_eq!(maybe_compress(&original, false), original);
    }
}
