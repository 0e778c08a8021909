use crate::crypt::encoding::{b64url_decode, b64url_encode};
use crate::error::GbdbError;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Marks payloads written in the current authenticated format.
const PREFIX: &str = "enc1.";
/// Historic IV seed kept so pre-rewrite data stays decodable.
const LEGACY_IV_SEED: &[u8] = b"1234567891011121";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Authenticated encryption of opaque byte strings.
///
/// Current format: `enc1.<b64url nonce>.<b64url tag>.<b64url ciphertext>`
/// using AES-256-GCM with a random per-message nonce. The tag is verified
/// in constant time before any plaintext is released; failure yields a
/// distinguished `Tampered` error, never garbage.
///
/// Legacy format (no prefix): base64url of an AES-256-CBC ciphertext with
/// a fixed derived IV and no integrity tag. Read-only and disabled unless
/// explicitly opted in.
pub struct Cipher {
    key: Zeroizing<[u8; 32]>,
    gcm: Aes256Gcm,
    legacy_decode: bool,
}

impl Cipher {
    /// Derives the working key as SHA-256 of the operator secret; the raw
    /// secret itself is never used as key material.
    pub fn new(secret: &[u8], legacy_decode: bool) -> Result<Self, GbdbError> {
        let digest = Sha256::digest(secret);
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest);
        let gcm = Aes256Gcm::new_from_slice(&*key).map_err(|e| GbdbError::InvalidConfig {
            message: format!("invalid cipher key: {e}"),
        })?;
        Ok(Self {
            key,
            gcm,
            legacy_decode,
        })
    }

    pub fn encode(&self, plaintext: &[u8]) -> Result<String, GbdbError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut combined = self
            .gcm
            .encrypt(&nonce, plaintext)
            .map_err(|e| GbdbError::Encode(format!("encryption failed: {e}")))?;
        let tag = combined.split_off(combined.len() - TAG_LEN);
        Ok(format!(
            "{PREFIX}{}.{}.{}",
            b64url_encode(&nonce),
            b64url_encode(&tag),
            b64url_encode(&combined)
        ))
    }

    pub fn decode(&self, token: &str) -> Result<Vec<u8>, GbdbError> {
        if let Some(rest) = token.strip_prefix(PREFIX) {
            return self.decode_current(rest);
        }
        if self.legacy_decode {
            return self.decode_legacy(token);
        }
        Err(GbdbError::Tampered {
            message: "unprefixed payload and legacy decoding disabled".into(),
        })
    }

    fn decode_current(&self, packed: &str) -> Result<Vec<u8>, GbdbError> {
        let mut parts = packed.split('.');
        let (nonce, tag, ciphertext) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(n), Some(t), Some(c), None) => (n, t, c),
            _ => {
                return Err(GbdbError::Tampered {
                    message: "payload does not have three fields".into(),
                })
            }
        };
        let nonce = b64url_decode(nonce).ok_or_else(|| tampered("nonce is not base64url"))?;
        let tag = b64url_decode(tag).ok_or_else(|| tampered("tag is not base64url"))?;
        let ciphertext =
            b64url_decode(ciphertext).ok_or_else(|| tampered("ciphertext is not base64url"))?;
        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(tampered("nonce or tag has wrong length"));
        }

        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);
        self.gcm
            .decrypt(Nonce::from_slice(&nonce), combined.as_slice())
            .map_err(|_| tampered("authentication tag mismatch"))
    }

    fn decode_legacy(&self, token: &str) -> Result<Vec<u8>, GbdbError> {
        // Historic tokens were written in the standard base64 alphabet
        // with padding; fold them into the URL-safe alphabet first.
        let normalized: String = token
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                c => c,
            })
            .collect();
        let ciphertext = b64url_decode(&normalized)
            .ok_or_else(|| tampered("legacy payload is not base64"))?;
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(tampered("legacy payload has invalid length"));
        }
        let iv_digest = Sha256::digest(LEGACY_IV_SEED);
        let decryptor = Aes256CbcDec::new_from_slices(&*self.key, &iv_digest[..16])
            .map_err(|e| GbdbError::InvalidConfig {
                message: format!("invalid legacy cipher parameters: {e}"),
            })?;
        let mut buf = ciphertext;
        let plaintext = decryptor
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| tampered("legacy padding invalid"))?;
        Ok(plaintext.to_vec())
    }
}

fn tampered(message: &str) -> GbdbError {
    GbdbError::Tampered {
        message: message.into(),
    }
}
