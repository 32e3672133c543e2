//! Signing engine: hash, sign, encode
//!
//! Each step is a hard gate. A failure aborts the request with no partial
//! output; the caller decides what to log and never pushes a value.

use data_encoding::BASE64;
use sha2::{Digest, Sha256};

use crate::keys::SigningKey;
use crate::rng::RandomSource;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignError {
    #[error("hashing failed: {0}")]
    Hash(String),
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("base64 encoding failed: need {needed} bytes, buffer holds {capacity}")]
    Encode { needed: usize, capacity: usize },
}

/// `Ok` carries the base64 signature, `Err` the step that failed
pub type SignResult = Result<String, SignError>;

/// Trait for signing key backends
///
/// The engine only needs a digest, a signature over it and an upper bound on
/// the signature length to size its output buffer.
pub trait Signer {
    /// 256-bit digest of the message, SHA-256 unless overridden
    fn digest(&self, message: &[u8]) -> Result<[u8; 32], SignError> {
        Ok(sha256(message))
    }

    /// Sign a digest, drawing any randomness from `rng`
    fn sign_digest(&self, digest: &[u8; 32], rng: &mut RandomSource) -> Result<Vec<u8>, SignError>;

    /// Largest signature this key can produce, in bytes
    fn max_signature_len(&self) -> usize;
}

/// Owns the device key and the random source
#[derive(Debug)]
pub struct SigningEngine<S = SigningKey> {
    signer: S,
    rng: RandomSource,
}

impl<S: Signer> SigningEngine<S> {
    pub fn new(signer: S, rng: RandomSource) -> Self {
        Self { signer, rng }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Hash, sign and base64 encode `payload`
    pub fn sign(&mut self, payload: &[u8]) -> SignResult {
        let digest = self.signer.digest(payload)?;
        let signature = self.signer.sign_digest(&digest, &mut self.rng)?;
        encode_signature(&signature, self.signer.max_signature_len())
    }
}

/// Base64 encode into a buffer sized for the largest signature of the key
pub fn encode_signature(signature: &[u8], max_signature_len: usize) -> SignResult {
    let capacity = BASE64.encode_len(max_signature_len);
    let needed = BASE64.encode_len(signature.len());
    if needed > capacity {
        return Err(SignError::Encode { needed, capacity });
    }

    let mut buf = vec![0u8; capacity];
    BASE64.encode_mut(signature, &mut buf[..needed]);
    buf.truncate(needed);

    String::from_utf8(buf).map_err(|_| SignError::Encode { needed, capacity })
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
