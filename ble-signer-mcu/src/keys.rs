//! Private and public key handling
//!
//! The device key is an opaque blob baked into the firmware. It is parsed once
//! at startup; a blob that does not parse leaves the device unable to operate.
//!
//! Accepted encodings, PEM or DER:
//! - PKCS#8 `PRIVATE KEY` (RSA or P-256)
//! - PKCS#1 `RSA PRIVATE KEY`
//! - SEC1 `EC PRIVATE KEY` (P-256)

use p256::ecdsa::signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use p256::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::der::pem;
use rsa::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::rng::RandomSource;
use crate::signer::{sha256, SignError, Signer};

/// Longest DER encoding of a P-256 ECDSA signature
pub const P256_MAX_SIGNATURE_LEN: usize = 72;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key is not valid UTF-8 PEM")]
    NotUtf8,
    #[error("unsupported PEM label: {0}")]
    UnsupportedLabel(String),
    #[error("malformed key: {0}")]
    Malformed(String),
}

/// Device signing key
///
/// RSA keys sign with PKCS#1 v1.5 over SHA-256, P-256 keys produce DER encoded
/// ECDSA signatures.
pub enum SigningKey {
    Rsa(RsaPrivateKey),
    P256(p256::ecdsa::SigningKey),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningKey::Rsa(key) => write!(f, "SigningKey::Rsa({} bits)", key.size() * 8),
            SigningKey::P256(_) => write!(f, "SigningKey::P256"),
        }
    }
}

impl SigningKey {
    /// Parse a private key blob, PEM or DER
    pub fn parse(blob: &[u8]) -> Result<Self, KeyError> {
        let blob = trim_blob(blob);
        let Ok(label) = pem::decode_label(blob) else {
            return Self::from_der(blob);
        };
        let pem = std::str::from_utf8(blob).map_err(|_| KeyError::NotUtf8)?;
        match label {
            "PRIVATE KEY" => match RsaPrivateKey::from_pkcs8_pem(pem) {
                Ok(key) => Ok(SigningKey::Rsa(key)),
                Err(rsa) => p256::SecretKey::from_pkcs8_pem(pem)
                    .map(Self::from)
                    .map_err(|ec| neither(rsa, ec)),
            },
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(pem)
                .map(SigningKey::Rsa)
                .map_err(|e| KeyError::Malformed(e.to_string())),
            "EC PRIVATE KEY" => p256::SecretKey::from_sec1_pem(pem)
                .map(Self::from)
                .map_err(|e| KeyError::Malformed(e.to_string())),
            other => Err(KeyError::UnsupportedLabel(other.to_string())),
        }
    }

    fn from_der(der: &[u8]) -> Result<Self, KeyError> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(SigningKey::Rsa(key));
        }
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(key.into());
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(der) {
            return Ok(SigningKey::Rsa(key));
        }
        p256::SecretKey::from_sec1_der(der)
            .map(Self::from)
            .map_err(|_| KeyError::Malformed("not a PKCS#8, PKCS#1 or SEC1 key".to_string()))
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            SigningKey::Rsa(_) => "rsa-pkcs1v15-sha256",
            SigningKey::P256(_) => "ecdsa-p256-sha256",
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            SigningKey::Rsa(key) => VerifyingKey::Rsa(key.to_public_key()),
            SigningKey::P256(key) => VerifyingKey::P256(*key.verifying_key()),
        }
    }
}

impl From<p256::SecretKey> for SigningKey {
    fn from(key: p256::SecretKey) -> Self {
        SigningKey::P256(key.into())
    }
}

impl Signer for SigningKey {
    fn sign_digest(&self, digest: &[u8; 32], rng: &mut RandomSource) -> Result<Vec<u8>, SignError> {
        match self {
            SigningKey::Rsa(key) => key
                .sign_with_rng(rng, Pkcs1v15Sign::new::<Sha256>(), digest)
                .map_err(|e| SignError::Sign(e.to_string())),
            SigningKey::P256(key) => {
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash_with_rng(rng, digest)
                    .map_err(|e| SignError::Sign(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    fn max_signature_len(&self) -> usize {
        match self {
            SigningKey::Rsa(key) => key.size(),
            SigningKey::P256(_) => P256_MAX_SIGNATURE_LEN,
        }
    }
}

/// Public half of a [`SigningKey`], used by clients to check signatures
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyingKey {
    Rsa(RsaPublicKey),
    P256(p256::ecdsa::VerifyingKey),
}

impl VerifyingKey {
    /// Parse a SubjectPublicKeyInfo (`PUBLIC KEY`) blob, PEM or DER
    pub fn parse(blob: &[u8]) -> Result<Self, KeyError> {
        let blob = trim_blob(blob);
        let Ok(label) = pem::decode_label(blob) else {
            return match RsaPublicKey::from_public_key_der(blob) {
                Ok(key) => Ok(VerifyingKey::Rsa(key)),
                Err(rsa) => p256::ecdsa::VerifyingKey::from_public_key_der(blob)
                    .map(VerifyingKey::P256)
                    .map_err(|ec| neither(rsa, ec)),
            };
        };
        if label != "PUBLIC KEY" {
            return Err(KeyError::UnsupportedLabel(label.to_string()));
        }
        let pem = std::str::from_utf8(blob).map_err(|_| KeyError::NotUtf8)?;
        match RsaPublicKey::from_public_key_pem(pem) {
            Ok(key) => Ok(VerifyingKey::Rsa(key)),
            Err(rsa) => p256::ecdsa::VerifyingKey::from_public_key_pem(pem)
                .map(VerifyingKey::P256)
                .map_err(|ec| neither(rsa, ec)),
        }
    }

    /// Check `signature` over the SHA-256 digest of `message`
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let digest = sha256(message);
        match self {
            VerifyingKey::Rsa(key) => key
                .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                .is_ok(),
            VerifyingKey::P256(key) => match p256::ecdsa::Signature::from_der(signature) {
                Ok(signature) => key.verify_prehash(&digest, &signature).is_ok(),
                Err(_) => false,
            },
        }
    }
}

// Keys embedded as C strings carry a trailing NUL
fn trim_blob(blob: &[u8]) -> &[u8] {
    let blob = match blob.iter().position(|b| *b == 0) {
        Some(end) => &blob[..end],
        None => blob,
    };
    blob.trim_ascii()
}

fn neither(rsa: impl std::fmt::Display, ec: impl std::fmt::Display) -> KeyError {
    KeyError::Malformed(format!("not an RSA key ({rsa}) nor a P-256 key ({ec})"))
}
