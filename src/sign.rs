// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Crypto Keyring: generation, PEM serialization, fingerprinting,
//! signing and verification for the three supported key types.
//!
//! Key material is modelled as a tagged sum (`Key`), per the design note in
//! `spec.md` §9, rather than trait objects: the three cryptosystems don't
//! share an underlying representation worth abstracting behind a vtable,
//! and a `match` keeps the per-algorithm byte contracts (§4.1) easy to audit
//! side by side.

use crate::error::{self, Result};
use crate::schema::{KeyId, KeyMethod, KeyType, RawKey, SerializedKey};
use elliptic_curve::sec1::ToEncodedPoint;
use pem::Pem;
use pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rand_core::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::signature::RandomizedSigner;
use sha2::{Digest, Sha256};
use signature::{Signer as _, Verifier as _};

const PEM_PUBLIC_TAG: &str = "PUBLIC KEY";
const PEM_PRIVATE_TAG: &str = "PRIVATE KEY";

const RSA_BITS: usize = 2048;

/// A keypair (or public-only key) for one of the three supported
/// cryptosystems.
#[derive(Debug)]
pub enum Key {
    Ed25519 {
        public: ed25519_dalek::VerifyingKey,
        private: Option<ed25519_dalek::SigningKey>,
    },
    Ecdsa {
        public: p256::ecdsa::VerifyingKey,
        private: Option<p256::ecdsa::SigningKey>,
    },
    Rsa {
        public: rsa::RsaPublicKey,
        private: Option<rsa::RsaPrivateKey>,
    },
}

impl Key {
    /// `Generate(keyType) -> Key`: a fresh keypair. RSA at 2048 bits, ECDSA
    /// on P-256, Ed25519 standard.
    pub fn generate(key_type: KeyType) -> Result<Self> {
        match key_type {
            KeyType::Ed25519 => {
                let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
                let public = signing_key.verifying_key();
                Ok(Key::Ed25519 {
                    public,
                    private: Some(signing_key),
                })
            }
            KeyType::EcPrime256v1 => {
                let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
                let public = *signing_key.verifying_key();
                Ok(Key::Ecdsa {
                    public,
                    private: Some(signing_key),
                })
            }
            KeyType::Rsa => {
                let private_key = rsa::RsaPrivateKey::new(&mut OsRng, RSA_BITS)
                    .map_err(|e| crypto_error(format!("rsa key generation failed: {e}")))?;
                let public = private_key.to_public_key();
                Ok(Key::Rsa {
                    public,
                    private: Some(private_key),
                })
            }
        }
    }

    /// `Method(key) -> KeyMethod`.
    #[must_use]
    pub fn method(&self) -> KeyMethod {
        match self {
            Key::Ed25519 { .. } => KeyMethod::Ed25519,
            Key::Ecdsa { .. } => KeyMethod::EcPrime256v1,
            Key::Rsa { .. } => KeyMethod::RsassaPssSha256,
        }
    }

    fn key_type(&self) -> KeyType {
        match self {
            Key::Ed25519 { .. } => KeyType::Ed25519,
            Key::Ecdsa { .. } => KeyType::EcPrime256v1,
            Key::Rsa { .. } => KeyType::Rsa,
        }
    }

    /// Whether this `Key` has a private half and can therefore sign.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        match self {
            Key::Ed25519 { private, .. } => private.is_some(),
            Key::Ecdsa { private, .. } => private.is_some(),
            Key::Rsa { private, .. } => private.is_some(),
        }
    }

    /// The canonical public bytes used for both PEM encoding and
    /// fingerprinting, per the per-algorithm contracts in §4.1.
    fn public_bytes(&self) -> Vec<u8> {
        match self {
            Key::Ed25519 { public, .. } => public.to_bytes().to_vec(),
            Key::Ecdsa { public, .. } => public.to_encoded_point(true).as_bytes().to_vec(),
            Key::Rsa { public, .. } => public
                .to_public_key_der()
                .expect("RSA public key always encodes")
                .as_bytes()
                .to_vec(),
        }
    }

    /// `Fingerprint(key) -> KeyID`: SHA-256 hex of the canonical public
    /// bytes. For RSA specifically, the fingerprint contract hashes the
    /// modulus bytes N rather than the SPKI DER (see §4.1's "Fingerprint
    /// contract" paragraph, which singles RSA out).
    #[must_use]
    pub fn fingerprint(&self) -> KeyId {
        let digest_input = match self {
            Key::Rsa { public, .. } => public.n().to_bytes_be(),
            _ => self.public_bytes(),
        };
        hex::encode(Sha256::digest(&digest_input))
    }

    /// `MarshalAll(key) -> SerializedKey`: PEM public + PEM private.
    pub fn marshal_all(&self) -> Result<SerializedKey> {
        let public = self.encode_public_pem();
        let private = Some(self.encode_private_pem()?);
        Ok(SerializedKey {
            keytype: self.key_type(),
            keyval: RawKey { public, private },
        })
    }

    /// `MarshalPublic(key) -> SerializedKey`: PEM public only; `private`
    /// absent.
    #[must_use]
    pub fn marshal_public(&self) -> SerializedKey {
        SerializedKey {
            keytype: self.key_type(),
            keyval: RawKey {
                public: self.encode_public_pem(),
                private: None,
            },
        }
    }

    fn encode_public_pem(&self) -> String {
        pem::encode(&Pem::new(PEM_PUBLIC_TAG, self.public_bytes()))
    }

    fn encode_private_pem(&self) -> Result<String> {
        let bytes = match self {
            Key::Ed25519 { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                // 64-byte raw private key: 32-byte seed followed by the
                // 32-byte public key, matching Go's `crypto/ed25519`
                // `PrivateKey` representation.
                let mut raw = sk.to_bytes().to_vec();
                raw.extend_from_slice(sk.verifying_key().as_bytes());
                raw
            }
            Key::Ecdsa { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                sk.to_bytes().to_vec()
            }
            Key::Rsa { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                sk.to_pkcs1_der()
                    .map_err(|e| crypto_error(format!("failed to encode RSA private key: {e}")))?
                    .as_bytes()
                    .to_vec()
            }
        };
        Ok(pem::encode(&Pem::new(PEM_PRIVATE_TAG, bytes)))
    }

    /// `Unmarshal(SerializedKey) -> Key`: rejects unknown types; returns a
    /// `Key` that supports `verify` and, if private PEM decoded, `sign`.
    pub fn unmarshal(serialized: &SerializedKey) -> Result<Self> {
        let public_bytes = decode_pem(&serialized.keyval.public, PEM_PUBLIC_TAG)?;
        let private_bytes = serialized
            .keyval
            .private
            .as_deref()
            .map(|p| decode_pem(p, PEM_PRIVATE_TAG))
            .transpose()?;

        match serialized.keytype {
            KeyType::Ed25519 => {
                let public_arr: [u8; 32] = public_bytes.try_into().map_err(|_| {
                    crypto_error("ed25519 public key must be 32 bytes".to_string())
                })?;
                let public = ed25519_dalek::VerifyingKey::from_bytes(&public_arr)
                    .map_err(|e| crypto_error(format!("invalid ed25519 public key: {e}")))?;
                let private = match private_bytes {
                    Some(bytes) if bytes.len() == 64 => {
                        let mut seed = [0u8; 32];
                        seed.copy_from_slice(&bytes[..32]);
                        Some(ed25519_dalek::SigningKey::from_bytes(&seed))
                    }
                    Some(_) => {
                        return Err(crypto_error(
                            "ed25519 private key must be 64 bytes".to_string(),
                        ))
                    }
                    None => None,
                };
                Ok(Key::Ed25519 { public, private })
            }
            KeyType::EcPrime256v1 => {
                let public = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_bytes)
                    .map_err(|e| crypto_error(format!("invalid ecdsa point: {e}")))?;
                let private = match private_bytes {
                    Some(bytes) => {
                        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
                            crypto_error("ecdsa private key must be 32 bytes".to_string())
                        })?;
                        let field = p256::FieldBytes::from(arr);
                        Some(
                            p256::ecdsa::SigningKey::from_bytes(&field)
                                .map_err(|e| crypto_error(format!("invalid ecdsa scalar: {e}")))?,
                        )
                    }
                    None => None,
                };
                Ok(Key::Ecdsa { public, private })
            }
            KeyType::Rsa => {
                let public = rsa::RsaPublicKey::from_public_key_der(&public_bytes)
                    .map_err(|e| crypto_error(format!("invalid rsa public key der: {e}")))?;
                let private = match private_bytes {
                    Some(bytes) => Some(
                        rsa::RsaPrivateKey::from_pkcs1_der(&bytes)
                            .map_err(|e| crypto_error(format!("invalid rsa private key der: {e}")))?,
                    ),
                    None => None,
                };
                Ok(Key::Rsa { public, private })
            }
        }
    }

    /// `Sign(key, message) -> signature bytes`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Key::Ed25519 { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                Ok(sk.sign(message).to_bytes().to_vec())
            }
            Key::Ecdsa { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                let sig: p256::ecdsa::Signature = sk.sign(message);
                Ok(sig.to_der().as_bytes().to_vec())
            }
            Key::Rsa { private, .. } => {
                let sk = private.as_ref().ok_or_else(no_private_key)?;
                let signing_key = rsa::pss::SigningKey::<Sha256>::new(sk.clone());
                let sig = signing_key.sign_with_rng(&mut OsRng, message);
                Ok(sig.to_vec())
            }
        }
    }

    /// `Verify(key, message, signature) -> ok | error`.
    pub fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> Result<()> {
        match self {
            Key::Ed25519 { public, .. } => {
                let sig_arr: [u8; 64] = signature_bytes.try_into().map_err(|_| {
                    crypto_error("ed25519 signature must be 64 bytes".to_string())
                })?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_arr);
                public
                    .verify(message, &sig)
                    .map_err(|_| crypto_error("ed25519 signature verification failed".to_string()))
            }
            Key::Ecdsa { public, .. } => {
                let sig = p256::ecdsa::Signature::from_der(signature_bytes)
                    .map_err(|e| crypto_error(format!("malformed ecdsa signature: {e}")))?;
                public
                    .verify(message, &sig)
                    .map_err(|_| crypto_error("ecdsa signature verification failed".to_string()))
            }
            Key::Rsa { public, .. } => {
                let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(public.clone());
                let sig = rsa::pss::Signature::try_from(signature_bytes)
                    .map_err(|e| crypto_error(format!("malformed rsa signature: {e}")))?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| crypto_error("rsa signature verification failed".to_string()))
            }
        }
    }
}

fn no_private_key() -> error::Error {
    crypto_error("key has no private half".to_string())
}

fn crypto_error(message: String) -> error::Error {
    error::CryptoErrorSnafu { message }.build()
}

/// Decodes a PEM block, skipping blocks whose tag doesn't match `want_tag`
/// and erroring only once input is exhausted, per the PEM decoding contract
/// in §4.1.
fn decode_pem(input: &str, want_tag: &str) -> Result<Vec<u8>> {
    let blocks = pem::parse_many(input.as_bytes())
        .map_err(|e| crypto_error(format!("failed to decode PEM: {e}")))?;
    blocks
        .into_iter()
        .find(|block| block.tag() == want_tag)
        .map(|block| block.contents().to_vec())
        .ok_or_else(|| crypto_error(format!("no PEM block with tag {want_tag} found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(key_type: KeyType) {
        let key = Key::generate(key_type).unwrap();
        let serialized = key.marshal_all().unwrap();
        assert!(serialized.keyval.private.is_some());

        let recovered = Key::unmarshal(&serialized).unwrap();
        assert_eq!(recovered.fingerprint(), key.fingerprint());

        let message = b"root metadata payload";
        let sig = recovered.sign(message).unwrap();
        recovered.verify(message, &sig).unwrap();
        key.verify(message, &sig).unwrap();

        let public_only_serialized = recovered.marshal_public();
        assert!(public_only_serialized.keyval.private.is_none());
        let public_only = Key::unmarshal(&public_only_serialized).unwrap();
        assert_eq!(public_only.fingerprint(), key.fingerprint());
        assert!(!public_only.can_sign());
        public_only.verify(message, &sig).unwrap();
    }

    #[test]
    fn ed25519_round_trips() {
        round_trip(KeyType::Ed25519);
    }

    #[test]
    fn ecdsa_round_trips() {
        round_trip(KeyType::EcPrime256v1);
    }

    #[test]
    fn rsa_round_trips() {
        round_trip(KeyType::Rsa);
    }

    #[test]
    fn ed25519_signature_length_is_64() {
        let key = Key::generate(KeyType::Ed25519).unwrap();
        let sig = key.sign(b"msg").unwrap();
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn marshal_public_never_contains_private_field() {
        for key_type in [KeyType::Ed25519, KeyType::EcPrime256v1, KeyType::Rsa] {
            let key = Key::generate(key_type).unwrap();
            let serialized = key.marshal_public();
            let json = serde_json::to_string(&serialized).unwrap();
            assert!(!json.contains("private"), "leaked private field for {key_type}");
        }
    }

    #[test]
    fn fingerprint_is_deterministic_across_marshal_unmarshal() {
        for key_type in [KeyType::Ed25519, KeyType::EcPrime256v1, KeyType::Rsa] {
            let key = Key::generate(key_type).unwrap();
            let fp1 = key.fingerprint();
            let recovered = Key::unmarshal(&key.marshal_all().unwrap()).unwrap();
            assert_eq!(fp1, recovered.fingerprint());
        }
    }

    #[test]
    fn cross_algorithm_signature_is_rejected() {
        let key = Key::generate(KeyType::Ed25519).unwrap();
        let other = Key::generate(KeyType::EcPrime256v1).unwrap();
        let sig = other.sign(b"msg").unwrap();
        assert!(key.verify(b"msg", &sig).is_err());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = Key::generate(KeyType::Rsa).unwrap();
        let sig = key.sign(b"original").unwrap();
        assert!(key.verify(b"tampered", &sig).is_err());
    }
}
