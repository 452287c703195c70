//! Signing key management.
//!
//! A [`KeySet`] holds the one active RS256 keypair. It is loaded once at
//! startup, verified, and then shared read-only (behind an `Arc`) by every
//! request. Rotating keys means building a new `KeySet` and swapping the
//! whole value; nothing inside it is mutable.

pub mod jwk;

use std::fs;
use std::path::{Path, PathBuf};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::info;

use crate::types::{CompactToken, KeyId};
pub use jwk::{Jwk, JwkSet, RS256};

/// Errors raised while loading or verifying the signing keypair.
///
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("cannot read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("key id must not be empty")]
    EmptyKeyId,

    #[error("private and public keys do not form a pair")]
    Mismatch,

    #[error("cannot encode key-set document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to produce a signature for a claim set.
#[derive(Debug, Error)]
#[error("failed to sign claims: {0}")]
pub struct SignError(#[from] jsonwebtoken::errors::Error);

/// Claim set used by the startup pairing check.
#[derive(Serialize, Deserialize)]
struct PairingProbe {
    nonce: String,
}

/// The active signing keypair plus its published form.
#[derive(Clone)]
pub struct KeySet {
    key_id: KeyId,
    encoding_key: EncodingKey,
    jwk: Jwk,
    document: Vec<u8>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("key_id", &self.key_id)
            .field("jwk", &self.jwk)
            .finish_non_exhaustive()
    }
}

impl KeySet {
    /// Load the keypair from PEM files.
    pub fn load(
        key_id: KeyId,
        private_key_path: &Path,
        public_key_path: &Path,
    ) -> Result<Self, KeyError> {
        let private_pem = read_key_file(private_key_path)?;
        let public_pem = read_key_file(public_key_path)?;

        let keys = Self::from_pem(key_id, &private_pem, &public_pem)?;
        info!(
            "loaded key pair kid={} thumbprint={}",
            keys.key_id,
            keys.jwk.thumbprint()
        );
        Ok(keys)
    }

    /// Build a key set from PEM-encoded keys.
    ///
    /// The private key may be PKCS#1 or PKCS#8, the public key PKCS#1 or
    /// SubjectPublicKeyInfo. The pair is checked by signing a random probe
    /// and verifying it against the key rebuilt from the published JWK.
    pub fn from_pem(
        key_id: KeyId,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, KeyError> {
        if key_id.as_str().trim().is_empty() {
            return Err(KeyError::EmptyKeyId);
        }

        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;

        let public_key = parse_public_key(public_pem)?;
        let jwk = Jwk::from_rsa_public_key(key_id.clone(), &public_key);
        let document = serde_json::to_vec(&JwkSet {
            keys: vec![jwk.clone()],
        })?;

        let keys = Self {
            key_id,
            encoding_key,
            jwk,
            document,
        };
        keys.verify_pairing()?;

        Ok(keys)
    }

    fn verify_pairing(&self) -> Result<(), KeyError> {
        let probe = PairingProbe {
            nonce: uuid::Uuid::new_v4().to_string(),
        };
        let token = self.sign(&probe).map_err(|_| KeyError::Mismatch)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let decoded = decode::<PairingProbe>(token.as_str(), &self.decoding_key()?, &validation)
            .map_err(|_| KeyError::Mismatch)?;

        if decoded.claims.nonce != probe.nonce {
            return Err(KeyError::Mismatch);
        }
        Ok(())
    }

    /// The explicit identifier of this key.
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// The public key in JWK form.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// The serialized key-set document, computed once at construction.
    ///
    /// Safe to serve without authentication.
    pub fn public_key_set_document(&self) -> &[u8] {
        &self.document
    }

    /// Verification key matching this signing key.
    pub fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        self.jwk.decoding_key()
    }

    /// Sign a claim set as an RS256 compact token carrying this key's `kid`.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<CompactToken, SignError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.to_string());

        let token = encode(&header, claims, &self.encoding_key)?;
        Ok(CompactToken::new(token))
    }

    /// Decode and validate a token issued by this key.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<T, jsonwebtoken::errors::Error> {
        let key = self
            .decoding_key()
            .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidRsaKey(self.key_id.to_string()))?;
        Ok(decode::<T>(token, &key, validation)?.claims)
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_public_key(pem: &[u8]) -> Result<RsaPublicKey, KeyError> {
    let pem = std::str::from_utf8(pem)
        .map_err(|_| KeyError::InvalidPublicKey("PEM is not valid UTF-8".to_string()))?;

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::decode_header;
    use std::io::Write;

    const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/signing.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/signing.pub.pem");
    const OTHER_PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/other.pub.pem");

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    fn test_keys() -> KeySet {
        KeySet::from_pem(KeyId::new("test-key"), PRIVATE_PEM, PUBLIC_PEM).unwrap()
    }

    #[test]
    fn test_sign_sets_header() {
        let keys = test_keys();
        let token = keys
            .sign(&TestClaims {
                sub: "user".to_string(),
                exp: 4_102_444_800,
            })
            .unwrap();

        assert_eq!(token.as_str().split('.').count(), 3);

        let header = decode_header(token.as_str()).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("test-key"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_sign_then_verify() {
        let keys = test_keys();
        let claims = TestClaims {
            sub: "user".to_string(),
            exp: 4_102_444_800,
        };
        let token = keys.sign(&claims).unwrap();

        let decoded: TestClaims = keys
            .verify(token.as_str(), &Validation::new(Algorithm::RS256))
            .unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_document_matches_token_kid() {
        let keys = test_keys();
        let token = keys
            .sign(&TestClaims {
                sub: "user".to_string(),
                exp: 4_102_444_800,
            })
            .unwrap();
        let header = decode_header(token.as_str()).unwrap();

        let doc: JwkSet = serde_json::from_slice(keys.public_key_set_document()).unwrap();
        assert_eq!(doc.keys.len(), 1);
        let kid = header.kid.unwrap();
        let jwk = doc.find(&kid).expect("published key matches token kid");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_document_has_no_private_material() {
        let keys = test_keys();
        let doc: serde_json::Value =
            serde_json::from_slice(keys.public_key_set_document()).unwrap();
        let key = doc["keys"][0].as_object().unwrap();

        let mut fields: Vec<&str> = key.keys().map(|k| k.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["alg", "e", "kid", "kty", "n"]);
    }

    #[test]
    fn test_document_is_stable() {
        let keys = test_keys();
        let first = keys.public_key_set_document().to_vec();
        assert_eq!(first, keys.public_key_set_document());
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let result = KeySet::from_pem(KeyId::new("test-key"), PRIVATE_PEM, OTHER_PUBLIC_PEM);
        assert!(matches!(result, Err(KeyError::Mismatch)));
    }

    #[test]
    fn test_malformed_private_key_rejected() {
        let result = KeySet::from_pem(KeyId::new("test-key"), b"not a key", PUBLIC_PEM);
        assert!(matches!(result, Err(KeyError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_malformed_public_key_rejected() {
        let result = KeySet::from_pem(KeyId::new("test-key"), PRIVATE_PEM, b"garbage");
        assert!(matches!(result, Err(KeyError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_empty_key_id_rejected() {
        let result = KeySet::from_pem(KeyId::new("  "), PRIVATE_PEM, PUBLIC_PEM);
        assert!(matches!(result, Err(KeyError::EmptyKeyId)));
    }

    #[test]
    fn test_load_from_files() {
        let mut private = tempfile::NamedTempFile::new().unwrap();
        private.write_all(PRIVATE_PEM).unwrap();
        let mut public = tempfile::NamedTempFile::new().unwrap();
        public.write_all(PUBLIC_PEM).unwrap();

        // The kid comes from the caller, not from the file name.
        let keys = KeySet::load(KeyId::new("explicit"), private.path(), public.path()).unwrap();
        assert_eq!(keys.key_id().as_str(), "explicit");
        assert_eq!(keys.jwk().kid.as_str(), "explicit");
    }

    #[test]
    fn test_load_missing_file() {
        let result = KeySet::load(
            KeyId::new("k"),
            Path::new("/nonexistent/private.pem"),
            Path::new("/nonexistent/public.pem"),
        );
        assert!(matches!(result, Err(KeyError::Io { .. })));
    }
}
