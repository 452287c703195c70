//! JSON Web Key model for the published signing key.
//!
//! The authority publishes exactly what a verifier needs: key type, key id,
//! algorithm and the RSA public components. Nothing private is representable
//! in these types.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::KeyError;
use crate::types::KeyId;

/// Algorithm name advertised in the JWK and in token headers.
pub const RS256: &str = "RS256";

/// A single public JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always "RSA".
    pub kty: String,
    /// Key ID, matched against the `kid` header of issued tokens.
    pub kid: KeyId,
    /// Signature algorithm, always "RS256".
    pub alg: String,
    /// RSA modulus (base64url, unpadded)
    pub n: String,
    /// RSA exponent (base64url, unpadded)
    pub e: String,
}

/// A key-set document, the body served at `/jwk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl Jwk {
    /// Build the public JWK for an RSA key.
    pub fn from_rsa_public_key(kid: KeyId, key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid,
            alg: RS256.to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }

    /// Reconstruct a verification key from the published components.
    pub fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        if self.kty != "RSA" {
            return Err(KeyError::InvalidPublicKey(format!(
                "unsupported key type {}",
                self.kty
            )));
        }

        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| KeyError::InvalidPublicKey(format!("invalid RSA components: {}", e)))
    }

    /// RFC 7638 SHA-256 thumbprint, used to fingerprint the key in logs.
    pub fn thumbprint(&self) -> String {
        // Members in lexicographic order, no whitespace.
        let canonical = format!(
            r#"{{"e":"{}","kty":"{}","n":"{}"}}"#,
            self.e, self.kty, self.n
        );
        let digest = Sha256::digest(canonical.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

impl JwkSet {
    /// Find a key by its `kid`.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_str() == kid)
    }
}
