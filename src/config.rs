use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::password::HashCost;
use crate::store::DatabaseConfig;
use crate::types::KeyId;

pub const DEFAULT_ISSUER: &str = "token-authority";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration of the authority.
///
/// Read from the JSON file named by `AUTHORITY_CONFIG` when present. Any
/// field the file leaves out falls back to its environment variable, then to
/// the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// `iss` claim of every token
    pub issuer: String,
    /// Explicit `kid` of the signing key
    pub key_id: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub bind: String,
    pub request_timeout_ms: u64,
    pub hash_cost: HashCost,
    pub database: DatabaseConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            issuer: env::var("AUTHORITY_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string()),
            key_id: env::var("AUTHORITY_KEY_ID").ok(),
            private_key_path: env::var("AUTHORITY_PRIVATE_KEY").ok().map(PathBuf::from),
            public_key_path: env::var("AUTHORITY_PUBLIC_KEY").ok().map(PathBuf::from),
            bind: env::var("AUTHORITY_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            request_timeout_ms: env::var("AUTHORITY_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            hash_cost: HashCost::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AuthorityConfig {
    /// Load from `path`, or from `AUTHORITY_CONFIG`, or from the environment
    /// alone when neither names a file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var("AUTHORITY_CONFIG").ok().map(PathBuf::from),
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse a JSON document, expanding `${VAR}` references first.
    pub fn from_json(raw: &str) -> Result<Self> {
        let expanded = expand_env_vars(raw);
        Ok(serde_json::from_str(&expanded)?)
    }

    /// The signing key id. Never derived from the key file name.
    pub fn key_id(&self) -> Result<KeyId> {
        match self.key_id.as_deref().map(str::trim) {
            Some(kid) if !kid.is_empty() => Ok(KeyId::new(kid)),
            _ => Err(anyhow::anyhow!(
                "signing key id is not configured (set AUTHORITY_KEY_ID or `key_id`)"
            )),
        }
    }

    /// Paths to the private and public PEM files.
    pub fn key_paths(&self) -> Result<(&Path, &Path)> {
        let private = self
            .private_key_path
            .as_deref()
            .context("private key path is not configured (set AUTHORITY_PRIVATE_KEY)")?;
        let public = self
            .public_key_path
            .as_deref()
            .context("public key path is not configured (set AUTHORITY_PUBLIC_KEY)")?;
        Ok((private, public))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Replace `${NAME}` with the value of `NAME`. Unset variables and an
/// unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open..];

        let Some(close) = reference.find('}') else {
            out.push_str(reference);
            return out;
        };
        match env::var(&reference[2..close]) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&reference[..=close]),
        }
        rest = &reference[close + 1..];
    }

    out.push_str(rest);
    out
}
