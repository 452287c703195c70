// Core modules
pub mod config;
pub mod envelope;
pub mod keys;
pub mod password;
pub mod store;
pub mod types;
pub mod validation;

// Request handling
pub mod api;
pub mod issuer;

// Re-export key types and functions
pub use config::AuthorityConfig;
pub use envelope::{ApiResponse, StatusCode};
pub use issuer::{IssueError, TokenIssuer, TokenResponse};
pub use keys::{KeyError, KeySet};
pub use password::{HashCost, PasswordHasher};
pub use store::{
    CredentialStore, DatabaseConfig, Project, SurrealCredentialStore, User, create_connection,
    ensure_schema,
};

use anyhow::{Context, Result};
use std::sync::Arc;

/// Convenience function to create a fully configured token issuer.
///
/// Loads and checks the signing keypair, connects to the database and
/// defines the schema. Any failure here is fatal to startup.
pub async fn create_issuer(config: &AuthorityConfig) -> Result<Arc<TokenIssuer>> {
    let key_id = config.key_id()?;
    let (private_key, public_key) = config.key_paths()?;
    let keys = KeySet::load(key_id, private_key, public_key).context("cannot load signing keys")?;

    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;
    let store = SurrealCredentialStore::new(db);

    let hasher = PasswordHasher::new(config.hash_cost)?;

    let issuer = TokenIssuer::new(Arc::new(store), Arc::new(keys), config.issuer.clone())
        .with_hasher(hasher)
        .with_timeout(config.request_timeout());

    Ok(Arc::new(issuer))
}
