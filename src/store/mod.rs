//! Credential persistence.
//!
//! [`CredentialStore`] is the contract the issuer depends on; it owns the
//! uniqueness rules (one project per `project_id`, one user per
//! `(project_id, username)`) and the project → user cascade. The shipped
//! implementation is [`SurrealCredentialStore`].

mod connection;
mod surreal;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PasswordDigest, ProjectId, ProjectName, ProjectSecret, UserId, Username};

pub use connection::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use surreal::SurrealCredentialStore;

/// A tenant. Serialized as the create-project response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: ProjectId,
    pub project_name: ProjectName,
    pub secret: ProjectSecret,
}

/// A user registered under a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable id, also the password salt.
    pub id: UserId,
    pub username: Username,
    pub password_digest: PasswordDigest,
    pub project_id: ProjectId,
}

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0} already exists")]
    DuplicateKey(&'static str),

    #[error("record not found")]
    NotFound,

    /// Infrastructure fault. The detail is for logs only.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Boxed future returned by [`CredentialStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence contract for projects and users.
///
/// Implementations must be safe to share across concurrent requests and must
/// not hold in-process locks across I/O.
pub trait CredentialStore: Send + Sync {
    /// Insert a project. Fails with `DuplicateKey` if the id is taken.
    fn create_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()>;

    fn get_project<'a>(&'a self, project_id: &'a ProjectId) -> StoreFuture<'a, Project>;

    /// Replace a project's name and secret. The id is immutable.
    fn update_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()>;

    /// Remove a project and every user registered under it.
    fn delete_project<'a>(&'a self, project_id: &'a ProjectId) -> StoreFuture<'a, ()>;

    /// Insert a user. Fails with `DuplicateKey` if `(project_id, username)`
    /// is taken.
    fn create_user<'a>(&'a self, user: &'a User) -> StoreFuture<'a, ()>;

    fn get_user_by_credentials<'a>(
        &'a self,
        project_id: &'a ProjectId,
        username: &'a Username,
    ) -> StoreFuture<'a, User>;

    /// Replace a user's username and digest, keyed by user id.
    fn update_user<'a>(&'a self, user: &'a User) -> StoreFuture<'a, ()>;

    fn delete_user<'a>(&'a self, user_id: &'a UserId) -> StoreFuture<'a, ()>;
}
