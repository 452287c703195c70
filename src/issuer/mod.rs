//! Credential checks and token issuance.
//!
//! Each operation walks the same stages:
//!
//! ```text
//! Received → Validated → ProjectVerified → UserAuthenticated → Signed → Responded
//! ```
//!
//! and can leave for `Failed` from any of them. The stage reached is logged
//! with every failure. Nothing here is retried; callers own retry policy.
//!
//! Store calls, password hashing and signing are each bounded by the
//! request timeout. Hashing and signing run on the blocking pool so a slow
//! KDF never stalls the async workers.

mod claims;
mod refresh;

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::envelope::ApiResponse;
use crate::keys::{KeySet, SignError};
use crate::password::{HashError, PasswordHasher, constant_time_eq};
use crate::store::{CredentialStore, Project, StoreError, StoreFuture, User};
use crate::types::{CompactToken, PasswordDigest, ProjectId, ProjectSecret, UserId};
use crate::validation::{
    NewProjectRequest, ProjectCredentials, RefreshTokenRequest, UserRequest, Validate,
    ValidationError,
};

pub use claims::{Claims, Clock, FixedClock, SystemClock, TOKEN_TTL_SECONDS};
pub use refresh::{RefreshDisabled, RefreshError, RefreshFuture, RefreshGrant};

/// Default bound on each store, hashing and signing call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of generated project secrets.
pub const SECRET_LEN: usize = 32;

/// Salt used to burn hashing time when a username does not exist.
const DUMMY_SALT: &str = "00000000-0000-0000-0000-000000000000";

const INVALID_PROJECT: &str = "invalid project credentials";
const INVALID_USER: &str = "invalid username or password";

/// Progress of a request through the issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    ProjectVerified,
    UserAuthenticated,
    Signed,
    Responded,
}

/// Payload of `/fetch_token` and `/refresh_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: CompactToken,
}

/// Why a request could not be served.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} already exists")]
    DuplicateKey(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} credentials do not match")]
    CredentialMismatch(&'static str),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Hashing(#[from] HashError),

    #[error("operation timed out")]
    Timeout,

    #[error("blocking task failed: {0}")]
    Task(String),
}

impl IssueError {
    /// Whether the caller caused this failure.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            IssueError::Validation(_)
                | IssueError::DuplicateKey(_)
                | IssueError::NotFound(_)
                | IssueError::CredentialMismatch(_)
                | IssueError::Refresh(_)
        )
    }

    /// Map onto the wire envelope.
    ///
    /// A missing project and a wrong secret produce the same response, as do
    /// a missing user and a wrong password. Infrastructure detail never
    /// reaches the caller.
    pub fn into_response(self) -> ApiResponse {
        match self {
            IssueError::Validation(e) => ApiResponse::validation_failed(e.message()),
            IssueError::DuplicateKey(entity) => {
                ApiResponse::bad_request(format!("{} already exists", entity))
            }
            IssueError::NotFound("user") | IssueError::CredentialMismatch("user") => {
                ApiResponse::bad_request(INVALID_USER)
            }
            IssueError::NotFound(_) | IssueError::CredentialMismatch(_) => {
                ApiResponse::bad_request(INVALID_PROJECT)
            }
            IssueError::Refresh(e) => ApiResponse::bad_request(e.to_string()),
            IssueError::Store(_)
            | IssueError::Sign(_)
            | IssueError::Hashing(_)
            | IssueError::Timeout
            | IssueError::Task(_) => ApiResponse::server_error("server error"),
        }
    }
}

/// Generate a project secret from the OS CSPRNG.
pub fn generate_secret() -> ProjectSecret {
    let secret: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    ProjectSecret::new(secret)
}

/// The token authority: verifies credentials and signs tokens.
///
/// Cheap to share behind an `Arc`; holds no mutable state.
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    keys: Arc<KeySet>,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
    refresh: Arc<dyn RefreshGrant>,
    issuer: String,
    timeout: Duration,
}

impl TokenIssuer {
    /// Create an issuer with the default hasher, wall clock, a disabled
    /// refresh grant and the default timeout.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        keys: Arc<KeySet>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            keys,
            hasher: PasswordHasher::default(),
            clock: Arc::new(SystemClock),
            refresh: Arc::new(RefreshDisabled),
            issuer: issuer.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_grant(mut self, grant: Arc<dyn RefreshGrant>) -> Self {
        self.refresh = grant;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured `iss` value.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_set(&self) -> &KeySet {
        &self.keys
    }

    /// The published key-set document. No authentication applies.
    pub fn public_key_set_document(&self) -> &[u8] {
        self.keys.public_key_set_document()
    }

    /// Create a project with a freshly generated secret.
    ///
    /// The returned record is the only place the secret is ever revealed.
    pub async fn create_project(&self, req: NewProjectRequest) -> Result<Project, IssueError> {
        let mut stage = Stage::Received;
        let result = self.create_project_inner(req, &mut stage).await;
        finish("create_project", stage, result)
    }

    /// Register a user under a project whose credentials the caller holds.
    pub async fn register(&self, req: UserRequest) -> Result<(), IssueError> {
        let mut stage = Stage::Received;
        let result = self.register_inner(req, &mut stage).await;
        finish("register", stage, result)
    }

    /// Authenticate a user and sign an access token for them.
    pub async fn fetch_token(&self, req: UserRequest) -> Result<TokenResponse, IssueError> {
        let mut stage = Stage::Received;
        let result = self.fetch_token_inner(req, &mut stage).await;
        finish("fetch_token", stage, result)
    }

    /// Exchange a refresh token for a new access token via the configured
    /// [`RefreshGrant`].
    pub async fn refresh_token(
        &self,
        req: RefreshTokenRequest,
    ) -> Result<TokenResponse, IssueError> {
        let mut stage = Stage::Received;
        let result = self.refresh_token_inner(req, &mut stage).await;
        finish("refresh_token", stage, result)
    }

    async fn create_project_inner(
        &self,
        req: NewProjectRequest,
        stage: &mut Stage,
    ) -> Result<Project, IssueError> {
        req.validate()?;
        *stage = Stage::Validated;

        let project_id = req.project_id();
        match self
            .bounded("project", self.store.get_project(&project_id))
            .await
        {
            Ok(_) => return Err(IssueError::DuplicateKey("project")),
            Err(IssueError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        *stage = Stage::ProjectVerified;

        let project = Project {
            project_id,
            project_name: req.project_name(),
            secret: generate_secret(),
        };
        self.bounded("project", self.store.create_project(&project))
            .await?;

        info!("project has been created: {}", project.project_id);
        Ok(project)
    }

    async fn register_inner(&self, req: UserRequest, stage: &mut Stage) -> Result<(), IssueError> {
        req.validate()?;
        *stage = Stage::Validated;

        let project = self.verify_project(&req.project).await?;
        *stage = Stage::ProjectVerified;

        // Only the digest is ever handed to the store.
        let username = req.username();
        let id = UserId::generate();
        let password_digest = self.digest(req.user_pass, id.clone()).await?;
        let user = User {
            id,
            username,
            password_digest,
            project_id: project.project_id,
        };
        // Not-found here means the project was deleted after it was verified.
        self.bounded("project", self.store.create_user(&user)).await?;

        info!(
            "new user has been created in project {}, id: {}",
            user.project_id, user.id
        );
        Ok(())
    }

    async fn fetch_token_inner(
        &self,
        req: UserRequest,
        stage: &mut Stage,
    ) -> Result<TokenResponse, IssueError> {
        req.validate()?;
        *stage = Stage::Validated;

        let project = self.verify_project(&req.project).await?;
        *stage = Stage::ProjectVerified;

        let username = req.username();
        let user = match self
            .bounded(
                "user",
                self.store
                    .get_user_by_credentials(&project.project_id, &username),
            )
            .await
        {
            Ok(user) => user,
            Err(IssueError::NotFound(entity)) => {
                self.digest(req.user_pass, UserId::new(DUMMY_SALT)).await?;
                return Err(IssueError::NotFound(entity));
            }
            Err(e) => return Err(e),
        };

        if !self.verify_password(req.user_pass, &user).await? {
            return Err(IssueError::CredentialMismatch("user"));
        }
        *stage = Stage::UserAuthenticated;

        let token = self.sign_for(&project.project_id, &user.id).await?;
        *stage = Stage::Signed;

        Ok(TokenResponse { token })
    }

    async fn refresh_token_inner(
        &self,
        req: RefreshTokenRequest,
        stage: &mut Stage,
    ) -> Result<TokenResponse, IssueError> {
        req.validate()?;
        *stage = Stage::Validated;

        let project = self.verify_project(&req.project).await?;
        *stage = Stage::ProjectVerified;

        let exchange = self.refresh.exchange(&project, &req.refresh_token);
        let subject = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| IssueError::Timeout)??;
        *stage = Stage::UserAuthenticated;

        let token = self.sign_for(&project.project_id, &subject).await?;
        *stage = Stage::Signed;

        Ok(TokenResponse { token })
    }

    /// Look up the project and compare its secret in constant time.
    async fn verify_project(&self, creds: &ProjectCredentials) -> Result<Project, IssueError> {
        let project_id = creds.project_id();
        let project = self
            .bounded("project", self.store.get_project(&project_id))
            .await?;

        if !constant_time_eq(project.secret.as_str(), &creds.project_secret) {
            return Err(IssueError::CredentialMismatch("project"));
        }
        Ok(project)
    }

    async fn digest(
        &self,
        cleartext: String,
        salt: UserId,
    ) -> Result<PasswordDigest, IssueError> {
        let hasher = self.hasher.clone();
        Ok(self
            .blocking(move || hasher.digest(&cleartext, &salt))
            .await??)
    }

    async fn verify_password(&self, cleartext: String, user: &User) -> Result<bool, IssueError> {
        let hasher = self.hasher.clone();
        let salt = user.id.clone();
        let stored = user.password_digest.clone();
        Ok(self
            .blocking(move || hasher.verify(&cleartext, &salt, &stored))
            .await??)
    }

    async fn sign_for(
        &self,
        audience: &ProjectId,
        subject: &UserId,
    ) -> Result<CompactToken, IssueError> {
        let claims = Claims::new(&self.issuer, audience, subject, self.clock.now());
        let keys = Arc::clone(&self.keys);
        Ok(self.blocking(move || keys.sign(&claims)).await??)
    }

    /// Run a store call under the request timeout, attaching the entity name
    /// to not-found failures.
    async fn bounded<T>(
        &self,
        entity: &'static str,
        fut: StoreFuture<'_, T>,
    ) -> Result<T, IssueError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Err(_) => Err(IssueError::Timeout),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::NotFound)) => Err(IssueError::NotFound(entity)),
            Ok(Err(StoreError::DuplicateKey(key))) => Err(IssueError::DuplicateKey(key)),
            Ok(Err(e)) => Err(IssueError::Store(e)),
        }
    }

    /// Run CPU-bound work on the blocking pool under the request timeout.
    async fn blocking<T, F>(&self, f: F) -> Result<T, IssueError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f)).await {
            Err(_) => Err(IssueError::Timeout),
            Ok(Err(e)) => Err(IssueError::Task(e.to_string())),
            Ok(Ok(value)) => Ok(value),
        }
    }
}

fn finish<T>(
    operation: &'static str,
    stage: Stage,
    result: Result<T, IssueError>,
) -> Result<T, IssueError> {
    match &result {
        Ok(_) => debug!(operation, stage = ?Stage::Responded, "request completed"),
        Err(e) if e.is_client_fault() => {
            info!(operation, stage = ?stage, "request rejected: {}", e)
        }
        Err(e) => error!(operation, stage = ?stage, "request failed: {}", e),
    }
    result
}
