//! Inbound request payloads and their field constraints.
//!
//! Every endpoint maps to exactly one [`Route`], and every route decodes into
//! one [`AuthRequest`] variant. Validation runs before any lookup or write and
//! stops at the first failing field.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{ProjectId, ProjectName, ProjectSecret, Username};

/// Maximum length of identifiers and display names, in characters.
pub const MAX_NAME_LEN: usize = 16;
/// Password length bounds, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 64;

/// A client-fault validation failure. The message is safe to return verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Field-level validation capability shared by all request payloads.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::new(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// Body of `/create_project`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewProjectRequest {
    pub project_name: String,
    pub project_id: String,
}

impl NewProjectRequest {
    pub fn project_id(&self) -> ProjectId {
        ProjectId::new(self.project_id.as_str())
    }

    pub fn project_name(&self) -> ProjectName {
        ProjectName::new(self.project_name.as_str())
    }
}

impl Validate for NewProjectRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("projectName", &self.project_name, 1, MAX_NAME_LEN)?;
        check_length("projectId", &self.project_id, 1, MAX_NAME_LEN)
    }
}

/// Project credentials embedded in user-level requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectCredentials {
    pub project_id: String,
    pub project_secret: String,
}

impl ProjectCredentials {
    pub fn project_id(&self) -> ProjectId {
        ProjectId::new(self.project_id.as_str())
    }

    pub fn project_secret(&self) -> ProjectSecret {
        ProjectSecret::new(self.project_secret.as_str())
    }
}

impl Validate for ProjectCredentials {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("projectId", &self.project_id, 1, MAX_NAME_LEN)
    }
}

/// Body of `/register` and `/fetch_token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRequest {
    pub username: String,
    pub user_pass: String,
    #[serde(flatten)]
    pub project: ProjectCredentials,
}

impl UserRequest {
    pub fn username(&self) -> Username {
        Username::new(self.username.as_str())
    }
}

impl Validate for UserRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("username", &self.username, 1, MAX_NAME_LEN)?;
        check_length("userPass", &self.user_pass, MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)?;
        self.project.validate()
    }
}

/// Body of `/refresh_token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshTokenRequest {
    #[serde(flatten)]
    pub project: ProjectCredentials,
    pub refresh_token: String,
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.project.validate()
    }
}

/// The endpoints served by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    CreateProject,
    Register,
    PublicKeySet,
    FetchToken,
    RefreshToken,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::CreateProject,
        Route::Register,
        Route::PublicKeySet,
        Route::FetchToken,
        Route::RefreshToken,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::CreateProject => "/create_project",
            Route::Register => "/register",
            Route::PublicKeySet => "/jwk",
            Route::FetchToken => "/fetch_token",
            Route::RefreshToken => "/refresh_token",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|r| r.path() == path)
    }
}

/// A decoded inbound request, one variant per route.
#[derive(Debug, Clone)]
pub enum AuthRequest {
    CreateProject(NewProjectRequest),
    Register(UserRequest),
    PublicKeySet,
    FetchToken(UserRequest),
    RefreshToken(RefreshTokenRequest),
}

impl AuthRequest {
    /// Decode the JSON body for a route. Does not validate.
    pub fn parse(route: Route, body: &[u8]) -> Result<Self, ValidationError> {
        fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ValidationError> {
            serde_json::from_slice(body)
                .map_err(|_| ValidationError::new("request body is not valid JSON"))
        }

        Ok(match route {
            Route::CreateProject => AuthRequest::CreateProject(decode(body)?),
            Route::Register => AuthRequest::Register(decode(body)?),
            Route::PublicKeySet => AuthRequest::PublicKeySet,
            Route::FetchToken => AuthRequest::FetchToken(decode(body)?),
            Route::RefreshToken => AuthRequest::RefreshToken(decode(body)?),
        })
    }

    pub fn route(&self) -> Route {
        match self {
            AuthRequest::CreateProject(_) => Route::CreateProject,
            AuthRequest::Register(_) => Route::Register,
            AuthRequest::PublicKeySet => Route::PublicKeySet,
            AuthRequest::FetchToken(_) => Route::FetchToken,
            AuthRequest::RefreshToken(_) => Route::RefreshToken,
        }
    }
}

impl Validate for AuthRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            AuthRequest::CreateProject(r) => r.validate(),
            AuthRequest::Register(r) | AuthRequest::FetchToken(r) => r.validate(),
            AuthRequest::PublicKeySet => Ok(()),
            AuthRequest::RefreshToken(r) => r.validate(),
        }
    }
}
