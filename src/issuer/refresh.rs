//! Refresh-token extension point.
//!
//! No refresh protocol is defined yet: storage format, rotation and
//! revocation are undecided. The issuer only needs to know which user a
//! presented refresh token stands for; everything else lives behind
//! [`RefreshGrant`].

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::store::Project;
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("refresh tokens are not supported")]
    Unsupported,

    #[error("refresh token rejected")]
    Rejected,
}

pub type RefreshFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UserId, RefreshError>> + Send + 'a>>;

/// Exchanges a refresh token, already scoped to a verified project, for the
/// identity a new access token should carry.
pub trait RefreshGrant: Send + Sync {
    fn exchange<'a>(&'a self, project: &'a Project, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// Rejects every exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshDisabled;

impl RefreshGrant for RefreshDisabled {
    fn exchange<'a>(&'a self, _project: &'a Project, _refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(async { Err(RefreshError::Unsupported) })
    }
}
