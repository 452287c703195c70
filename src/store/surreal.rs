//! SurrealDB-backed credential store.

use serde::Deserialize;
use tracing::debug;

use super::{CredentialStore, Db, Project, StoreError, StoreFuture, User};
use crate::types::{ProjectId, UserId, Username};

/// Row shape of the `project` table.
#[derive(Debug, Deserialize)]
struct ProjectRow {
    project_id: String,
    project_name: String,
    secret: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            project_id: row.project_id.into(),
            project_name: row.project_name.into(),
            secret: row.secret.into(),
        }
    }
}

/// Row shape of the `user` table.
#[derive(Debug, Deserialize)]
struct UserRow {
    user_id: String,
    username: String,
    password_digest: String,
    project_id: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.user_id.into(),
            username: row.username.into(),
            password_digest: row.password_digest.into(),
            project_id: row.project_id.into(),
        }
    }
}

/// Credential store over a SurrealDB connection.
///
/// The handle is cheap to clone and internally pooled; no lock is taken
/// around queries.
#[derive(Clone)]
pub struct SurrealCredentialStore {
    db: Db,
}

impl SurrealCredentialStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn project_exists(&self, project_id: &ProjectId) -> Result<bool, StoreError> {
        let mut res = self
            .db
            .query("SELECT VALUE project_id FROM project WHERE project_id = $project_id LIMIT 1")
            .bind(("project_id", project_id.to_string()))
            .await?;

        let ids: Vec<String> = res.take(0)?;
        Ok(!ids.is_empty())
    }

    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        let mut res = self
            .db
            .query("SELECT VALUE user_id FROM user WHERE user_id = $user_id LIMIT 1")
            .bind(("user_id", user_id.to_string()))
            .await?;

        let ids: Vec<String> = res.take(0)?;
        Ok(!ids.is_empty())
    }
}

/// Raised inside the user insert transaction when the owning project is gone.
const MISSING_PROJECT: &str = "owning project does not exist";

fn is_duplicate(msg: &str) -> bool {
    msg.contains("already contains") || msg.contains("already exists")
}

/// Translate a failed write into a store error, recognising unique index
/// violations.
fn write_error(e: surrealdb::Error, entity: &'static str) -> StoreError {
    let msg = e.to_string();
    if is_duplicate(&msg) {
        StoreError::DuplicateKey(entity)
    } else {
        StoreError::Backend(msg)
    }
}

/// Inspect every statement of a transactional write.
///
/// A failed transaction reports the cause on one statement and a generic
/// "not executed" error on the others, so all of them are scanned.
fn check_transaction(mut res: surrealdb::Response, entity: &'static str) -> Result<(), StoreError> {
    let errors = res.take_errors();
    if errors.is_empty() {
        return Ok(());
    }

    let messages: Vec<String> = errors.into_values().map(|e| e.to_string()).collect();
    if messages.iter().any(|m| m.contains(MISSING_PROJECT)) {
        return Err(StoreError::NotFound);
    }
    if messages.iter().any(|m| is_duplicate(m)) {
        return Err(StoreError::DuplicateKey(entity));
    }
    Err(StoreError::Backend(messages.join("; ")))
}

impl CredentialStore for SurrealCredentialStore {
    fn create_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = r#"
                CREATE project CONTENT {
                    project_id: $project_id,
                    project_name: $project_name,
                    secret: $secret
                } RETURN NONE
            "#;

            self.db
                .query(query)
                .bind(("project_id", project.project_id.to_string()))
                .bind(("project_name", project.project_name.to_string()))
                .bind(("secret", project.secret.to_string()))
                .await
                .and_then(|res| res.check())
                .map_err(|e| write_error(e, "project"))?;

            debug!("stored project {}", project.project_id);
            Ok(())
        })
    }

    fn get_project<'a>(&'a self, project_id: &'a ProjectId) -> StoreFuture<'a, Project> {
        Box::pin(async move {
            let query = r#"
                SELECT project_id, project_name, secret FROM project
                WHERE project_id = $project_id
                LIMIT 1
            "#;

            let mut res = self
                .db
                .query(query)
                .bind(("project_id", project_id.to_string()))
                .await?;

            let rows: Vec<ProjectRow> = res.take(0)?;
            rows.into_iter()
                .next()
                .map(Project::from)
                .ok_or(StoreError::NotFound)
        })
    }

    fn update_project<'a>(&'a self, project: &'a Project) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.project_exists(&project.project_id).await? {
                return Err(StoreError::NotFound);
            }

            let query = r#"
                UPDATE project SET
                    project_name = $project_name,
                    secret = $secret
                WHERE project_id = $project_id
                RETURN NONE
            "#;

            self.db
                .query(query)
                .bind(("project_id", project.project_id.to_string()))
                .bind(("project_name", project.project_name.to_string()))
                .bind(("secret", project.secret.to_string()))
                .await?
                .check()?;

            Ok(())
        })
    }

    fn delete_project<'a>(&'a self, project_id: &'a ProjectId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.project_exists(project_id).await? {
                return Err(StoreError::NotFound);
            }

            let query = r#"
                BEGIN TRANSACTION;
                DELETE user WHERE project_id = $project_id;
                DELETE project WHERE project_id = $project_id;
                COMMIT TRANSACTION;
            "#;

            let res = self
                .db
                .query(query)
                .bind(("project_id", project_id.to_string()))
                .await?;
            check_transaction(res, "project")?;

            debug!("deleted project {} and its users", project_id);
            Ok(())
        })
    }

    fn create_user<'a>(&'a self, user: &'a User) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            // The project check and the insert commit together, so a user can
            // never outlive a project deleted concurrently.
            let query = format!(
                r#"
                BEGIN TRANSACTION;
                LET $owner = (SELECT VALUE project_id FROM project WHERE project_id = $project_id LIMIT 1);
                IF array::len($owner) = 0 {{
                    THROW "{missing}";
                }};
                CREATE user CONTENT {{
                    user_id: $user_id,
                    username: $username,
                    password_digest: $password_digest,
                    project_id: $project_id
                }} RETURN NONE;
                COMMIT TRANSACTION;
            "#,
                missing = MISSING_PROJECT
            );

            let res = self
                .db
                .query(query)
                .bind(("user_id", user.id.to_string()))
                .bind(("username", user.username.to_string()))
                .bind(("password_digest", user.password_digest.to_string()))
                .bind(("project_id", user.project_id.to_string()))
                .await?;
            check_transaction(res, "user")?;

            Ok(())
        })
    }

    fn get_user_by_credentials<'a>(
        &'a self,
        project_id: &'a ProjectId,
        username: &'a Username,
    ) -> StoreFuture<'a, User> {
        Box::pin(async move {
            let query = r#"
                SELECT user_id, username, password_digest, project_id FROM user
                WHERE project_id = $project_id
                  AND username = $username
                LIMIT 1
            "#;

            let mut res = self
                .db
                .query(query)
                .bind(("project_id", project_id.to_string()))
                .bind(("username", username.to_string()))
                .await?;

            let rows: Vec<UserRow> = res.take(0)?;
            rows.into_iter()
                .next()
                .map(User::from)
                .ok_or(StoreError::NotFound)
        })
    }

    fn update_user<'a>(&'a self, user: &'a User) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.user_exists(&user.id).await? {
                return Err(StoreError::NotFound);
            }

            let query = r#"
                UPDATE user SET
                    username = $username,
                    password_digest = $password_digest
                WHERE user_id = $user_id
                RETURN NONE
            "#;

            self.db
                .query(query)
                .bind(("user_id", user.id.to_string()))
                .bind(("username", user.username.to_string()))
                .bind(("password_digest", user.password_digest.to_string()))
                .await
                .and_then(|res| res.check())
                .map_err(|e| write_error(e, "user"))?;

            Ok(())
        })
    }

    fn delete_user<'a>(&'a self, user_id: &'a UserId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if !self.user_exists(user_id).await? {
                return Err(StoreError::NotFound);
            }

            self.db
                .query("DELETE user WHERE user_id = $user_id")
                .bind(("user_id", user_id.to_string()))
                .await?
                .check()?;

            Ok(())
        })
    }
}
