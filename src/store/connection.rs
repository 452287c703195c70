use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "authority".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "credentials".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables and unique indexes. Safe to run on every startup.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Projects
        "DEFINE TABLE IF NOT EXISTS project SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS project_id ON TABLE project TYPE string;
         DEFINE FIELD IF NOT EXISTS project_name ON TABLE project TYPE string;
         DEFINE FIELD IF NOT EXISTS secret ON TABLE project TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE project TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE project VALUE time::now();",

        // Users
        "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password_digest ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS project_id ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user VALUE time::now();",

        // Uniqueness
        "DEFINE INDEX IF NOT EXISTS project_id_unique ON TABLE project COLUMNS project_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_id_unique ON TABLE user COLUMNS user_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_project_username ON TABLE user COLUMNS project_id, username UNIQUE;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
