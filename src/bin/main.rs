use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use token_authority::{
    AuthorityConfig, CredentialStore, KeySet, Project, SurrealCredentialStore, create_issuer,
    issuer::generate_secret,
    validation::{NewProjectRequest, Validate},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "token-authority")]
#[command(about = "Project credential and RS256 token authority")]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, env = "AUTHORITY_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Create a project and print its secret
    CreateProject {
        /// Project identifier, 1-16 characters
        #[arg(long)]
        id: String,
        /// Display name, 1-16 characters
        #[arg(long)]
        name: String,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Print the public key-set document
    Jwk,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output such as `jwk`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("token_authority=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AuthorityConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, db_url } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(url) = db_url {
                config.database.url = url;
            }
            info!("Using database url for server: {}", config.database.url);

            let issuer = create_issuer(&config).await?;
            let app = token_authority::api::create_router(issuer);

            let listener = tokio::net::TcpListener::bind(&config.bind)
                .await
                .with_context(|| format!("cannot bind {}", config.bind))?;
            info!("Token authority listening on http://{}", config.bind);

            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            if let Some(url) = db_url {
                config.database.url = url;
            }
            info!("Using database url for initialization: {}", config.database.url);

            info!("Initializing database...");
            let db = token_authority::create_connection(config.database).await?;
            token_authority::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateProject { id, name, db_url } => {
            if let Some(url) = db_url {
                config.database.url = url;
            }

            let request = NewProjectRequest {
                project_name: name,
                project_id: id,
            };
            request.validate()?;

            let db = token_authority::create_connection(config.database).await?;
            token_authority::ensure_schema(&db).await?;
            let store = SurrealCredentialStore::new(db);

            let project = Project {
                project_id: request.project_id(),
                project_name: request.project_name(),
                secret: generate_secret(),
            };
            store.create_project(&project).await?;

            println!("Project created successfully!");
            println!();
            println!("  Id:      {}", project.project_id);
            println!("  Name:    {}", project.project_name);
            println!("  Secret:  {}", project.secret);
            println!();
            println!("IMPORTANT: Save this secret now. It cannot be retrieved later.");
        }
        Commands::Jwk => {
            let key_id = config.key_id()?;
            let (private_key, public_key) = config.key_paths()?;
            let keys = KeySet::load(key_id, private_key, public_key)?;

            println!("{}", String::from_utf8_lossy(keys.public_key_set_document()));
        }
    }

    Ok(())
}
