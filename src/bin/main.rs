use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use header_auth::auth::{generate_token_key, hash_password};
use header_auth::{
    DatabaseConfig, HeaderAuthConfig, IdentityStore, NewAdmin, NewUser, SurrealIdentityStore,
    TokenConfig, Username, build_app, create_connection, create_state, ensure_schema, serve,
};

#[derive(Parser)]
#[command(name = "header-auth")]
#[command(about = "Identity service with reverse-proxy header authentication")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server. Header auth settings come from the environment.
    Serve {
        /// Bind address, e.g. 0.0.0.0:8090
        #[arg(long, default_value = "127.0.0.1:8090")]
        bind: String,
        #[arg(long, env = "HEADER_AUTH_DB_URL", default_value = "memory")]
        db_url: String,
        /// Application secret for session tokens (random if omitted)
        #[arg(long, env = "HEADER_AUTH_TOKEN_SECRET")]
        token_secret: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "HEADER_AUTH_DB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create an administrator
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, env = "HEADER_AUTH_DB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create a user with a password
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Defaults to a free variant of the email's local part
        #[arg(long)]
        username: Option<String>,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, env = "HEADER_AUTH_DB_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("header_auth=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            token_secret,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for server: {}", db_config.url);

            let secret = match token_secret {
                Some(secret) if !secret.is_empty() => secret,
                _ => {
                    warn!("No token secret configured; tokens will not survive a restart");
                    generate_token_key().into_inner()
                }
            };
            let token_config = TokenConfig {
                secret,
                ..Default::default()
            };

            let state = create_state(db_config, token_config).await?;
            let app = build_app(state, HeaderAuthConfig::from_env());

            serve(&bind, app).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = create_connection(db_config).await?;
            ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateAdmin {
            email,
            password,
            db_url,
        } => {
            let store = open_store(db_url).await?;

            let admin = store
                .create_admin(&NewAdmin {
                    email,
                    token_key: generate_token_key(),
                    password_hash: hash_password(&password)?,
                })
                .await?;

            println!("Admin created successfully!");
            println!();
            println!("  Id:     {}", admin.id);
            println!("  Email:  {}", admin.email);
        }
        Commands::CreateUser {
            email,
            password,
            username,
            name,
            db_url,
        } => {
            let store = open_store(db_url).await?;

            let username = match username {
                Some(username) => Username::new(username),
                None => {
                    let Some((local, _)) = email.split_once('@') else {
                        bail!("'{}' is not an email address", email);
                    };
                    store.suggest_unique_username(local).await?
                }
            };

            let user = store
                .create_user(&NewUser {
                    email,
                    verified: true,
                    username,
                    name,
                    token_key: generate_token_key(),
                    password_hash: hash_password(&password)?,
                    ..Default::default()
                })
                .await?;

            println!("User created successfully!");
            println!();
            println!("  Id:        {}", user.id);
            println!("  Email:     {}", user.email);
            println!("  Username:  {}", user.username);
        }
    }

    Ok(())
}

async fn open_store(db_url: String) -> Result<SurrealIdentityStore> {
    let db_config = DatabaseConfig {
        url: db_url,
        ..Default::default()
    };
    if db_config.url == "memory" {
        warn!("Using the in-memory database; the record is lost when this command exits");
    }

    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;
    Ok(SurrealIdentityStore::new(db))
}
