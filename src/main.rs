use anyhow::{Context, Result};
use clap::Parser;
use coursebookd::accounts::{self, NewIdentity};
use coursebookd::config::{Cli, Command, Config};
use coursebookd::{create_app, db, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("coursebookd={level},tower_http={level}", level = log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: &Config) -> Result<()> {
    let conn = db::open_db(&config.workspace)
        .with_context(|| format!("failed to open workspace {}", config.workspace.display()))?;
    let state = AppState::new(conn, config.settings());
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen))?;

    info!(
        "coursebookd {} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        config.listen
    );

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

fn create_user(config: &Config, new: NewIdentity) -> Result<()> {
    let conn = db::open_db(&config.workspace)
        .with_context(|| format!("failed to open workspace {}", config.workspace.display()))?;
    let identity = accounts::create_identity(&conn, &new)
        .with_context(|| format!("failed to create user {}", new.username))?;
    info!(
        user = %identity.username,
        role = ?identity.role,
        superuser = identity.is_superuser,
        "created user"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.config.log_level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config).await,
        Command::CreateUser {
            username,
            password,
            first_name,
            last_name,
            role,
            superuser,
        } => create_user(
            &cli.config,
            NewIdentity {
                username,
                password,
                first_name,
                last_name,
                is_superuser: superuser,
                role,
            },
        ),
    }
}
