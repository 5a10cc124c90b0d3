//! Courier - mailing service entry point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier_common::config::{Config, LoggingConfig};
use courier_common::types::{EmailAddress, MailingId, Permission};
use courier_core::{
    DispatchError, DispatchOutcome, EntityCaches, MailTransport, MailingManager, SmtpMailer,
};
use courier_storage::models::CreateUser;
use courier_storage::Repositories;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Courier - mailing lists, messages and scheduled mailings")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "COURIER_CONFIG", default_value = "courier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and serve the web UI
    Serve,
    /// Dispatch one mailing now
    Send {
        mailing_id: MailingId,
    },
    /// Create an active superuser
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "COURIER_SUPERUSER_PASSWORD")]
        password: String,
    },
    /// Give a user one of the extra permissions
    Grant {
        #[arg(long)]
        email: String,
        #[arg(long)]
        permission: Permission,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_logging(&config.logging);
    info!(config_file = ?cli.config, "Configuration loaded");

    let repos = Repositories::connect(&config.database).await?;

    match cli.command {
        Command::Serve => serve(config, repos).await,
        Command::Send { mailing_id } => send(&config, repos, mailing_id).await,
        Command::CreateSuperuser { email, password } => {
            create_superuser(repos, &email, &password).await
        }
        Command::Grant { email, permission } => grant(repos, &email, permission).await,
    }
}

async fn serve(config: Config, repos: Repositories) -> Result<()> {
    info!("Starting Courier...");
    let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailer::new(&config.smtp)?);
    let cleanup_handle =
        courier_web::spawn_session_cleanup(repos.clone(), courier_web::SESSION_CLEANUP_INTERVAL);
    let state = courier_web::AppState::new(config, repos, transport)?;

    let result = courier_web::run(state).await;
    cleanup_handle.abort();
    result?;
    info!("Courier shutdown complete");
    Ok(())
}

async fn send(config: &Config, repos: Repositories, mailing_id: MailingId) -> Result<()> {
    let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailer::new(&config.smtp)?);
    let manager = MailingManager::new(
        repos,
        transport,
        config.smtp.from_address.clone(),
        Arc::new(EntityCaches::from_config(&config.cache)),
    );

    let report = match manager.dispatch(mailing_id).await {
        Ok(DispatchOutcome::Sent(report)) => report,
        Ok(DispatchOutcome::Blocked) => bail!("Mailing {} is blocked", mailing_id),
        Ok(DispatchOutcome::AlreadyDispatched(status)) => bail!(
            "Mailing {} cannot be sent: status is {}, expected created",
            mailing_id,
            status
        ),
        Err(DispatchError::NotFound(_)) => bail!("Mailing {} does not exist", mailing_id),
        Err(e) => return Err(e.into()),
    };

    println!(
        "Mailing {}: {} attempted, {} succeeded, {} failed, status {}",
        report.mailing_id, report.attempted, report.succeeded, report.failed, report.status
    );
    Ok(())
}

async fn create_superuser(repos: Repositories, email: &str, password: &str) -> Result<()> {
    let email = EmailAddress::parse(email)
        .with_context(|| format!("Invalid email address: {}", email))?;
    if password.chars().count() < 8 {
        bail!("Password must be at least 8 characters long");
    }

    let user = repos
        .users
        .create(CreateUser {
            email: email.to_string(),
            username: None,
            password_hash: courier_web::auth::hash_password(password)?,
            phone_number: None,
            country: None,
            is_superuser: true,
        })
        .await?;

    info!(user_id = %user.id, "Superuser created");
    println!("Superuser {} created", user.email);
    Ok(())
}

async fn grant(repos: Repositories, email: &str, permission: Permission) -> Result<()> {
    let user = repos
        .users
        .get_by_email(email)
        .await?
        .with_context(|| format!("No user with email {}", email))?;

    repos.users.grant_permission(user.id, permission).await?;
    info!(user_id = %user.id, %permission, "Permission granted");
    println!("Granted {} to {}", permission, user.email);
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},courier=debug", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_send() {
        let id = uuid::Uuid::new_v4();
        let cli = Cli::try_parse_from(["courier", "send", &id.to_string()]).unwrap();
        assert_eq!(cli.config, PathBuf::from("courier.toml"));
        assert!(matches!(cli.command, Command::Send { mailing_id } if mailing_id == id));

        assert!(Cli::try_parse_from(["courier", "send", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_parse_grant() {
        let cli = Cli::try_parse_from([
            "courier",
            "--config",
            "/etc/courier.toml",
            "grant",
            "--email",
            "mod@example.com",
            "--permission",
            "block_mailings",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/courier.toml"));
        match cli.command {
            Command::Grant { email, permission } => {
                assert_eq!(email, "mod@example.com");
                assert_eq!(permission, Permission::BlockMailings);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from([
            "courier",
            "grant",
            "--email",
            "mod@example.com",
            "--permission",
            "everything",
        ])
        .is_err());
    }
}
