mod app;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

/// Obtain and manage OAuth2 access tokens from the command line
#[derive(Debug, Parser)]
#[command(name = "keyhandle", version, about)]
struct Cli {
    /// Path to keyhandle.toml; defaults to the platform config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a valid access token, refreshing or logging in as needed
    Token {
        /// Print the access token itself
        #[arg(long)]
        show: bool,
    },
    /// Print the userinfo claims as JSON
    User,
    /// Report whether a valid token is stored, without network access
    Status,
    /// Run the interactive login regardless of the stored token
    Login,
    /// Remove the stored token
    Logout,
    /// Print the decoded access token payload as JSON (signature not verified)
    Payload,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    debug!(path = %config_path.display(), "Using config file");

    let settings = Settings::load(&config_path).await?;
    let handler = app::build_handler(&settings, &config_path).await?;

    match cli.command {
        Command::Token { show } => {
            let (token, source) = handler
                .fetch_token()
                .await
                .context("Failed to obtain a token")?;
            println!("{}", app::describe(Some(source), token.expires_in));
            println!("expires at {}", token.expires_at(Utc::now()).to_rfc3339());
            if show {
                println!("{}", token.access_token);
            }
        }
        Command::User => {
            let user = handler
                .get_user()
                .await
                .context("Failed to fetch user info")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Status => match handler.check_token_if_exist().await {
            Some(token) => println!("{}", app::describe(None, token.expires_in)),
            None => println!("no valid stored token"),
        },
        Command::Login => {
            let token = handler.login().await.context("Login failed")?;
            println!("logged in, token expires in {}s", token.expires_in);
        }
        Command::Logout => {
            handler.logout().await;
            println!("stored token removed");
        }
        Command::Payload => {
            let (token, _) = handler
                .fetch_token()
                .await
                .context("Failed to obtain a token")?;
            let payload: serde_json::Value = handler
                .get_payload(&token.access_token)
                .context("Access token is not a decodable JWT")?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["keyhandle", "--config", "/tmp/k.toml", "token", "--show"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/k.toml")));
        assert!(matches!(cli.command, Command::Token { show: true }));

        let cli = Cli::try_parse_from(["keyhandle", "logout"]).unwrap();
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Command::Logout));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["keyhandle"]).is_err());
    }
}
