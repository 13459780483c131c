//! Maroon CLI
//!
//! Command-line interface for managing AWS profiles backed by the Maroon API.
//!
//! # Usage
//!
//! ```bash
//! # Add a profile and point the AWS config at Maroon
//! maroon profile add -p dev -i 123456789012 -r Admin --region us-east-1
//!
//! # Print credentials in credential_process format
//! maroon credentials print -p dev
//!
//! # Write credentials into the default AWS profile
//! maroon credentials update -p dev
//!
//! # Generate a console sign-in URL
//! maroon get-console-url -i 123456789012 -a ReadOnly -d 3600
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use maroon_core::{AccessType, AccountId, ProfileName, Region, RoleName};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod config;

use commands::App;

#[derive(Parser)]
#[command(name = "maroon")]
#[command(about = "Manage AWS profiles and fetch credentials using the Maroon API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to cli.toml in the Maroon config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Token to authenticate to the Maroon API with
    #[arg(long, global = true, env = "MAROON_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage Maroon profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage AWS credentials
    #[command(subcommand)]
    Credentials(CredentialsCommand),

    /// Generate a console URL using the Maroon API
    GetConsoleUrl {
        /// Account ID to get the console URL for
        #[arg(short = 'i', long)]
        account_id: AccountId,

        /// Access level of the console session (ReadOnly or Administrator)
        #[arg(short, long)]
        access_type: AccessType,

        /// Seconds the URL stays valid, between 900 and 43200
        #[arg(short, long)]
        duration: u32,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Add a profile and register it in the AWS config file
    Add {
        /// Name of the profile (alphanumeric characters and '-')
        #[arg(short, long = "profile-name")]
        profile_name: ProfileName,

        /// Account ID (i.e. 123456789012) of the AWS account
        #[arg(short = 'i', long)]
        account_id: AccountId,

        /// Role name to assume when fetching credentials
        #[arg(short, long)]
        role: RoleName,

        /// Default region of the AWS account
        #[arg(long)]
        region: Region,
    },

    /// Remove a profile; a no-op if it does not exist
    Remove {
        #[arg(short, long = "profile-name")]
        profile_name: ProfileName,
    },

    /// List configured profiles
    List,
}

#[derive(Subcommand)]
enum CredentialsCommand {
    /// Print credentials in the format AWS SDKs read from credential_process
    Print {
        #[arg(short, long = "profile-name")]
        profile_name: ProfileName,
    },

    /// Write credentials to the default profile of the AWS credentials file
    Update {
        #[arg(short, long = "profile-name")]
        profile_name: ProfileName,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref());
    let log_level = match &config {
        Ok(config) => config.log_level.as_str(),
        Err(_) => config::DEFAULT_LOG_LEVEL,
    };
    init_logging(cli.verbose, log_level);

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; stdout carries command output only.
fn init_logging(verbose: bool, configured_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(configured_level))
            .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_LEVEL))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli, config: config::CliConfig) -> Result<()> {
    if let Some(path) = &config.config_path {
        tracing::debug!("Loaded configuration from {:?}", path);
    }

    let app = App::new(config, cli.token);
    let now = Utc::now();
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Profile(ProfileCommand::Add {
            profile_name,
            account_id,
            role,
            region,
        }) => commands::add_profile(&app, &profile_name, account_id, role, region, &mut stdout)?,
        Commands::Profile(ProfileCommand::Remove { profile_name }) => {
            commands::remove_profile(&app, &profile_name, &mut stdout)?
        }
        Commands::Profile(ProfileCommand::List) => {
            commands::list_profiles(&app, now, &mut stdout)?
        }
        Commands::Credentials(CredentialsCommand::Print { profile_name }) => {
            commands::print_credentials(&app, &profile_name, now, &mut stdout).await?
        }
        Commands::Credentials(CredentialsCommand::Update { profile_name }) => {
            commands::update_credentials(&app, &profile_name, now, &mut stdout).await?
        }
        Commands::GetConsoleUrl {
            account_id,
            access_type,
            duration,
        } => {
            commands::get_console_url(&app, account_id, access_type, duration, &mut stdout)
                .await?
        }
    }

    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_profile_add() {
        let cli = Cli::try_parse_from([
            "maroon", "profile", "add", "-p", "dev", "-i", "123456789012", "-r", "Admin",
            "--region", "us-east-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Profile(ProfileCommand::Add {
                profile_name,
                account_id,
                ..
            }) => {
                assert_eq!(profile_name.as_str(), "dev");
                assert_eq!(account_id.as_str(), "123456789012");
            }
            _ => panic!("expected profile add"),
        }
    }

    #[test]
    fn test_invalid_values_rejected_by_parser() {
        assert!(Cli::try_parse_from(["maroon", "credentials", "print", "-p", "bad name"]).is_err());
        assert!(
            Cli::try_parse_from([
                "maroon", "get-console-url", "-i", "123456789012", "-a", "Owner", "-d", "900",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "maroon", "profile", "list", "--verbose", "--token", "abc", "--config", "/tmp/c.toml",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
