//! Command-line interface.

mod admin;
mod logging;
mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Single-admin LLM gateway with agent pooling and response caching.
#[derive(Parser, Debug)]
#[command(name = "mnemosine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind address (overrides HOST)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a random URL-safe secret suitable for SECRET_KEY
    GenerateSecretKey {
        /// Number of random bytes before encoding
        #[arg(long, default_value_t = 32)]
        length: usize,
    },
    /// Print a bcrypt hash suitable for ADMIN_PASSWORD_HASH
    HashPassword {
        password: String,
    },
    /// Load configuration and report every problem
    ValidateConfig,
    /// Check admin credentials against the configured account
    TestAuth {
        username: String,
        password: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { host, port } => serve::cmd_serve(host, port).await,
        Command::GenerateSecretKey { length } => {
            println!("{}", admin::generate_secret_key(length)?);
            Ok(())
        }
        Command::HashPassword { password } => admin::cmd_hash_password(&password),
        Command::ValidateConfig => admin::cmd_validate_config(),
        Command::TestAuth { username, password } => admin::cmd_test_auth(&username, &password),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["mnemosine", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Command::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_generate_secret_key_default_length() {
        let cli = Cli::try_parse_from(["mnemosine", "generate-secret-key"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::GenerateSecretKey { length: 32 }
        ));
    }

    #[test]
    fn test_parse_test_auth_requires_both_args() {
        assert!(Cli::try_parse_from(["mnemosine", "test-auth", "admin"]).is_err());
        assert!(Cli::try_parse_from(["mnemosine", "test-auth", "admin", "pw"]).is_ok());
    }
}
