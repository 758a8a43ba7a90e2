//! Auth subcommands for parley CLI

use std::io::BufRead;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use parley_core::credentials::{ACCESS_TOKEN_ENV, ACCESS_TOKEN_KEY};
use parley_core::{AccessToken, FileCredentialStore};

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store the access token presented when connecting
    Login {
        /// Access token (read from stdin if omitted)
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove the stored access token
    Logout,
    /// Show where the access token comes from
    Status,
}

pub fn run(args: AuthArgs) -> Result<()> {
    let store = FileCredentialStore::default_location();
    match args.command {
        AuthCommand::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => read_token(std::io::stdin().lock())?,
            };
            login(&store, &token)
        }
        AuthCommand::Logout => logout(&store),
        AuthCommand::Status => status(&store),
    }
}

fn read_token(mut input: impl BufRead) -> Result<String> {
    eprintln!("Paste access token and press enter:");
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read token from stdin")?;
    Ok(line)
}

fn login(store: &FileCredentialStore, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        bail!("Access token must not be empty");
    }
    store
        .set_access_token(&AccessToken::new(token))
        .with_context(|| format!("Failed to write {}", store.path().display()))?;
    println!("Access token saved to {}", store.path().display());
    Ok(())
}

fn logout(store: &FileCredentialStore) -> Result<()> {
    if store.remove_access_token()? {
        println!("Access token removed");
    } else {
        println!("No access token stored");
    }
    Ok(())
}

fn status(store: &FileCredentialStore) -> Result<()> {
    println!("Credentials file: {}", store.path().display());

    match store.get(ACCESS_TOKEN_KEY)? {
        Some(token) => println!("Stored token:     {}", mask(token.expose_secret())),
        None => println!("Stored token:     (none)"),
    }

    let env_set = std::env::var(ACCESS_TOKEN_ENV).is_ok_and(|v| !v.trim().is_empty());
    println!(
        "{ACCESS_TOKEN_ENV}: {}",
        if env_set { "set" } else { "not set" }
    );
    Ok(())
}

/// Show enough of a token to tell tokens apart without revealing it.
fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "********".to_string()
    } else {
        format!("{visible}********")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileCredentialStore {
        FileCredentialStore::new(dir.path().join("credentials.toml"))
    }

    #[test]
    fn test_login_trims_and_stores_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        login(&store, "  abc.def.ghi\n").unwrap();

        let token = store
            .get(ACCESS_TOKEN_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(token.expose_secret(), "abc.def.ghi");
    }

    #[test]
    fn test_login_rejects_empty_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert!(login(&store, "   ").is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_logout_is_safe_without_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        logout(&store).unwrap();
        login(&store, "token-value").unwrap();
        logout(&store).unwrap();

        assert!(
            store
                .get(ACCESS_TOKEN_KEY)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_read_token_takes_first_line() {
        let token = read_token("tok-123\nignored\n".as_bytes()).unwrap();
        assert_eq!(token.trim(), "tok-123");
    }

    #[test]
    fn test_mask_hides_short_tokens() {
        assert_eq!(mask("short"), "********");
        assert_eq!(mask("abcdefghijkl"), "abcd********");
    }
}
