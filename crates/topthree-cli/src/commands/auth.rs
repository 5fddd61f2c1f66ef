use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use topthree_core::auth::OAuthTokens;
use topthree_core::{Config, KeyringTokenProvider};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store Google OAuth client credentials
    Login {
        /// OAuth client ID (saved to config)
        #[arg(long)]
        client_id: String,
        /// OAuth client secret (saved to the OS keyring)
        #[arg(long)]
        client_secret: String,
        /// Refresh token obtained from the provider
        #[arg(long)]
        refresh_token: String,
    },
    /// Remove stored credentials
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::Login {
            client_id,
            client_secret,
            refresh_token,
        } => {
            let mut config = Config::load()?;
            config.set("auth.client_id", &client_id)?;
            config.save()?;
            KeyringTokenProvider::store_client_secret(&client_secret)?;
            // Expired on purpose so the first calendar call refreshes it.
            KeyringTokenProvider::store_tokens(&OAuthTokens {
                access_token: String::new(),
                refresh_token: Some(refresh_token),
                expires_at: Some(0),
                token_type: "Bearer".into(),
                scope: None,
            })?;
            println!("google credentials stored");
        }
        AuthAction::Logout => {
            KeyringTokenProvider::sign_out()?;
            println!("google credentials removed");
        }
        AuthAction::Status => {
            let tokens = KeyringTokenProvider::load_tokens()?;
            print_json(&json!({
                "authenticated": tokens.is_some(),
                "expired": tokens.as_ref().map(|t| t.is_expired_at(Utc::now())),
            }))?;
        }
    }
    Ok(())
}
