//! Login commands: scripted password login, browser authorization, pasted tokens.

use anyhow::{bail, Context, Result};
use clap::Args;
use ovolink_core::CredentialSet;
use ovolink_fetch::AuthorizationRequest;
use ovolink_store::{
    ensure_dir, keychain, load_json, pending_authorization_path, remove_file, save_json,
    SettingsStore,
};
use ovolink_sync::{save_login, save_manual_tokens};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::{config_dir, service_config};
use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Arguments for login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Account e-mail; defaults to the saved username.
    #[arg(long, short)]
    pub username: Option<String>,

    /// Keep the password in the system keychain for unattended re-login.
    #[arg(long)]
    pub save_password: bool,
}

/// Arguments for exchange command.
#[derive(Args)]
pub struct ExchangeArgs {
    /// Authorization code, or the full redirect URL.
    #[arg(long, short)]
    pub code: String,
}

/// Arguments for tokens command.
#[derive(Args)]
pub struct TokensArgs {
    /// Access token copied from the portal.
    #[arg(long)]
    pub access_token: String,

    /// ID token copied from the portal.
    #[arg(long)]
    pub id_token: String,
}

/// Runs the scripted password login.
pub async fn login(args: &LoginArgs, cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    ensure_dir(&dir).await?;
    let settings = SettingsStore::load_from_dir(&dir).await;

    let username = match &args.username {
        Some(name) => name.clone(),
        None => settings
            .get()
            .await
            .username
            .context("no username given and none saved; pass --username")?,
    };
    let password = read_secret("Password: ").await?;

    let config = service_config(cli);
    let acquirer = config.acquirer(config.http_client()?);
    let credentials = acquirer
        .password_login(&username, &password)
        .await
        .context("login failed")?;
    save_login(&config, &credentials).await?;

    settings.update(|s| s.username = Some(username.clone())).await;
    settings.save().await?;

    if args.save_password {
        keychain::store_password(&username, &password)?;
        info!("Password saved to keychain");
    }

    report_login(cli, &credentials)
}

/// Prints the browser authorization URL and stashes the verifier.
pub async fn authorize(cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    ensure_dir(&dir).await?;

    let config = service_config(cli);
    let request = config.acquirer(config.http_client()?).authorization_request()?;
    save_json(&pending_authorization_path(&dir), &request).await?;

    if cli.format == OutputFormat::Json {
        let formatter = JsonFormatter::new(cli.pretty);
        println!("{}", formatter.format(&serde_json::json!({ "url": request.url }))?);
    } else {
        println!("Open this URL and log in:\n\n{}\n", request.url);
        println!("Then run: ovolink exchange --code '<redirect URL>'");
    }
    Ok(())
}

/// Completes the browser flow.
pub async fn exchange(args: &ExchangeArgs, cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    let pending_path = pending_authorization_path(&dir);
    let request: AuthorizationRequest = load_json(&pending_path)
        .await
        .context("no pending authorization; run `ovolink authorize` first")?;

    let (code, state) = parse_code(&args.code)?;
    if let Some(state) = state {
        if state != request.state {
            bail!("state mismatch; run `ovolink authorize` again");
        }
    } else {
        warn!("Code given without state, skipping state check");
    }

    let config = service_config(cli);
    let credentials = config
        .acquirer(config.http_client()?)
        .exchange_code(&code, request.pkce.verifier())
        .await
        .context("code exchange failed")?;
    save_login(&config, &credentials).await?;
    remove_file(&pending_path).await?;

    report_login(cli, &credentials)
}

/// Saves pasted tokens.
pub async fn tokens(args: &TokensArgs, cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    ensure_dir(&dir).await?;
    let credentials = save_manual_tokens(&service_config(cli), &args.access_token, &args.id_token)
        .await
        .context("tokens rejected")?;
    report_login(cli, &credentials)
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits a raw code or redirect URL into code and state.
fn parse_code(input: &str) -> Result<(String, Option<String>)> {
    let input = input.trim();
    if !input.contains("://") {
        return Ok((input.to_string(), None));
    }

    let url = url::Url::parse(input).context("invalid redirect URL")?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    match code {
        Some(code) => Ok((code, state)),
        None => bail!("redirect URL has no code"),
    }
}

/// Reads one line from stdin after printing `prompt` to stderr.
async fn read_secret(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("empty password");
    }
    Ok(secret)
}

fn report_login(cli: &Cli, credentials: &CredentialSet) -> Result<()> {
    if cli.quiet {
        return Ok(());
    }
    if cli.format == OutputFormat::Json {
        let formatter = JsonFormatter::new(cli.pretty);
        println!(
            "{}",
            formatter.format(&serde_json::json!({
                "expiresAt": credentials.expires_at.to_rfc3339(),
                "refreshable": credentials.has_refresh_token(),
            }))?
        );
    } else {
        println!(
            "Logged in; token valid until {}{}",
            credentials.expires_at.format("%Y-%m-%d %H:%M UTC"),
            if credentials.has_refresh_token() {
                ""
            } else {
                " (no refresh token)"
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_code() {
        let (code, state) = parse_code("  abc123 \n").unwrap();
        assert_eq!(code, "abc123");
        assert!(state.is_none());
    }

    #[test]
    fn test_parse_redirect_url() {
        let (code, state) =
            parse_code("https://my.ovoenergy.com.au/?login=oea&code=xyz&state=s%3D1").unwrap();
        assert_eq!(code, "xyz");
        assert_eq!(state.as_deref(), Some("s=1"));
    }

    #[test]
    fn test_parse_redirect_without_code() {
        assert!(parse_code("https://my.ovoenergy.com.au/?error=access_denied").is_err());
    }
}
