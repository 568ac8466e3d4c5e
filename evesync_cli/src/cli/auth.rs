use clap::{Args, Subcommand};
use evesync_app::AppRuntime;
use evesync_core::{Timestamp, TokenId};
use url::Url;

use crate::cli::{
    callback::wait_for_code,
    common::{print_json, with_status},
};

#[derive(Debug, Args)]
pub(crate) struct AuthCommand {
    #[command(subcommand)]
    subcmd: AuthSubcommand,
}

#[derive(Debug, Subcommand)]
enum AuthSubcommand {
    /// Print the provider authorization URL.
    LoginUrl,

    /// Print the authorization URL, capture the redirect locally and store the token.
    Login,

    /// Exchange an authorization code and store the token.
    Callback(CallbackCommand),

    /// Verify a token with the provider and record its character.
    Verify(TokenArgs),

    /// Refresh a token's access secret.
    Refresh(TokenArgs),

    /// List stored tokens without secrets.
    Tokens,
}

impl AuthCommand {
    pub(crate) async fn run(&self, app: &AppRuntime) -> anyhow::Result<()> {
        match &self.subcmd {
            AuthSubcommand::LoginUrl => {
                println!("{}", app.login_redirect().map_err(with_status)?);
                Ok(())
            }
            AuthSubcommand::Login => login(app).await,
            AuthSubcommand::Callback(cmd) => {
                let response = app
                    .auth_callback(cmd.code.as_deref())
                    .await
                    .map_err(with_status)?;
                print_json(&response)
            }
            AuthSubcommand::Verify(cmd) => {
                let payload = app
                    .verify_token(TokenId(cmd.token_id))
                    .await
                    .map_err(with_status)?;
                print_json(&payload)
            }
            AuthSubcommand::Refresh(cmd) => {
                let response = app
                    .refresh_token(TokenId(cmd.token_id))
                    .await
                    .map_err(with_status)?;
                print_json(&response)
            }
            AuthSubcommand::Tokens => print_tokens(app).await,
        }
    }
}

#[derive(Debug, Args)]
struct CallbackCommand {
    #[arg(long)]
    code: Option<String>,
}

#[derive(Debug, Args)]
struct TokenArgs {
    token_id: i64,
}

async fn login(app: &AppRuntime) -> anyhow::Result<()> {
    let url = app.login_redirect().map_err(with_status)?;
    let redirect_uri = url
        .query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow::anyhow!("authorization URL has no redirect_uri"))?;
    let redirect_uri = Url::parse(&redirect_uri)
        .map_err(|err| anyhow::anyhow!("invalid redirect_uri {redirect_uri}: {err}"))?;

    println!("Open this URL in your browser:\n\n{url}\n");
    println!("Waiting for callback on {redirect_uri}");

    let code = wait_for_code(&redirect_uri).await?;
    let response = app
        .auth_callback(Some(&code))
        .await
        .map_err(with_status)?;
    println!("Stored token {}. Run `auth verify {}` next.", response.token_id, response.token_id);
    Ok(())
}

async fn print_tokens(app: &AppRuntime) -> anyhow::Result<()> {
    let tokens = app.list_tokens().await.map_err(with_status)?;
    let now = Timestamp::now();

    println!("tokens: {}", tokens.len());
    for token in tokens {
        let expiry = match token.expires_at {
            Some(expires_at) => {
                let valid_for = expires_at.signed_duration_since(now).num_seconds();
                if valid_for >= 0 {
                    format!("in {valid_for}s")
                } else {
                    format!("expired {}s ago", -valid_for)
                }
            }
            None => "unknown".to_owned(),
        };
        println!(
            "token={} character={} scope={} refresh={} expires={} updated_at={}",
            token.id,
            token
                .character_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<unverified>".to_owned()),
            token.scope.as_deref().unwrap_or("<none>"),
            token.has_refresh_token,
            expiry,
            token.updated_at,
        );
    }

    Ok(())
}
