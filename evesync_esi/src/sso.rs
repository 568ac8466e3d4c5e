use std::time::Duration;

use async_trait::async_trait;
use evesync_core::CharacterId;
use serde::Deserialize;
use url::Url;

use crate::{
    EsiError, EsiResult,
    config::EsiConfig,
    types::{TokenGrant, VerifiedIdentity},
};

#[async_trait]
pub trait SsoClient: Send + Sync {
    fn authorization_url(&self, scopes: &[String], state: Option<&str>) -> EsiResult<Url>;
    async fn exchange_code(&self, code: &str) -> EsiResult<TokenGrant>;
    async fn refresh(&self, refresh_token: &str) -> EsiResult<TokenGrant>;
    async fn verify(&self, access_token: &str) -> EsiResult<VerifiedIdentity>;
}

pub struct HttpSsoClient {
    http: reqwest::Client,
    config: EsiConfig,
}

impl HttpSsoClient {
    pub fn new(config: EsiConfig) -> EsiResult<Self> {
        config.validate()?;
        let http = crate::build_http_client(config.user_agent.as_deref())?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EsiConfig {
        &self.config
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> EsiResult<TokenGrant> {
        let (client_id, client_secret) = self.config.require_client_credentials()?;
        let grant_type = form
            .iter()
            .find(|(key, _)| *key == "grant_type")
            .map(|(_, value)| *value)
            .unwrap_or_default();
        log::debug!("requesting {grant_type} grant from sso");

        let response = self
            .http
            .post(&self.config.endpoints.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::debug!("sso rejected {grant_type} grant with status {status}");
            return Err(EsiError::UpstreamAuth {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into_grant())
    }
}

#[async_trait]
impl SsoClient for HttpSsoClient {
    fn authorization_url(&self, scopes: &[String], state: Option<&str>) -> EsiResult<Url> {
        let client_id = self.config.require_client_id()?;
        let scope = scopes.join(" ");

        let mut params = vec![
            ("response_type", "code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", client_id),
            ("scope", scope.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }

        Ok(Url::parse_with_params(
            &self.config.endpoints.authorize_url,
            &params,
        )?)
    }

    async fn exchange_code(&self, code: &str) -> EsiResult<TokenGrant> {
        self.token_request(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> EsiResult<TokenGrant> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn verify(&self, access_token: &str) -> EsiResult<VerifiedIdentity> {
        let response = self
            .http
            .get(&self.config.endpoints.verify_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EsiError::UpstreamAuth {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = serde_json::from_str(&body)?;
        Ok(VerifiedIdentity {
            character_id: character_id_from_verify(&payload),
            payload,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            expires_in: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            scope: self.scope,
        }
    }
}

/// Only `CharacterID` is consulted; other spellings are not provider output.
fn character_id_from_verify(payload: &serde_json::Value) -> Option<CharacterId> {
    let value = payload.get("CharacterID")?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        .filter(|id| *id > 0)
        .map(CharacterId)
}
