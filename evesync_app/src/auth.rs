use std::sync::Arc;

use evesync_core::{Clock, Timestamp, TokenId};
use evesync_esi::{SsoClient, TokenGrant, VerifiedIdentity};
use evesync_store::{CharacterBinding, TokenStore};
use url::Url;

use crate::AppError;

/// Login and token maintenance against the SSO provider.
#[derive(Clone)]
pub struct AuthService {
    sso: Arc<dyn SsoClient>,
    tokens: TokenStore,
    clock: Arc<dyn Clock + Send + Sync>,
    scopes: Vec<String>,
}

impl AuthService {
    pub fn new(
        sso: Arc<dyn SsoClient>,
        tokens: TokenStore,
        clock: Arc<dyn Clock + Send + Sync>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            sso,
            tokens,
            clock,
            scopes,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn login_url(&self, state: Option<&str>) -> Result<Url, AppError> {
        Ok(self.sso.authorization_url(&self.scopes, state)?)
    }

    /// Exchanges an authorization code and persists the new token.
    pub async fn complete_login(&self, code: Option<&str>) -> Result<TokenId, AppError> {
        let code = code
            .filter(|code| !code.trim().is_empty())
            .ok_or(AppError::MissingCode)?;

        let grant = self.sso.exchange_code(code).await?;
        let expires_at = self.expires_at(&grant);
        let token_id = self
            .tokens
            .create_token(
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.scope.as_deref(),
                expires_at,
            )
            .await?;

        log::info!("stored new token {token_id}");
        Ok(token_id)
    }

    /// Asks the provider who owns the token and records the character the
    /// first time one is reported.
    pub async fn verify(&self, token_id: TokenId) -> Result<VerifiedIdentity, AppError> {
        let record = self.tokens.get_token(token_id).await?;
        let identity = self.sso.verify(&record.access_token).await?;

        match identity.character_id {
            Some(character_id) => {
                match self
                    .tokens
                    .set_character_identity(token_id, character_id)
                    .await?
                {
                    CharacterBinding::Bound => {
                        log::info!("token {token_id} verified as character {character_id}")
                    }
                    CharacterBinding::AlreadyBound => {
                        log::debug!("token {token_id} already bound to {character_id}")
                    }
                    CharacterBinding::Conflict { .. } => {}
                }
            }
            None => log::warn!("verify response for token {token_id} carried no CharacterID"),
        }

        Ok(identity)
    }

    pub async fn refresh(&self, token_id: TokenId) -> Result<TokenId, AppError> {
        let record = self.tokens.get_token(token_id).await?;
        let refresh_token = record
            .refresh_token
            .ok_or(AppError::MissingRefreshSecret(token_id))?;

        let grant = self.sso.refresh(&refresh_token).await?;
        let expires_at = self.expires_at(&grant);
        self.tokens
            .update_tokens(
                token_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        log::debug!("refreshed token {token_id}");
        Ok(token_id)
    }

    fn expires_at(&self, grant: &TokenGrant) -> Option<Timestamp> {
        grant
            .expires_in
            .and_then(|expires_in| self.clock.now().checked_add(expires_in))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use evesync_core::{CharacterId, Clock, Timestamp, TokenId};
    use evesync_esi::{EsiError, EsiResult, SsoClient, TokenGrant, VerifiedIdentity};
    use evesync_store::{CredentialVault, Database, TokenStore, VaultKey};
    use tempfile::{TempDir, tempdir};
    use url::Url;

    use super::AuthService;
    use crate::AppError;

    struct FixedClock(Timestamp);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    #[derive(Default)]
    struct MockSso {
        grants: Mutex<VecDeque<EsiResult<TokenGrant>>>,
        identities: Mutex<VecDeque<VerifiedIdentity>>,
        refresh_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SsoClient for MockSso {
        fn authorization_url(&self, scopes: &[String], _state: Option<&str>) -> EsiResult<Url> {
            Ok(Url::parse_with_params(
                "https://sso.invalid/authorize",
                &[("scope", scopes.join(" "))],
            )?)
        }

        async fn exchange_code(&self, _code: &str) -> EsiResult<TokenGrant> {
            self.grants
                .lock()
                .expect("grants lock")
                .pop_front()
                .unwrap_or_else(|| Err(EsiError::InvalidConfig("no grant configured")))
        }

        async fn refresh(&self, refresh_token: &str) -> EsiResult<TokenGrant> {
            self.refresh_calls
                .lock()
                .expect("refresh lock")
                .push(refresh_token.to_owned());
            self.exchange_code("").await
        }

        async fn verify(&self, _access_token: &str) -> EsiResult<VerifiedIdentity> {
            Ok(self
                .identities
                .lock()
                .expect("identities lock")
                .pop_front()
                .expect("identity configured"))
        }
    }

    fn grant(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenGrant {
        TokenGrant {
            access_token: access.to_owned(),
            refresh_token: refresh.map(str::to_owned),
            expires_in: expires_in.map(Duration::from_secs),
            scope: Some("publicData".to_owned()),
        }
    }

    fn identity(character_id: u64) -> VerifiedIdentity {
        VerifiedIdentity {
            character_id: Some(CharacterId(character_id)),
            payload: serde_json::json!({ "CharacterID": character_id }),
        }
    }

    async fn service(sso: Arc<MockSso>) -> (TempDir, AuthService) {
        let temp_dir = tempdir().expect("tempdir");
        let db = Database::connect(temp_dir.path().join("auth.sqlite"))
            .await
            .expect("connect store");
        let tokens = TokenStore::new(
            &db,
            CredentialVault::new(&VaultKey::derive_from_secret("auth-tests")),
        );
        let clock = Arc::new(FixedClock(
            Timestamp::from_epoch_secs(1_700_000_000).expect("valid epoch seconds"),
        ));
        let service = AuthService::new(sso, tokens, clock, vec!["publicData".to_owned()]);
        (temp_dir, service)
    }

    #[tokio::test]
    async fn login_requires_a_code() {
        let (_dir, service) = service(Arc::new(MockSso::default())).await;

        assert!(matches!(
            service.complete_login(None).await,
            Err(AppError::MissingCode)
        ));
        assert!(matches!(
            service.complete_login(Some("  ")).await,
            Err(AppError::MissingCode)
        ));
    }

    #[tokio::test]
    async fn login_stores_expiry_from_clock() {
        let sso = Arc::new(MockSso::default());
        sso.grants
            .lock()
            .expect("grants lock")
            .push_back(Ok(grant("access-1", Some("refresh-1"), Some(1_199))));
        let (_dir, service) = service(sso).await;

        let token_id = service
            .complete_login(Some("auth-code"))
            .await
            .expect("login");
        let record = service.tokens().get_token(token_id).await.expect("token");

        assert_eq!(record.access_token, "access-1");
        assert_eq!(record.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            record.expires_at,
            Timestamp::from_epoch_secs(1_700_001_199)
        );
        assert_eq!(record.character_id, None);
    }

    #[tokio::test]
    async fn refresh_without_refresh_secret_is_rejected() {
        let sso = Arc::new(MockSso::default());
        sso.grants
            .lock()
            .expect("grants lock")
            .push_back(Ok(grant("access-1", None, None)));
        let (_dir, service) = service(Arc::clone(&sso)).await;
        let token_id = service.complete_login(Some("code")).await.expect("login");

        assert!(matches!(
            service.refresh(token_id).await,
            Err(AppError::MissingRefreshSecret(id)) if id == token_id
        ));
        assert!(sso.refresh_calls.lock().expect("refresh lock").is_empty());
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_secret_when_provider_omits_it() {
        let sso = Arc::new(MockSso::default());
        {
            let mut grants = sso.grants.lock().expect("grants lock");
            grants.push_back(Ok(grant("access-1", Some("refresh-1"), Some(60))));
            grants.push_back(Ok(grant("access-2", None, Some(1_200))));
        }
        let (_dir, service) = service(Arc::clone(&sso)).await;
        let token_id = service.complete_login(Some("code")).await.expect("login");

        service.refresh(token_id).await.expect("refresh");
        let record = service.tokens().get_token(token_id).await.expect("token");

        assert_eq!(record.access_token, "access-2");
        assert_eq!(record.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            sso.refresh_calls.lock().expect("refresh lock").as_slice(),
            ["refresh-1".to_owned()]
        );
    }

    #[tokio::test]
    async fn verify_binds_first_character_only() {
        let sso = Arc::new(MockSso::default());
        sso.grants
            .lock()
            .expect("grants lock")
            .push_back(Ok(grant("access-1", None, None)));
        {
            let mut identities = sso.identities.lock().expect("identities lock");
            identities.push_back(identity(90_000_001));
            identities.push_back(identity(90_000_002));
        }
        let (_dir, service) = service(sso).await;
        let token_id = service.complete_login(Some("code")).await.expect("login");

        service.verify(token_id).await.expect("first verify");
        let second = service.verify(token_id).await.expect("second verify");
        assert_eq!(second.character_id, Some(CharacterId(90_000_002)));

        let record = service.tokens().get_token(token_id).await.expect("token");
        assert_eq!(record.character_id, Some(CharacterId(90_000_001)));
    }

    #[tokio::test]
    async fn verify_unknown_token_is_not_found() {
        let (_dir, service) = service(Arc::new(MockSso::default())).await;

        let err = service.verify(TokenId(77)).await.expect_err("unknown token");
        assert_eq!(err.http_status(), 404);
    }
}
