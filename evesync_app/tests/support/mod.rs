use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use evesync_app::{AppConfig, AppRuntime, JobStatusResponse, SyncJobId};
use evesync_store::Database;
use serde_json::json;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const CHARACTER_ID: u64 = 2_112_000_001;
pub const POLL: Duration = Duration::from_millis(5);

pub struct TestHarness {
    _temp_dir: TempDir,
    db_path: PathBuf,
    pub server: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let db_path = temp_dir.path().join("evesync.sqlite");
        Self {
            _temp_dir: temp_dir,
            db_path,
            server: MockServer::start().await,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn config_with(&self, overrides: &[(&str, &str)]) -> AppConfig {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("EVE_CLIENT_ID".to_owned(), "client-id".to_owned()),
            ("EVE_CLIENT_SECRET".to_owned(), "client-secret".to_owned()),
            ("EVE_SCOPES".to_owned(), "esi-assets.read_assets.v1".to_owned()),
            ("SECRET_KEY".to_owned(), "integration-secret".to_owned()),
            ("EVESYNC_SSO_URL".to_owned(), self.server.uri()),
            (
                "EVESYNC_ESI_URL".to_owned(),
                format!("{}/latest", self.server.uri()),
            ),
            (
                "DATABASE_PATH".to_owned(),
                self.db_path.to_string_lossy().into_owned(),
            ),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_owned(), (*value).to_owned());
        }
        AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("test config")
    }

    pub async fn app(&self) -> AppRuntime {
        self.app_with(&[]).await
    }

    pub async fn app_with(&self, overrides: &[(&str, &str)]) -> AppRuntime {
        AppRuntime::connect(&self.config_with(overrides))
            .await
            .expect("connect app")
    }

    pub async fn database(&self) -> Database {
        Database::connect(self.db_path())
            .await
            .expect("connect database")
    }

    pub async fn seed_type(&self, type_id: i32, name: &str) {
        sqlx::query("INSERT INTO sde_types (type_id, name) VALUES (?1, ?2)")
            .bind(type_id)
            .bind(name)
            .execute(self.database().await.pool())
            .await
            .expect("seed type");
    }

    pub async fn mock_token_grant(&self, access: &str, refresh: Option<&str>) {
        let mut body = json!({
            "access_token": access,
            "expires_in": 1199,
            "token_type": "Bearer",
            "scope": "esi-assets.read_assets.v1",
        });
        if let Some(refresh) = refresh {
            body["refresh_token"] = json!(refresh);
        }
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_verify(&self, character_id: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "CharacterID": character_id,
                "CharacterName": "Integration Pilot",
                "ExpiresOn": "2026-10-19T12:00:00",
                "Scopes": "esi-assets.read_assets.v1",
                "TokenType": "Character",
            })))
            .mount(&self.server)
            .await;
    }

    /// Logs in and verifies, leaving a token bound to [`CHARACTER_ID`].
    pub async fn verified_token(&self, app: &AppRuntime) -> evesync_core::TokenId {
        self.mock_token_grant("access-1", Some("refresh-1")).await;
        self.mock_verify(CHARACTER_ID).await;

        let token = app
            .auth_callback(Some("auth-code"))
            .await
            .expect("auth callback");
        app.verify_token(token.token_id).await.expect("verify");
        token.token_id
    }
}

pub fn assets_path(character_id: u64) -> String {
    format!("/latest/characters/{character_id}/assets/")
}

pub fn industry_path(character_id: u64) -> String {
    format!("/latest/characters/{character_id}/industry/jobs/")
}

pub fn asset_json(item_id: i64, type_id: i32, quantity: i64) -> serde_json::Value {
    json!({
        "item_id": item_id,
        "type_id": type_id,
        "location_id": 60003760,
        "location_flag": "Hangar",
        "location_type": "station",
        "is_singleton": false,
        "quantity": quantity,
    })
}

pub async fn finished(app: &AppRuntime, job_id: SyncJobId) -> JobStatusResponse {
    app.wait_for_job(job_id, POLL).await.expect("job status")
}
