use std::{sync::Arc, time::Duration};

use evesync_core::{
    CharacterId, Clock, GroupId, ItemId, JobId, LocationId, SystemClock, TokenId, TypeId,
};
use evesync_esi::{EsiApiClient, HttpEsiClient, HttpSsoClient, SsoClient};
use evesync_store::{
    CredentialVault, Database, GroupInfo, KeySource, ReferenceStore, SyncStore, TokenStore,
    TokenSummary, TypeInfo,
};
use serde::Serialize;
use url::Url;

use crate::{
    AppError,
    auth::AuthService,
    config::{AppConfig, LocalQueueConfig},
    pipeline::{SyncPipeline, SyncReport},
    queue::{JobQueue, JobState, JobStatus, LocalJobQueue, SyncJobId, SyncTask},
};

pub const DEFAULT_PAGE_LIMIT: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub token_id: TokenId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnqueueResponse {
    pub status: &'static str,
    pub job_id: SyncJobId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobStatusResponse {
    pub id: SyncJobId,
    pub status: JobState,
    pub result: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobStatus> for JobStatusResponse {
    fn from(value: JobStatus) -> Self {
        Self {
            id: value.id,
            status: value.state,
            result: value.result,
            error: value.error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetView {
    pub item_id: ItemId,
    pub type_id: TypeId,
    pub location_id: LocationId,
    pub quantity: i64,
    pub synced_at: String,
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetsResponse {
    pub assets: Vec<AssetView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndustryJobView {
    pub job_id: JobId,
    pub type_id: Option<TypeId>,
    pub output_location_id: LocationId,
    pub status: String,
    pub synced_at: String,
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndustryJobsResponse {
    pub jobs: Vec<IndustryJobView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Collaborators for [`AppRuntime::from_parts`]; lets callers swap the
/// provider clients and clock.
pub struct RuntimeParts {
    pub database: Database,
    pub vault: CredentialVault,
    pub sso: Arc<dyn SsoClient>,
    pub esi: Arc<dyn EsiApiClient>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub scopes: Vec<String>,
    pub queue: LocalQueueConfig,
}

/// Every externally reachable operation, one method per route.
#[derive(Clone)]
pub struct AppRuntime {
    auth: AuthService,
    sync: SyncStore,
    reference: ReferenceStore,
    queue: Arc<dyn JobQueue>,
}

impl AppRuntime {
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let database = Database::connect(&config.database_path).await?;
        let (key, source) = config.vault_key()?;
        log_key_source(source);

        let sso = HttpSsoClient::new(config.esi.clone())?;
        let esi = HttpEsiClient::new(&config.esi)?;

        Ok(Self::from_parts(RuntimeParts {
            database,
            vault: CredentialVault::new(&key),
            sso: Arc::new(sso),
            esi: Arc::new(esi),
            clock: Arc::new(SystemClock),
            scopes: config.esi.scopes.clone(),
            queue: config.queue,
        }))
    }

    /// Wires the stores and starts the local sync workers. Must run inside a
    /// tokio runtime.
    pub fn from_parts(parts: RuntimeParts) -> Self {
        let tokens =
            TokenStore::new(&parts.database, parts.vault).with_clock(Arc::clone(&parts.clock));
        let sync = SyncStore::new(&parts.database);
        let pipeline = SyncPipeline::new(
            tokens.clone(),
            sync.clone(),
            parts.esi,
            Arc::clone(&parts.clock),
        );
        let queue = LocalJobQueue::start(Arc::new(pipeline), parts.queue);

        Self {
            auth: AuthService::new(parts.sso, tokens, parts.clock, parts.scopes),
            sync,
            reference: ReferenceStore::new(&parts.database),
            queue: Arc::new(queue),
        }
    }

    pub fn login_redirect(&self) -> Result<Url, AppError> {
        self.auth.login_url(None)
    }

    pub async fn auth_callback(&self, code: Option<&str>) -> Result<TokenResponse, AppError> {
        let token_id = self.auth.complete_login(code).await?;
        Ok(TokenResponse {
            status: "ok",
            token_id,
        })
    }

    /// Returns the provider's verify payload untouched.
    pub async fn verify_token(&self, token_id: TokenId) -> Result<serde_json::Value, AppError> {
        Ok(self.auth.verify(token_id).await?.payload)
    }

    pub async fn refresh_token(&self, token_id: TokenId) -> Result<TokenResponse, AppError> {
        let token_id = self.auth.refresh(token_id).await?;
        Ok(TokenResponse {
            status: "ok",
            token_id,
        })
    }

    pub async fn list_tokens(&self) -> Result<Vec<TokenSummary>, AppError> {
        Ok(self.auth.tokens().list_tokens().await?)
    }

    pub async fn enqueue_assets(&self, token_id: TokenId) -> Result<EnqueueResponse, AppError> {
        self.enqueue(SyncTask::Assets { token_id }).await
    }

    pub async fn enqueue_industry(&self, token_id: TokenId) -> Result<EnqueueResponse, AppError> {
        self.enqueue(SyncTask::IndustryJobs { token_id }).await
    }

    async fn enqueue(&self, task: SyncTask) -> Result<EnqueueResponse, AppError> {
        let job_id = self.queue.enqueue(task).await?;
        Ok(EnqueueResponse {
            status: "queued",
            job_id,
        })
    }

    /// Unparsable ids are reported the same way as unknown ones.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, AppError> {
        let id = job_id
            .parse::<SyncJobId>()
            .map_err(|_| job_not_found(job_id))?;
        let status = self
            .queue
            .status(id)
            .await
            .ok_or_else(|| job_not_found(job_id))?;
        Ok(status.into())
    }

    pub async fn wait_for_job(
        &self,
        job_id: SyncJobId,
        poll_interval: Duration,
    ) -> Result<JobStatusResponse, AppError> {
        let status = self
            .queue
            .wait_for(job_id, poll_interval)
            .await
            .ok_or_else(|| job_not_found(&job_id.to_string()))?;
        Ok(status.into())
    }

    pub async fn assets(
        &self,
        character_id: CharacterId,
        page: Page,
    ) -> Result<AssetsResponse, AppError> {
        let records = self
            .sync
            .list_assets(character_id, page.limit, page.offset)
            .await?;

        let mut assets = Vec::with_capacity(records.len());
        for record in records {
            assets.push(AssetView {
                item_id: record.item_id,
                type_id: record.type_id,
                location_id: record.location_id,
                quantity: record.quantity,
                synced_at: record.synced_at.to_rfc3339(),
                type_name: self.type_name(Some(record.type_id)).await,
            });
        }

        Ok(AssetsResponse { assets })
    }

    pub async fn industry_jobs(
        &self,
        character_id: CharacterId,
        page: Page,
    ) -> Result<IndustryJobsResponse, AppError> {
        let records = self
            .sync
            .list_industry_jobs(character_id, page.limit, page.offset)
            .await?;

        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            jobs.push(IndustryJobView {
                job_id: record.job_id,
                type_id: record.product_type_id,
                output_location_id: record.output_location_id,
                status: record.status,
                synced_at: record.synced_at.to_rfc3339(),
                type_name: self.type_name(record.product_type_id).await,
            });
        }

        Ok(IndustryJobsResponse { jobs })
    }

    pub async fn sde_type(&self, type_id: TypeId) -> Result<TypeInfo, AppError> {
        self.reference
            .type_info(type_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("type {type_id}")))
    }

    pub async fn sde_group(&self, group_id: GroupId) -> Result<GroupInfo, AppError> {
        self.reference
            .group_info(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {group_id}")))
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse { status: "ok" }
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    async fn type_name(&self, type_id: Option<TypeId>) -> Option<String> {
        let type_id = type_id?;
        match self.reference.type_name(type_id).await {
            Ok(name) => name,
            Err(err) => {
                log::warn!("type name lookup for {type_id} failed: {err}");
                None
            }
        }
    }
}

fn job_not_found(job_id: &str) -> AppError {
    AppError::NotFound(format!("job {job_id}"))
}

fn log_key_source(source: KeySource) {
    match source {
        KeySource::Explicit => log::debug!("token encryption key taken from ESI_TOKEN_KEY"),
        KeySource::DerivedFromSecret => {
            log::debug!("token encryption key derived from SECRET_KEY")
        }
        KeySource::Ephemeral => {}
    }
}
