use std::sync::Arc;

use async_trait::async_trait;
use evesync_core::{CharacterId, Clock, TokenId};
use evesync_esi::EsiApiClient;
use evesync_store::{SyncStore, TokenStore};
use serde::Serialize;

use crate::{
    AppError,
    queue::{SyncExecutor, SyncTask},
};

/// Outcome of one sync run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub character_id: CharacterId,
}

/// Pulls a character's remote data and upserts it into the local cache.
#[derive(Clone)]
pub struct SyncPipeline {
    tokens: TokenStore,
    store: SyncStore,
    esi: Arc<dyn EsiApiClient>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SyncPipeline {
    pub fn new(
        tokens: TokenStore,
        store: SyncStore,
        esi: Arc<dyn EsiApiClient>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            tokens,
            store,
            esi,
            clock,
        }
    }

    pub async fn sync_assets(&self, token_id: TokenId) -> Result<SyncReport, AppError> {
        let synced_at = self.clock.now();
        let (character_id, access_token) = self.authorize(token_id).await?;

        let assets = self
            .esi
            .fetch_assets_all_pages(character_id, &access_token)
            .await?;
        let inserted = self
            .store
            .upsert_assets(character_id, &assets, synced_at)
            .await?;

        log::info!("synced {inserted} assets for character {character_id}");
        Ok(SyncReport {
            inserted,
            character_id,
        })
    }

    pub async fn sync_industry_jobs(&self, token_id: TokenId) -> Result<SyncReport, AppError> {
        let synced_at = self.clock.now();
        let (character_id, access_token) = self.authorize(token_id).await?;

        let jobs = self
            .esi
            .fetch_industry_jobs(character_id, &access_token)
            .await?;
        let inserted = self
            .store
            .upsert_industry_jobs(character_id, &jobs, synced_at)
            .await?;

        log::info!("synced {inserted} industry jobs for character {character_id}");
        Ok(SyncReport {
            inserted,
            character_id,
        })
    }

    async fn authorize(&self, token_id: TokenId) -> Result<(CharacterId, String), AppError> {
        let record = self.tokens.get_token(token_id).await?;
        let character_id = record
            .character_id
            .ok_or(AppError::MissingCharacterIdentity(token_id))?;
        Ok((character_id, record.access_token))
    }
}

#[async_trait]
impl SyncExecutor for SyncPipeline {
    async fn execute(&self, task: SyncTask) -> Result<SyncReport, AppError> {
        match task {
            SyncTask::Assets { token_id } => self.sync_assets(token_id).await,
            SyncTask::IndustryJobs { token_id } => self.sync_industry_jobs(token_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use evesync_core::{
        AssetPayload, CharacterId, Clock, IndustryJobPayload, ItemId, JobId, LocationId,
        RawPayload, SystemClock, Timestamp, TokenId, TypeId,
    };
    use evesync_esi::{EsiApiClient, EsiError, EsiResult};
    use evesync_store::{CredentialVault, Database, SyncStore, TokenStore, VaultKey};
    use tempfile::{TempDir, tempdir};

    use super::{SyncPipeline, SyncReport};
    use crate::AppError;

    #[derive(Default)]
    struct ScriptedEsi {
        assets: Mutex<VecDeque<EsiResult<Vec<AssetPayload>>>>,
        jobs: Mutex<VecDeque<EsiResult<Vec<IndustryJobPayload>>>>,
        seen_tokens: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EsiApiClient for ScriptedEsi {
        async fn fetch_assets_all_pages(
            &self,
            _character_id: CharacterId,
            access_token: &str,
        ) -> EsiResult<Vec<AssetPayload>> {
            self.seen_tokens
                .lock()
                .expect("seen lock")
                .push(access_token.to_owned());
            self.assets
                .lock()
                .expect("assets lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn fetch_industry_jobs(
            &self,
            _character_id: CharacterId,
            _access_token: &str,
        ) -> EsiResult<Vec<IndustryJobPayload>> {
            self.jobs
                .lock()
                .expect("jobs lock")
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        tokens: TokenStore,
        store: SyncStore,
        esi: Arc<ScriptedEsi>,
        pipeline: SyncPipeline,
    }

    /// Returns a later time on every reading and counts the readings.
    struct TickingClock {
        reads: Mutex<i64>,
    }

    impl TickingClock {
        const START_SECS: i64 = 1_700_000_000;

        fn reads(&self) -> i64 {
            *self.reads.lock().expect("clock lock")
        }
    }

    impl Clock for TickingClock {
        fn now(&self) -> Timestamp {
            let mut reads = self.reads.lock().expect("clock lock");
            let now = Timestamp::from_epoch_secs(Self::START_SECS + *reads)
                .expect("valid epoch seconds");
            *reads += 1;
            now
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_clock(Arc::new(SystemClock)).await
    }

    async fn fixture_with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Fixture {
        let temp_dir = tempdir().expect("tempdir");
        let db = Database::connect(temp_dir.path().join("pipeline.sqlite"))
            .await
            .expect("connect store");
        let tokens = TokenStore::new(
            &db,
            CredentialVault::new(&VaultKey::derive_from_secret("pipeline")),
        );
        let store = SyncStore::new(&db);
        let esi = Arc::new(ScriptedEsi::default());
        let pipeline = SyncPipeline::new(
            tokens.clone(),
            store.clone(),
            Arc::clone(&esi) as Arc<dyn EsiApiClient>,
            clock,
        );
        Fixture {
            _temp_dir: temp_dir,
            tokens,
            store,
            esi,
            pipeline,
        }
    }

    async fn verified_token(tokens: &TokenStore, character_id: u64) -> TokenId {
        let token_id = tokens
            .create_token("live-access", Some("refresh"), None, None)
            .await
            .expect("create token");
        tokens
            .set_character_identity(token_id, CharacterId(character_id))
            .await
            .expect("bind character");
        token_id
    }

    fn asset(item_id: i64, quantity: i64) -> AssetPayload {
        AssetPayload {
            item_id: ItemId(item_id),
            type_id: TypeId(34),
            location_id: LocationId(60_003_760),
            quantity,
            raw: RawPayload::from_json_text(format!(
                r#"{{"item_id":{item_id},"quantity":{quantity}}}"#
            )),
        }
    }

    #[tokio::test]
    async fn unverified_token_is_rejected_before_fetching() {
        let f = fixture().await;
        let token_id = f
            .tokens
            .create_token("live-access", None, None, None)
            .await
            .expect("create token");

        let result = f.pipeline.sync_assets(token_id).await;
        assert!(matches!(result, Err(AppError::MissingCharacterIdentity(id)) if id == token_id));
        assert!(f.esi.seen_tokens.lock().expect("seen lock").is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let f = fixture().await;
        let err = f
            .pipeline
            .sync_industry_jobs(TokenId(404))
            .await
            .expect_err("unknown token");
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn later_sync_updates_rows_and_keeps_missing_ones() {
        let f = fixture().await;
        let token_id = verified_token(&f.tokens, 2_112_000_001).await;
        {
            let mut assets = f.esi.assets.lock().expect("assets lock");
            assets.push_back(Ok(vec![asset(1, 10), asset(2, 20)]));
            assets.push_back(Ok(vec![asset(1, 11)]));
        }

        let first = f.pipeline.sync_assets(token_id).await.expect("first sync");
        assert_eq!(
            first,
            SyncReport {
                inserted: 2,
                character_id: CharacterId(2_112_000_001),
            }
        );
        let second = f.pipeline.sync_assets(token_id).await.expect("second sync");
        assert_eq!(second.inserted, 1);

        let rows = f
            .store
            .list_assets(CharacterId(2_112_000_001), 100, 0)
            .await
            .expect("list assets");
        let quantities: Vec<(ItemId, i64)> =
            rows.iter().map(|row| (row.item_id, row.quantity)).collect();
        assert_eq!(quantities, vec![(ItemId(1), 11), (ItemId(2), 20)]);
        assert_eq!(
            f.esi.seen_tokens.lock().expect("seen lock").as_slice(),
            ["live-access".to_owned(), "live-access".to_owned()]
        );
    }

    #[tokio::test]
    async fn one_run_stamps_every_row_with_the_same_time() {
        let clock = Arc::new(TickingClock {
            reads: Mutex::new(0),
        });
        let f = fixture_with_clock(Arc::clone(&clock) as Arc<dyn Clock + Send + Sync>).await;
        let token_id = verified_token(&f.tokens, 9).await;
        f.esi
            .assets
            .lock()
            .expect("assets lock")
            .push_back(Ok((1..=5).map(|item_id| asset(item_id, item_id * 10)).collect()));

        let report = f.pipeline.sync_assets(token_id).await.expect("sync assets");
        assert_eq!(report.inserted, 5);
        assert_eq!(clock.reads(), 1);

        let rows = f
            .store
            .list_assets(CharacterId(9), 100, 0)
            .await
            .expect("list assets");
        let expected = Timestamp::from_epoch_secs(TickingClock::START_SECS).expect("valid epoch");
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.synced_at == expected));
    }

    #[tokio::test]
    async fn rerunning_unchanged_fixture_is_idempotent() {
        let f = fixture().await;
        let token_id = verified_token(&f.tokens, 7).await;
        {
            let mut jobs = f.esi.jobs.lock().expect("jobs lock");
            for _ in 0..2 {
                jobs.push_back(Ok(vec![IndustryJobPayload {
                    job_id: JobId(500),
                    product_type_id: None,
                    output_location_id: LocationId(1),
                    status: "active".to_owned(),
                    raw: RawPayload::from_json_text(r#"{"job_id":500,"status":"active"}"#),
                }]));
            }
        }

        f.pipeline
            .sync_industry_jobs(token_id)
            .await
            .expect("first sync");
        let before = f
            .store
            .list_industry_jobs(CharacterId(7), 100, 0)
            .await
            .expect("list jobs");
        f.pipeline
            .sync_industry_jobs(token_id)
            .await
            .expect("second sync");
        let after = f
            .store
            .list_industry_jobs(CharacterId(7), 100, 0)
            .await
            .expect("list jobs");

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(before[0].status, after[0].status);
        assert_eq!(before[0].payload, after[0].payload);
        assert_eq!(after[0].product_type_id, None);
    }

    #[tokio::test]
    async fn fetch_failure_writes_nothing() {
        let f = fixture().await;
        let token_id = verified_token(&f.tokens, 8).await;
        f.esi
            .assets
            .lock()
            .expect("assets lock")
            .push_back(Err(EsiError::UpstreamFetch {
                status: Some(503),
                body: "downtime".to_owned(),
            }));

        let err = f.pipeline.sync_assets(token_id).await.expect_err("fetch fails");
        assert_eq!(err.http_status(), 503);
        assert!(
            f.store
                .list_assets(CharacterId(8), 100, 0)
                .await
                .expect("list assets")
                .is_empty()
        );
    }
}
