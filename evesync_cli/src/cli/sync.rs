use std::time::Duration;

use clap::{Args, Subcommand};
use evesync_app::{AppRuntime, JobState};
use evesync_core::TokenId;

use crate::cli::common::{print_json, with_status};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Args)]
pub(crate) struct SyncCommand {
    #[command(subcommand)]
    subcmd: SyncSubcommand,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Sync the token's character assets.
    Assets(SyncArgs),

    /// Sync the token's character industry jobs.
    Industry(SyncArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    token_id: i64,
}

impl SyncCommand {
    pub(crate) async fn run(&self, app: &AppRuntime) -> anyhow::Result<()> {
        let queued = match &self.subcmd {
            SyncSubcommand::Assets(args) => app.enqueue_assets(TokenId(args.token_id)).await,
            SyncSubcommand::Industry(args) => app.enqueue_industry(TokenId(args.token_id)).await,
        }
        .map_err(with_status)?;
        log::info!("queued job {}", queued.job_id);

        let status = app
            .wait_for_job(queued.job_id, POLL_INTERVAL)
            .await
            .map_err(with_status)?;
        print_json(&status)?;

        if status.status == JobState::Failed {
            anyhow::bail!("sync job {} failed", status.id);
        }
        Ok(())
    }
}
