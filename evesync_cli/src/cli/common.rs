use std::path::Path;

use anyhow::Context;
use evesync_app::{AppConfig, AppError, AppRuntime};
use serde::Serialize;

pub(crate) async fn connect_runtime(db: Option<&Path>) -> anyhow::Result<AppRuntime> {
    let mut config = AppConfig::from_env().context("invalid environment configuration")?;
    if let Some(db) = db {
        config.database_path = db.to_path_buf();
    }
    if config.esi.user_agent.is_none() {
        config.esi.user_agent = Some(format!(
            "{}/{}",
            clap::crate_name!(),
            clap::crate_version!()
        ));
    }

    log::debug!("using database {}", config.database_path.display());
    AppRuntime::connect(&config)
        .await
        .context("failed to start runtime")
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

/// Attaches the status a route would answer with.
pub(crate) fn with_status(err: AppError) -> anyhow::Error {
    let status = err.http_status();
    anyhow::Error::new(err).context(format!("request failed with status {status}"))
}
