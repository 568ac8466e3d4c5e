use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::cli::{
    auth::AuthCommand,
    common::{connect_runtime, print_json},
    data::DataCommand,
    sync::SyncCommand,
};

pub(crate) fn get_args() -> CliOpts {
    CliOpts::parse()
}

#[derive(Debug, Parser)]
#[command(version = clap::crate_version!())]
pub(crate) struct CliOpts {
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// SQLite database path; overrides DATABASE_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    subcmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// SSO login and token maintenance.
    Auth(AuthCommand),

    /// Queue a sync job and wait for it.
    Sync(SyncCommand),

    /// Read synced data and reference lookups.
    Data(DataCommand),

    /// Check that the database opens and report status.
    Health,
}

impl CliOpts {
    pub(crate) fn verbose(&self) -> u8 {
        self.verbose
    }

    pub(crate) async fn run(&self) -> anyhow::Result<()> {
        let app = connect_runtime(self.db.as_deref()).await?;

        let result = match &self.subcmd {
            Command::Auth(cmd) => cmd.run(&app).await,
            Command::Sync(cmd) => cmd.run(&app).await,
            Command::Data(cmd) => cmd.run(&app).await,
            Command::Health => print_json(&app.health()),
        };

        app.shutdown().await;
        result
    }
}
