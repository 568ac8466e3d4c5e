use clap::{Args, Subcommand};
use evesync_app::{AppRuntime, DEFAULT_PAGE_LIMIT, Page};
use evesync_core::{CharacterId, GroupId, TypeId};

use crate::cli::common::{print_json, with_status};

#[derive(Debug, Args)]
pub(crate) struct DataCommand {
    #[command(subcommand)]
    subcmd: DataSubcommand,
}

#[derive(Debug, Subcommand)]
enum DataSubcommand {
    /// Stored assets for a character.
    Assets(ListArgs),

    /// Stored industry jobs for a character.
    Industry(ListArgs),

    /// Look up an SDE type.
    Type { type_id: i32 },

    /// Look up an SDE group.
    Group { group_id: i32 },
}

#[derive(Debug, Args)]
struct ListArgs {
    character_id: u64,

    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    limit: u32,

    #[arg(long, default_value_t = 0)]
    offset: u32,
}

impl ListArgs {
    fn page(&self) -> Page {
        Page {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl DataCommand {
    pub(crate) async fn run(&self, app: &AppRuntime) -> anyhow::Result<()> {
        match &self.subcmd {
            DataSubcommand::Assets(args) => print_json(
                &app.assets(CharacterId(args.character_id), args.page())
                    .await
                    .map_err(with_status)?,
            ),
            DataSubcommand::Industry(args) => print_json(
                &app.industry_jobs(CharacterId(args.character_id), args.page())
                    .await
                    .map_err(with_status)?,
            ),
            DataSubcommand::Type { type_id } => print_json(
                &app.sde_type(TypeId(*type_id))
                    .await
                    .map_err(with_status)?,
            ),
            DataSubcommand::Group { group_id } => print_json(
                &app.sde_group(GroupId(*group_id))
                    .await
                    .map_err(with_status)?,
            ),
        }
    }
}
