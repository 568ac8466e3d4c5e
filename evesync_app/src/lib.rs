pub mod auth;
pub mod config;
mod error;
pub mod pipeline;
pub mod queue;
mod runtime;

pub use auth::AuthService;
pub use config::{AppConfig, LocalQueueConfig};
pub use error::{AppError, ErrorKind};
pub use pipeline::{SyncPipeline, SyncReport};
pub use queue::{JobQueue, JobState, JobStatus, LocalJobQueue, SyncExecutor, SyncJobId, SyncTask};
pub use runtime::{
    AppRuntime, AssetView, AssetsResponse, DEFAULT_PAGE_LIMIT, EnqueueResponse, HealthResponse,
    IndustryJobView, IndustryJobsResponse, JobStatusResponse, Page, RuntimeParts, TokenResponse,
};
