pub mod api;
pub mod config;
pub mod errors;
pub mod sso;
pub mod types;

pub use api::{EsiApiClient, HttpEsiClient};
pub use config::{EsiConfig, EsiEndpoints};
pub use errors::{DisplayChainedError, EsiError, EsiResult};
pub use sso::{HttpSsoClient, SsoClient};
pub use types::{TokenGrant, VerifiedIdentity};

pub(crate) fn build_http_client(user_agent: Option<&str>) -> EsiResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    Ok(builder.build()?)
}
