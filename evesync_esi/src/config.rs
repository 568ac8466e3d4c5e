use crate::{EsiError, EsiResult};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://login.eveonline.com/v2/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";
pub const DEFAULT_VERIFY_URL: &str = "https://login.eveonline.com/oauth/verify";
pub const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net/latest";
pub const DEFAULT_DATASOURCE: &str = "tranquility";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsiEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub verify_url: String,
    pub esi_base_url: String,
}

impl Default for EsiEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_owned(),
            token_url: DEFAULT_TOKEN_URL.to_owned(),
            verify_url: DEFAULT_VERIFY_URL.to_owned(),
            esi_base_url: DEFAULT_ESI_BASE_URL.to_owned(),
        }
    }
}

impl EsiEndpoints {
    /// Points every endpoint at one host, keeping the provider's path layout.
    pub fn with_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authorize_url: format!("{base}/v2/oauth/authorize"),
            token_url: format!("{base}/v2/oauth/token"),
            verify_url: format!("{base}/oauth/verify"),
            esi_base_url: format!("{base}/latest"),
        }
    }
}

/// Client registration and endpoint layout for the SSO and ESI hosts.
///
/// Client credentials are optional here because their absence only breaks
/// the operations that need them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsiConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub user_agent: Option<String>,
    pub datasource: String,
    pub endpoints: EsiEndpoints,
}

impl EsiConfig {
    pub fn validate(&self) -> EsiResult<()> {
        if self.redirect_uri.trim().is_empty() {
            return Err(EsiError::InvalidConfig("EVE_REDIRECT_URI must not be empty"));
        }
        if self.scopes.is_empty() {
            return Err(EsiError::InvalidConfig(
                "at least one ESI scope must be configured",
            ));
        }
        if self.datasource.trim().is_empty() {
            return Err(EsiError::InvalidConfig("datasource must not be empty"));
        }
        Ok(())
    }

    pub fn require_client_id(&self) -> EsiResult<&str> {
        non_empty(self.client_id.as_deref())
            .ok_or(EsiError::InvalidConfig("EVE_CLIENT_ID not configured"))
    }

    pub fn require_client_credentials(&self) -> EsiResult<(&str, &str)> {
        match (
            non_empty(self.client_id.as_deref()),
            non_empty(self.client_secret.as_deref()),
        ) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(EsiError::InvalidConfig(
                "EVE client credentials not configured",
            )),
        }
    }

    pub fn scopes_for_esi(&self) -> String {
        self.scopes.join(" ")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
