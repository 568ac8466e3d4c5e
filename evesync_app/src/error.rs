use evesync_core::TokenId;
use evesync_esi::{DisplayChainedError, EsiError};
use evesync_store::{StoreError, VaultError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("esi error: {0}")]
    Esi(#[from] EsiError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("missing authorization code")]
    MissingCode,

    #[error("token {0} has no refresh token")]
    MissingRefreshSecret(TokenId),

    #[error("token {0} has no verified character; verify it first")]
    MissingCharacterIdentity(TokenId),

    #[error("sync queue is not accepting jobs")]
    QueueClosed,
}

/// Coarse classification used to pick a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    BadRequest,
    Upstream,
    InvalidCiphertext,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MissingCode | Self::MissingRefreshSecret(_) | Self::MissingCharacterIdentity(_) => {
                ErrorKind::BadRequest
            }
            Self::QueueClosed => ErrorKind::Internal,
            Self::Store(StoreError::TokenNotFound(_)) => ErrorKind::NotFound,
            Self::Store(StoreError::Vault(VaultError::InvalidCiphertext)) => {
                ErrorKind::InvalidCiphertext
            }
            Self::Store(StoreError::Vault(VaultError::InvalidKey)) => ErrorKind::Configuration,
            Self::Store(_) => ErrorKind::Internal,
            Self::Esi(EsiError::InvalidConfig(_) | EsiError::InvalidUrl(_)) => {
                ErrorKind::Configuration
            }
            Self::Esi(_) => ErrorKind::Upstream,
        }
    }

    /// Upstream failures forward the provider's status when there was one.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Upstream => self.upstream_status().unwrap_or(502),
            ErrorKind::Configuration | ErrorKind::InvalidCiphertext | ErrorKind::Internal => 500,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Esi(err) => err.upstream_status(),
            _ => None,
        }
    }

    /// Only transient failures are worth another attempt. An upstream
    /// rejection below 500 (revoked token, missing scope) will not change.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::Upstream => self.upstream_status().is_none_or(|status| status >= 500),
            ErrorKind::Internal => !matches!(self, Self::QueueClosed),
            _ => false,
        }
    }

    pub fn display_chain(&self) -> DisplayChainedError<'_> {
        DisplayChainedError::new(self)
    }
}
