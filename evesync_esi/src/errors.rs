use std::fmt;

use thiserror::Error;

pub type EsiResult<T> = Result<T, EsiError>;

#[derive(Debug, Error)]
pub enum EsiError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http client failure")]
    Http(#[from] reqwest::Error),
    #[error("sso rejected the request with status {status}: {body}")]
    UpstreamAuth { status: u16, body: String },
    #[error("esi data request failed ({}): {body}", status_label(.status))]
    UpstreamFetch { status: Option<u16>, body: String },
    #[error("response body could not be decoded")]
    Decode(#[from] serde_json::Error),
}

impl EsiError {
    pub fn display_chain(&self) -> DisplayChainedError<'_> {
        DisplayChainedError { inner: self }
    }

    /// Status reported by the upstream service, when the failure came from one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamAuth { status, .. } => Some(*status),
            Self::UpstreamFetch { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!("status {status}"),
        None => "no response".to_owned(),
    }
}

pub struct DisplayChainedError<'a> {
    inner: &'a (dyn std::error::Error + 'static),
}

impl<'a> DisplayChainedError<'a> {
    pub fn new(inner: &'a (dyn std::error::Error + 'static)) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for DisplayChainedError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self.inner);

        while let Some(err) = current {
            if first {
                first = false;
            } else {
                write!(f, " -> ")?;
            }

            write!(f, "{err}")?;
            current = err.source();
        }

        Ok(())
    }
}

impl fmt::Display for DisplayChainedError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
