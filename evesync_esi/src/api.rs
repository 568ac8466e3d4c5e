use async_trait::async_trait;
use evesync_core::{AssetPayload, CharacterId, IndustryJobPayload, PayloadError};
use reqwest::header::HeaderMap;
use serde_json::value::RawValue;

use crate::{EsiError, EsiResult, config::EsiConfig};

const PAGES_HEADER: &str = "x-pages";

/// Authenticated reads of a character's remote resources.
///
/// Implementations never retry: one failed request fails the whole call and
/// the caller decides whether to run it again.
#[async_trait]
pub trait EsiApiClient: Send + Sync {
    async fn fetch_assets_all_pages(
        &self,
        character_id: CharacterId,
        access_token: &str,
    ) -> EsiResult<Vec<AssetPayload>>;

    async fn fetch_industry_jobs(
        &self,
        character_id: CharacterId,
        access_token: &str,
    ) -> EsiResult<Vec<IndustryJobPayload>>;
}

pub struct HttpEsiClient {
    http: reqwest::Client,
    base_url: String,
    datasource: String,
}

impl HttpEsiClient {
    pub fn new(config: &EsiConfig) -> EsiResult<Self> {
        config.validate()?;
        Ok(Self {
            http: crate::build_http_client(config.user_agent.as_deref())?,
            base_url: config
                .endpoints
                .esi_base_url
                .trim_end_matches('/')
                .to_owned(),
            datasource: config.datasource.clone(),
        })
    }

    fn character_url(&self, character_id: CharacterId, resource: &str) -> String {
        format!("{}/characters/{character_id}/{resource}", self.base_url)
    }

    /// Fetches one page and parses every element. A body that is not a JSON
    /// array of well-formed elements fails the page like an error status does.
    async fn get_page<T>(
        &self,
        url: &str,
        access_token: &str,
        page: Option<u32>,
        parse: impl Fn(&RawValue) -> Result<T, PayloadError>,
    ) -> EsiResult<(Vec<T>, u32)> {
        let mut request = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[("datasource", self.datasource.as_str())]);
        if let Some(page) = page {
            request = request.query(&[("page", page)]);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();
        let pages = page_count(response.headers());
        let body = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            return Err(EsiError::UpstreamFetch {
                status: Some(status.as_u16()),
                body,
            });
        }

        match parse_elements(&body, parse) {
            Ok(items) => Ok((items, pages)),
            Err(reason) => {
                log::debug!("undecodable esi page from {url} ({status}): {reason}");
                Err(EsiError::UpstreamFetch {
                    status: Some(status.as_u16()),
                    body,
                })
            }
        }
    }
}

fn parse_elements<T>(
    body: &str,
    parse: impl Fn(&RawValue) -> Result<T, PayloadError>,
) -> Result<Vec<T>, String> {
    let elements: Vec<Box<RawValue>> =
        serde_json::from_str(body).map_err(|err| err.to_string())?;
    elements
        .iter()
        .map(|element| parse(&**element).map_err(|err| err.to_string()))
        .collect()
}

#[async_trait]
impl EsiApiClient for HttpEsiClient {
    async fn fetch_assets_all_pages(
        &self,
        character_id: CharacterId,
        access_token: &str,
    ) -> EsiResult<Vec<AssetPayload>> {
        let url = self.character_url(character_id, "assets/");
        let mut assets = Vec::new();
        let mut page = 1_u32;

        loop {
            let (items, pages) = self
                .get_page(&url, access_token, Some(page), AssetPayload::from_raw)
                .await?;
            log::trace!(
                "fetched asset page {page}/{pages} for character {character_id} ({} items)",
                items.len()
            );
            assets.extend(items);

            if page >= pages {
                break;
            }
            page += 1;
        }

        log::debug!(
            "fetched {} assets across {page} page(s) for character {character_id}",
            assets.len()
        );
        Ok(assets)
    }

    async fn fetch_industry_jobs(
        &self,
        character_id: CharacterId,
        access_token: &str,
    ) -> EsiResult<Vec<IndustryJobPayload>> {
        let url = self.character_url(character_id, "industry/jobs/");
        let (jobs, _) = self
            .get_page(&url, access_token, None, IndustryJobPayload::from_raw)
            .await?;

        log::debug!(
            "fetched {} industry jobs for character {character_id}",
            jobs.len()
        );
        Ok(jobs)
    }
}

/// Page count advertised by ESI; a missing or garbled header means one page.
fn page_count(headers: &HeaderMap) -> u32 {
    headers
        .get(PAGES_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(1)
        .max(1)
}

fn transport_failure(err: reqwest::Error) -> EsiError {
    EsiError::UpstreamFetch {
        status: err.status().map(|status| status.as_u16()),
        body: err.to_string(),
    }
}
