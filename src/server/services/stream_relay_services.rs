use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, error};
use url::Url;

use crate::server::{
    error::UpstreamFetchError,
    services::link_resolver_services::ResolvedMedia,
    utils::{
        fingerprint_utils::ProviderFingerprint,
        url_utils::{MAX_REDIRECTS, hostname, redirect_target},
    },
};

pub type DynStreamRelayService = Arc<dyn StreamRelayTrait + Send + Sync>;

/// upstream media response that has passed the status check but whose body hasn't been touched
pub struct UpstreamMedia {
    pub response: reqwest::Response,
    pub partial: bool,
    pub content_type: Option<HeaderValue>,
    pub content_range: Option<HeaderValue>,
    pub content_length: Option<HeaderValue>,
}

impl UpstreamMedia {
    /// `ranged` says whether the client asked for a range. a ranged answer that isn't a real
    /// 206 with `Content-Range` is refused here, before any body byte is relayed
    fn from_response(response: reqwest::Response, ranged: bool) -> Result<Self, UpstreamFetchError> {
        let headers = response.headers();
        let content_type = headers.get(header::CONTENT_TYPE).cloned();
        let content_range = headers.get(header::CONTENT_RANGE).cloned();
        let content_length = headers.get(header::CONTENT_LENGTH).cloned();

        let honoured = response.status() == StatusCode::PARTIAL_CONTENT && content_range.is_some();
        if ranged && !honoured {
            return Err(UpstreamFetchError::RangeIgnored(response.status()));
        }
        let partial = ranged;

        Ok(Self {
            response,
            partial,
            content_type,
            content_range,
            content_length,
        })
    }
}

#[async_trait]
pub trait StreamRelayTrait {
    /// media fetch with the provider's browser identity and the client's range
    async fn open(
        &self,
        target: &ResolvedMedia,
        range: Option<&HeaderValue>,
    ) -> Result<UpstreamMedia, UpstreamFetchError>;

    /// bare get, no identity and no range. any status is handed back to the caller
    async fn passthrough(&self, url: &Url) -> Result<reqwest::Response, UpstreamFetchError>;
}

pub struct StreamRelayService {
    http: reqwest::Client,
    fingerprint: ProviderFingerprint,
}

impl StreamRelayService {
    pub fn new(http: reqwest::Client, fingerprint: ProviderFingerprint) -> Self {
        Self { http, fingerprint }
    }

    fn media_headers(&self, host: &str, range: Option<&HeaderValue>) -> HeaderMap {
        let mut headers = self.fingerprint.media.clone();

        // the host of the url this hop goes to, never the watch page's host
        if let Ok(host) = HeaderValue::from_str(host) {
            headers.insert(header::HOST, host);
        }

        if let Some(range) = range {
            headers.insert(header::RANGE, range.clone());
        }

        headers
    }
}

/// next url after a redirect answer, or None when `response` is the final one
fn next_hop(
    current: &Url,
    response: &reqwest::Response,
    hops: usize,
) -> Result<Option<Url>, UpstreamFetchError> {
    let next = redirect_target(current, response.status(), response.headers())
        .map_err(UpstreamFetchError::Redirect)?;

    match next {
        Some(_) if hops >= MAX_REDIRECTS => Err(UpstreamFetchError::Redirect(format!(
            "more than {MAX_REDIRECTS} redirects from {current}"
        ))),
        Some(next) => {
            debug!("{} redirected ({}) to {}", current, response.status(), next);
            Ok(Some(next))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl StreamRelayTrait for StreamRelayService {
    async fn open(
        &self,
        target: &ResolvedMedia,
        range: Option<&HeaderValue>,
    ) -> Result<UpstreamMedia, UpstreamFetchError> {
        debug!(
            "opening {} (host {}, range {:?})",
            target.media_url, target.media_host, range
        );

        let mut url = target.media_url.clone();
        let mut host = target.media_host.clone();
        let mut hops = 0;

        let response = loop {
            let response = self
                .http
                .get(url.clone())
                .headers(self.media_headers(&host, range))
                .send()
                .await
                .map_err(|e| {
                    error!("media request failed: {}", e);
                    UpstreamFetchError::Request(e)
                })?;

            match next_hop(&url, &response, hops)? {
                Some(next) => {
                    host = hostname(&next).ok_or_else(|| {
                        UpstreamFetchError::Redirect(format!("no host in {next}"))
                    })?;
                    url = next;
                    hops += 1;
                }
                None => break response,
            }
        };

        let status = response.status();
        if !status.is_success() {
            // 416 lands here too, the player will retry without a range
            error!("media upstream {} returned {}", url, status);
            return Err(UpstreamFetchError::Status(status));
        }

        UpstreamMedia::from_response(response, range.is_some()).inspect_err(|e| {
            error!("media upstream {}: {}", url, e);
        })
    }

    async fn passthrough(&self, url: &Url) -> Result<reqwest::Response, UpstreamFetchError> {
        debug!("passthrough {}", url);

        let mut url = url.clone();
        let mut hops = 0;

        loop {
            let response = self.http.get(url.clone()).send().await.map_err(|e| {
                error!("proxy request failed: {}", e);
                UpstreamFetchError::Request(e)
            })?;

            match next_hop(&url, &response, hops)? {
                Some(next) => {
                    url = next;
                    hops += 1;
                }
                None => return Ok(response),
            }
        }
    }
}
