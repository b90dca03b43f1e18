// turns a watch page into the file the embedded player would have loaded
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header;
use tracing::{debug, error, info};
use url::Url;

use crate::server::{
    error::ResolutionError,
    utils::fingerprint_utils::ProviderFingerprint,
    utils::url_utils::{MAX_REDIRECTS, hostname, redirect_target},
};

pub type DynLinkResolverService = Arc<dyn LinkResolverTrait + Send + Sync>;

/// watch pages are a few hundred KiB at most, anything past this isn't a player page
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

// the player config is inlined js, something like `sources:[{file:"https://..."}]`
static FILE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"file:"([^"]+)""#).expect("file marker regex is valid")
});

/// outcome of scanning a watch page for the player's file reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    Found(String),
    NotFound,
}

pub fn extract_media_reference(body: &str) -> MediaReference {
    match FILE_MARKER.captures(body).and_then(|c| c.get(1)) {
        Some(m) => MediaReference::Found(m.as_str().to_string()),
        None => MediaReference::NotFound,
    }
}

/// the media url plus the host we claim to be talking to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_url: Url,
    pub media_host: String,
}

impl ResolvedMedia {
    /// for links that are already the final file (bypass token), no scraping needed
    pub fn direct(media_url: Url) -> Result<Self, ResolutionError> {
        let media_host =
            hostname(&media_url).ok_or_else(|| ResolutionError::MissingHost(media_url.to_string()))?;
        Ok(Self {
            media_url,
            media_host,
        })
    }

    fn from_reference(reference: &str) -> Result<Self, ResolutionError> {
        let media_url = Url::parse(reference)
            .map_err(|e| ResolutionError::InvalidMediaUrl(format!("{reference}: {e}")))?;
        Self::direct(media_url)
    }
}

#[automock]
#[async_trait]
pub trait LinkResolverTrait {
    async fn resolve(&self, source_url: &Url) -> Result<ResolvedMedia, ResolutionError>;
}

pub struct LinkResolverService {
    http: reqwest::Client,
    fingerprint: ProviderFingerprint,
    timeout: Duration,
}

impl LinkResolverService {
    pub fn new(http: reqwest::Client, fingerprint: ProviderFingerprint, timeout: Duration) -> Self {
        Self {
            http,
            fingerprint,
            timeout,
        }
    }
}

/// collects the page body, giving up as soon as it grows past `limit`
async fn read_page(mut response: reqwest::Response, limit: usize) -> Result<String, ResolutionError> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(ResolutionError::PageTooLarge(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(ResolutionError::PageFetch)? {
        if body.len() + chunk.len() > limit {
            return Err(ResolutionError::PageTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[async_trait]
impl LinkResolverTrait for LinkResolverService {
    async fn resolve(&self, source_url: &Url) -> Result<ResolvedMedia, ResolutionError> {
        info!("resolving watch page {}", source_url);

        // one budget for the whole redirect chain
        let deadline = Instant::now() + self.timeout;
        let mut page_url = source_url.clone();
        let mut hops = 0;

        let response = loop {
            let mut request = self
                .http
                .get(page_url.clone())
                .headers(self.fingerprint.page.clone())
                .timeout(deadline.saturating_duration_since(Instant::now()));

            // the provider host belongs to the url we were handed, later hops use their own
            if hops == 0 {
                if let Some(host) = &self.fingerprint.page_host {
                    request = request.header(header::HOST, host.clone());
                }
            }

            let response = request.send().await.map_err(|e| {
                error!("watch page request failed: {}", e);
                ResolutionError::PageFetch(e)
            })?;

            let next = redirect_target(&page_url, response.status(), response.headers())
                .map_err(ResolutionError::PageRedirect)?;
            match next {
                Some(_) if hops >= MAX_REDIRECTS => {
                    error!("watch page {} redirects too often", source_url);
                    return Err(ResolutionError::PageRedirect(format!(
                        "more than {MAX_REDIRECTS} redirects"
                    )));
                }
                Some(next) => {
                    debug!("watch page {} redirected to {}", page_url, next);
                    page_url = next;
                    hops += 1;
                }
                None => break response,
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("watch page {} returned {}", page_url, status);
            return Err(ResolutionError::PageStatus(status));
        }

        let body = read_page(response, MAX_PAGE_BYTES).await.inspect_err(|e| {
            error!("failed to read watch page body: {}", e);
        })?;
        debug!("watch page body is {} bytes", body.len());

        match extract_media_reference(&body) {
            MediaReference::Found(reference) => {
                let resolved = ResolvedMedia::from_reference(&reference)?;
                debug!(
                    "resolved {} -> {} (host {})",
                    source_url, resolved.media_url, resolved.media_host
                );
                Ok(resolved)
            }
            MediaReference::NotFound => {
                error!("no file marker in watch page {}", source_url);
                Err(ResolutionError::MarkerNotFound)
            }
        }
    }
}
