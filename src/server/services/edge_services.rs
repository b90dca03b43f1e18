use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    config::AppConfig,
    server::{
        error::Error,
        services::{
            link_resolver_services::LinkResolverService,
            stream_relay_services::StreamRelayService,
        },
        utils::fingerprint_utils::FingerprintTable,
    },
};

use super::{
    link_resolver_services::DynLinkResolverService, stream_relay_services::DynStreamRelayService,
};

/// everything a request handler needs, cloned into every request through an Extension. nothing
/// is shared between requests except the connection pool inside reqwest
#[derive(Clone)]
pub struct EdgeServices {
    pub resolver: DynLinkResolverService,
    pub relay: DynStreamRelayService,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting edge services...");

        let fingerprints = FingerprintTable::load(config.fingerprint_file.as_deref())
            .context("failed to build header fingerprint table")?;

        let fingerprint = fingerprints
            .get(&config.upstream_provider)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(config.upstream_provider.clone()))?;

        info!(
            "using {} header fingerprint, starting remaining services...",
            config.upstream_provider
        );

        // one pool for every upstream call. connect + idle read bounds only, a total timeout
        // would kill long playback sessions. the watch page gets its own total bound per request.
        // reqwest would carry our Host header across a cross-host redirect, so the services
        // follow 3xx themselves
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build upstream http client")?;

        let resolver = Arc::new(LinkResolverService::new(
            http.clone(),
            fingerprint.clone(),
            config.resolve_timeout(),
        )) as DynLinkResolverService;

        let relay = Arc::new(StreamRelayService::new(http, fingerprint))
            as DynStreamRelayService;

        Ok(Self {
            resolver,
            relay,
            config,
        })
    }

    /// swap the resolver, mostly so tests can hand in a mock
    pub fn with_resolver(mut self, resolver: DynLinkResolverService) -> Self {
        self.resolver = resolver;
        self
    }
}
