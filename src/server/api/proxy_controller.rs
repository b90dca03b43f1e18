// the dumb fallback. no identity, no range, whatever upstream says goes straight through
use axum::{
    Extension, Router,
    body::Body,
    extract::{Query, rejection::QueryRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::error;

use crate::server::{
    error::{AppResult, Error},
    services::edge_services::EdgeServices,
    utils::{relay_stream_utils::RelayStream, url_utils::decode_url_param},
};

const ENDPOINT: &str = "proxy";
const ERROR_LABEL: &str = "Proxy request failed";

#[derive(Deserialize)]
pub struct ProxyQuery {
    url: Option<String>,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/proxy", get(Self::proxy_get).options(Self::proxy_options))
    }

    async fn proxy_get(
        Extension(services): Extension<EdgeServices>,
        query: Result<Query<ProxyQuery>, QueryRejection>,
    ) -> Response {
        metrics::counter!("relay_requests_total", "endpoint" => ENDPOINT).increment(1);

        match Self::relay(&services, query).await {
            Ok(response) => response,
            Err(e) => {
                error!("Proxy error: {}", e);
                metrics::counter!("relay_errors_total", "endpoint" => ENDPOINT, "kind" => e.kind())
                    .increment(1);
                e.into_json_response(services.config.cargo_env, ERROR_LABEL)
            }
        }
    }

    async fn relay(
        services: &EdgeServices,
        query: Result<Query<ProxyQuery>, QueryRejection>,
    ) -> AppResult<Response> {
        let Query(params) = query.map_err(|e| Error::InvalidParameter(e.body_text()))?;
        let target = params.url.ok_or(Error::MissingParameter("url"))?;
        let target_url = decode_url_param(&target)?;

        let upstream = services.relay.passthrough(&target_url).await?;

        let mut builder = Response::builder().status(upstream.status());
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        builder
            .body(Body::from_stream(RelayStream::new(upstream, ENDPOINT)))
            .map_err(|e| {
                error!("Response building error in proxy: {}", e);
                Error::InternalServerErrorWithContext(format!("failed to build response: {e}"))
            })
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::OK
    }
}

/// connection-level headers that describe the upstream hop, not the payload
fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::TE
        || name == header::TRAILER
        || name == header::UPGRADE
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_headers() {
        assert!(is_hop_by_hop(&header::CONNECTION));
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&header::CONTENT_LENGTH));
        assert!(!is_hop_by_hop(&header::SET_COOKIE));
    }
}
