use axum::{
    Extension, Router,
    body::Body,
    extract::{Query, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    services::{edge_services::EdgeServices, link_resolver_services::ResolvedMedia},
    utils::{relay_stream_utils::RelayStream, url_utils::decode_url_param},
};

const ENDPOINT: &str = "stream";
const ERROR_LABEL: &str = "Failed to stream video";

#[derive(Deserialize)]
pub struct StreamQuery {
    url: Option<String>,
    // any non-empty value means the url is already the final file
    token: Option<String>,
}

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new().route(
            "/stream",
            get(Self::stream_get).options(Self::stream_options),
        )
    }

    async fn stream_get(
        Extension(services): Extension<EdgeServices>,
        query: Result<Query<StreamQuery>, QueryRejection>,
        headers: HeaderMap,
    ) -> Response {
        metrics::counter!("relay_requests_total", "endpoint" => ENDPOINT).increment(1);

        match Self::relay(&services, query, &headers).await {
            Ok(response) => response,
            Err(e) => {
                error!("Stream error: {}", e);
                metrics::counter!("relay_errors_total", "endpoint" => ENDPOINT, "kind" => e.kind())
                    .increment(1);
                e.into_json_response(services.config.cargo_env, ERROR_LABEL)
            }
        }
    }

    async fn relay(
        services: &EdgeServices,
        query: Result<Query<StreamQuery>, QueryRejection>,
        headers: &HeaderMap,
    ) -> AppResult<Response> {
        // a malformed query still gets the json envelope, not axum's plain text
        let Query(params) = query.map_err(|e| Error::InvalidParameter(e.body_text()))?;

        let source = params.url.ok_or(Error::MissingParameter("url"))?;
        let source_url = decode_url_param(&source)?;

        let bypass = params.token.as_deref().is_some_and(|t| !t.trim().is_empty());

        let target = if bypass {
            debug!("bypass token present, relaying {} directly", source_url);
            ResolvedMedia::direct(source_url)?
        } else {
            services.resolver.resolve(&source_url).await?
        };

        let range = headers.get(header::RANGE);
        let upstream = services.relay.open(&target, range).await?;

        // everything below has to be decided before the first body byte goes out
        let mut builder = Response::builder().header(
            header::CONTENT_TYPE,
            upstream
                .content_type
                .unwrap_or_else(|| HeaderValue::from_static("video/mp4")),
        );

        if let Some(length) = upstream.content_length {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }

        // open() already refused a ranged request that upstream didn't answer with a 206
        let mut status = StatusCode::OK;
        if upstream.partial {
            builder = builder.header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Some(content_range) = upstream.content_range {
                builder = builder.header(header::CONTENT_RANGE, content_range);
            }
            status = StatusCode::PARTIAL_CONTENT;
        }

        builder
            .status(status)
            .body(Body::from_stream(RelayStream::new(upstream.response, ENDPOINT)))
            .map_err(|e| {
                error!("Response building error in stream: {}", e);
                Error::InternalServerErrorWithContext(format!("failed to build response: {e}"))
            })
    }

    async fn stream_options() -> impl IntoResponse {
        // cors headers come from the layer in server/mod.rs
        StatusCode::OK
    }
}
