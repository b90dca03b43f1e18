// fake upstream used by the endpoint tests: a watch page with the player marker, one without, and
// a media file that understands ranges. every hit is recorded so tests can check what we sent
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;

use kitanime_edge::{AppConfig, CargoEnv, server::services::edge_services::EdgeServices};

pub const CONTENT_SIZE: usize = 10_000;

pub fn media_content() -> Vec<u8> {
    (0..CONTENT_SIZE).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub path: String,
    pub host: Option<String>,
    pub range: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
struct UpstreamState {
    port: u16,
    hits: Arc<Mutex<Vec<Hit>>>,
    // set once the endless media writer finds nobody reading anymore
    closed: Arc<AtomicBool>,
}

pub struct FakeUpstream {
    pub port: u16,
    hits: Arc<Mutex<Vec<Hit>>>,
    closed: Arc<AtomicBool>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let state = UpstreamState {
            port,
            hits: hits.clone(),
            closed: closed.clone(),
        };

        let app = Router::new()
            .route("/ep1", get(watch_page))
            .route("/ep-cdn", get(watch_page_other_host))
            .route("/empty", get(empty_page))
            .route("/huge", get(huge_page))
            .route("/moved", get(moved_page))
            .route("/v1.mp4", get(media))
            .route("/bare.mp4", get(bare_media))
            .route("/ignores-range.mp4", get(ignores_range))
            .route("/missing.mp4", get(missing))
            .route("/redir.mp4", get(redirected_media))
            .route("/loop.mp4", get(redirect_loop))
            .route("/endless.mp4", get(endless_media))
            .route("/teapot", get(teapot))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { port, hits, closed }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hits_for(&self, path: &str) -> Vec<Hit> {
        self.hits().into_iter().filter(|h| h.path == path).collect()
    }

    /// true once `/endless.mp4` failed to hand a chunk to its connection
    pub fn saw_close(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn services(cargo_env: CargoEnv) -> EdgeServices {
    let config = AppConfig {
        cargo_env,
        ..AppConfig::default()
    };
    EdgeServices::new(Arc::new(config)).unwrap()
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn record(state: &UpstreamState, req: &Request) {
    let headers = req.headers();
    state.hits.lock().unwrap().push(Hit {
        path: req.uri().path().to_string(),
        host: header_string(headers, header::HOST),
        range: header_string(headers, header::RANGE),
        referer: header_string(headers, header::REFERER),
        user_agent: header_string(headers, header::USER_AGENT),
    });
}

fn player_page(file: &str) -> String {
    format!(
        r#"<html><body><div id="player"></div><script>
        jwplayer("player").setup({{sources:[{{file:"{file}",type:"video/mp4"}}],autostart:false}});
        </script></body></html>"#
    )
}

async fn watch_page(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    let file = format!("http://127.0.0.1:{}/v1.mp4", state.port);
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        player_page(&file),
    )
}

async fn watch_page_other_host(
    State(state): State<UpstreamState>,
    req: Request,
) -> impl IntoResponse {
    record(&state, &req);
    let file = format!("http://localhost:{}/v1.mp4", state.port);
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        player_page(&file),
    )
}

async fn empty_page(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><body>this episode was removed</body></html>",
    )
}

fn parse_range(range: &str, total: usize) -> Option<(usize, usize)> {
    let rest = range.strip_prefix("bytes=")?;
    let (start, end) = rest.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = if end.is_empty() {
        total - 1
    } else {
        end.parse().ok()?
    };
    let end = end.min(total - 1);
    (start <= end).then_some((start, end))
}

async fn media(State(state): State<UpstreamState>, req: Request) -> Response {
    record(&state, &req);
    let content = media_content();
    let total = content.len();

    let range = header_string(req.headers(), header::RANGE);
    match range.as_deref().and_then(|r| parse_range(r, total)) {
        Some((start, end)) => Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, "video/webm")
            .header(header::ACCEPT_RANGES, "bytes")
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total),
            )
            .body(Body::from(content[start..=end].to_vec()))
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "video/webm")
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from(content))
            .unwrap(),
    }
}

// no content type at all, the relay has to fill one in
async fn bare_media(State(state): State<UpstreamState>, req: Request) -> Response {
    record(&state, &req);
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from(media_content()))
        .unwrap()
}

async fn ignores_range(State(state): State<UpstreamState>, req: Request) -> Response {
    record(&state, &req);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .body(Body::from(media_content()))
        .unwrap()
}

async fn missing(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (StatusCode::NOT_FOUND, "gone")
}

async fn teapot(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (
        StatusCode::IM_A_TEAPOT,
        [
            ("x-upstream", "yes"),
            ("access-control-allow-origin", "https://somewhere.else"),
        ],
        "short and stout",
    )
}

// bigger than any real watch page, with a marker at the very end
async fn huge_page(State(state): State<UpstreamState>, req: Request) -> Response {
    record(&state, &req);
    let filler = Bytes::from(vec![b' '; 64 * 1024]);
    let marker = Bytes::from(player_page(&format!("http://127.0.0.1:{}/v1.mp4", state.port)));

    let chunks = std::iter::repeat_n(filler, 48)
        .chain(std::iter::once(marker))
        .map(Ok::<_, std::io::Error>);

    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

// watch page that moved to another host name
async fn moved_page(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("http://localhost:{}/ep1", state.port))],
    )
}

// the cdn bouncing us to another host name, like signed edge urls do
async fn redirected_media(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("http://localhost:{}/v1.mp4", state.port))],
    )
}

async fn redirect_loop(State(state): State<UpstreamState>, req: Request) -> impl IntoResponse {
    record(&state, &req);
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, "/loop.mp4")])
}

// 1 KiB every 20ms forever, until the reader goes away
async fn endless_media(State(state): State<UpstreamState>, req: Request) -> Response {
    record(&state, &req);
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(1);

    let closed = state.closed.clone();
    tokio::spawn(async move {
        let chunk = Bytes::from(vec![7u8; 1024]);
        loop {
            if tx.send(Ok(chunk.clone())).await.is_err() {
                closed.store(true, Ordering::SeqCst);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .body(Body::from_stream(body))
        .unwrap()
}
