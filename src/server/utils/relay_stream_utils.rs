use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures::Stream;
use tracing::{debug, warn};

type UpstreamBytes = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// wraps the upstream body so we can tell the three endings apart: upstream finished, upstream
/// died halfway, or the client went away. hyper drops the body when the client disconnects,
/// which drops the reqwest response and closes the upstream socket with it
pub struct RelayStream {
    inner: UpstreamBytes,
    endpoint: &'static str,
    upstream: String,
    relayed: u64,
    finished: bool,
}

impl RelayStream {
    pub fn new(response: reqwest::Response, endpoint: &'static str) -> Self {
        let upstream = response.url().to_string();
        Self {
            inner: Box::pin(response.bytes_stream()),
            endpoint,
            upstream,
            relayed: 0,
            finished: false,
        }
    }

    pub fn relayed(&self) -> u64 {
        self.relayed
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // every field is Unpin, the inner stream is already boxed
        let this = &mut *self;

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.relayed += chunk.len() as u64;
                metrics::counter!("relay_bytes_total", "endpoint" => this.endpoint)
                    .increment(chunk.len() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // headers are long gone, all we can do is cut the connection
                this.finished = true;
                warn!(
                    target: "relay::midstream",
                    "upstream {} failed after {} bytes on {}: {}",
                    this.upstream, this.relayed, this.endpoint, e
                );
                metrics::counter!("relay_errors_total", "endpoint" => this.endpoint, "kind" => "midstream")
                    .increment(1);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if !this.finished {
                    this.finished = true;
                    debug!(
                        "relay of {} complete, {} bytes on {}",
                        this.upstream, this.relayed, this.endpoint
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                "client left {} after {} bytes, aborting upstream {}",
                self.endpoint, self.relayed, self.upstream
            );
        }
    }
}
