use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::{
    StatusCode,
    header::{self, HeaderMap},
};
use tracing::error;
use url::Url;

use crate::server::error::{AppResult, Error};

/// players either hand us a plain url or an unpadded url-safe base64 of one (keeps `&` and `?`
/// from the upstream url out of our own query string)
pub fn decode_url_param(url_param: &str) -> AppResult<Url> {
    let trimmed = url_param.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingParameter("url"));
    }

    let raw = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        // tolerate padding, some clients add it back
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed.trim_end_matches('='))
            .map_err(|e| {
                error!("Failed to decode base64 url: {}", e);
                Error::InvalidParameter("not a url or url-safe base64".to_string())
            })?;

        String::from_utf8(bytes).map_err(|e| {
            error!("Failed to parse UTF-8: {}", e);
            Error::InvalidParameter("decoded url is not utf-8".to_string())
        })?
    };

    let url = Url::parse(&raw).map_err(|e| Error::InvalidParameter(e.to_string()))?;

    let supported = matches!(url.scheme(), "http" | "https") && url.host_str().is_some();
    if !supported {
        return Err(Error::InvalidParameter(format!("unsupported url {}", url.as_str())));
    }

    Ok(url)
}

/// hostname only, the same thing a browser would put in `location.hostname`
pub fn hostname(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_string())
}

/// hops we follow before giving up on an upstream
pub const MAX_REDIRECTS: usize = 10;

/// where a 3xx answer sends us next, resolved against the url that gave it. `Ok(None)` means the
/// response is final (not a redirect, or a redirect without `Location`, which goes back as is).
/// redirects are followed by hand so the `Host` header can be recomputed for every hop
pub fn redirect_target(
    current: &Url,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<Url>, String> {
    let redirect = matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    );
    if !redirect {
        return Ok(None);
    }

    let Some(location) = headers.get(header::LOCATION) else {
        return Ok(None);
    };

    let location = location
        .to_str()
        .map_err(|_| format!("unreadable location header from {current}"))?;
    let next = current
        .join(location)
        .map_err(|e| format!("bad location {location:?} from {current}: {e}"))?;

    if !matches!(next.scheme(), "http" | "https") || next.host_str().is_none() {
        return Err(format!("refusing redirect to {next}"));
    }

    Ok(Some(next))
}
