// the browser headers we pretend to be. upstreams bot-block on these every few months so they
// live in a table instead of being sprinkled through the relay code. a json file can override any
// provider without a rebuild:
//
// {
//   "desustream": {
//     "page_host": "desustream.info",
//     "page_headers": [["User-Agent", "..."], ["Accept", "..."]],
//     "media_headers": [["User-Agent", "..."]],
//     "media_referer": "https://www.youtube.com/"
//   }
// }
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

const CHROMIUM_138_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";
const DOCUMENT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const SEC_CH_UA: &str = r#""Not)A;Brand";v="8", "Chromium";v="138", "Brave";v="138""#;

/// raw provider entry, as written in the built-in table or the override file
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderFingerprintSpec {
    /// host header for the watch page, None means "whatever the url says"
    pub page_host: Option<String>,
    pub page_headers: Vec<(String, String)>,
    pub media_headers: Vec<(String, String)>,
    pub media_referer: Option<String>,
}

/// validated header sets for a single upstream provider
#[derive(Debug, Clone)]
pub struct ProviderFingerprint {
    pub page_host: Option<HeaderValue>,
    pub page: HeaderMap,
    pub media: HeaderMap,
}

impl ProviderFingerprint {
    fn build(name: &str, spec: ProviderFingerprintSpec) -> anyhow::Result<Self> {
        let page_host = spec
            .page_host
            .map(|h| HeaderValue::from_str(&h))
            .transpose()
            .with_context(|| format!("invalid page_host for provider {name}"))?;

        let page = header_map(&spec.page_headers)
            .with_context(|| format!("invalid page_headers for provider {name}"))?;
        let mut media = header_map(&spec.media_headers)
            .with_context(|| format!("invalid media_headers for provider {name}"))?;

        if let Some(referer) = spec.media_referer {
            media.insert(
                header::REFERER,
                HeaderValue::from_str(&referer)
                    .with_context(|| format!("invalid media_referer for provider {name}"))?,
            );
        }

        // compressed bodies would break byte ranges, we only ever relay raw file bytes
        media.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        // host and range are per request, never from the table
        media.remove(header::HOST);
        media.remove(header::RANGE);

        Ok(Self {
            page_host,
            page,
            media,
        })
    }
}

fn header_map(pairs: &[(String, String)]) -> anyhow::Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("bad header name {name:?}"))?;
        let value =
            HeaderValue::from_str(value).with_context(|| format!("bad header value for {name}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// the brave/chromium 138 set desustream was happy with
fn desustream() -> ProviderFingerprintSpec {
    ProviderFingerprintSpec {
        page_host: Some("desustream.info".to_string()),
        page_headers: pairs(&[
            ("Accept", DOCUMENT_ACCEPT),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
            ("Upgrade-Insecure-Requests", "1"),
            ("User-Agent", CHROMIUM_138_UA),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-GPC", "1"),
            ("Sec-CH-UA", SEC_CH_UA),
            ("Sec-CH-UA-Mobile", "?0"),
            ("Sec-CH-UA-Platform", "\"Windows\""),
        ]),
        media_headers: pairs(&[
            ("Accept", DOCUMENT_ACCEPT),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
            ("Upgrade-Insecure-Requests", "1"),
            ("User-Agent", CHROMIUM_138_UA),
            ("Sec-CH-UA", SEC_CH_UA),
            ("Sec-CH-UA-Mobile", "?0"),
            ("Sec-CH-UA-Platform", "\"Windows\""),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-GPC", "1"),
        ]),
        // looks like someone clicked through from a video site
        media_referer: Some("https://www.youtube.com/".to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintTable {
    providers: HashMap<String, ProviderFingerprint>,
}

impl FingerprintTable {
    pub fn built_in() -> anyhow::Result<Self> {
        Self::from_specs(HashMap::from([("desustream".to_string(), desustream())]))
    }

    /// built-in table with the providers in `path` layered on top
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut specs = HashMap::from([("desustream".to_string(), desustream())]);

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fingerprint file {}", path.display()))?;
            let overrides: HashMap<String, ProviderFingerprintSpec> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse fingerprint file {}", path.display()))?;

            info!(
                "loaded {} provider fingerprint(s) from {}",
                overrides.len(),
                path.display()
            );
            specs.extend(overrides);
        }

        Self::from_specs(specs)
    }

    fn from_specs(specs: HashMap<String, ProviderFingerprintSpec>) -> anyhow::Result<Self> {
        let mut providers = HashMap::with_capacity(specs.len());
        for (name, spec) in specs {
            let fingerprint = ProviderFingerprint::build(&name, spec)?;
            debug!(
                "provider {}: {} page headers, {} media headers",
                name,
                fingerprint.page.len(),
                fingerprint.media.len()
            );
            providers.insert(name, fingerprint);
        }
        Ok(Self { providers })
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderFingerprint> {
        self.providers.get(provider)
    }
}
