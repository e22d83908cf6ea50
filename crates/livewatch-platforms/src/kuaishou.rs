//! Kuaishou live rooms scraped from `live.kuaishou.com/u/{id}`.
//!
//! Kuaishou fingerprints clients aggressively: the request must carry the full
//! set of headers a desktop Chrome navigation sends, over TLS 1.2 or newer,
//! on a fresh connection each time.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL,
    UPGRADE_INSECURE_REQUESTS,
};
use reqwest::{tls, Client};
use tokio_util::sync::CancellationToken;

use livewatch_core::{Platform, StatusSnapshot};

use crate::extract::{self, bool_at, embedded_json, page_title, str_at, Extracted, Strategy};
use crate::http::{self, MAC_CHROME_UA};
use crate::{FetchError, StatusSource};

const TIMEOUT: Duration = Duration::from_secs(30);

const TITLE_SUFFIXES: &[&str] = &[" - 快手直播", " - 快手"];

static INITIAL_STATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__INITIAL_STATE__\s*=\s*(\{.+?\});").expect("static regex"));
static LIVE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""living":true|"isLiving":true"#).expect("static regex"));

const STRATEGIES: &[Strategy] = &[initial_state, live_marker, title_fallback];

fn initial_state(html: &str) -> Extracted {
    let Some(state) = embedded_json(&INITIAL_STATE, html) else {
        return Extracted::default();
    };
    Extracted {
        is_live: bool_at(&state, "/liveStream/living"),
        title: str_at(&state, "/liveStream/caption"),
        name: str_at(&state, "/author/name"),
        avatar: str_at(&state, "/author/avatar"),
    }
}

fn live_marker(html: &str) -> Extracted {
    Extracted {
        is_live: LIVE_MARKER.is_match(html).then_some(true),
        ..Default::default()
    }
}

fn title_fallback(html: &str) -> Extracted {
    Extracted {
        title: page_title(html, TITLE_SUFFIXES),
        ..Default::default()
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    let fetch_metadata = [
        ("sec-ch-ua", r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""macOS""#),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
    ];
    for (name, value) in fetch_metadata {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

pub fn room_url(room_id: &str) -> String {
    format!("https://live.kuaishou.com/u/{room_id}")
}

pub(crate) fn parse_page(room_id: &str, html: &str) -> Result<StatusSnapshot, FetchError> {
    extract::run_chain(html, STRATEGIES).into_snapshot(
        Platform::Kuaishou,
        room_id,
        &room_url(room_id),
    )
}

/// Markup-scraping adapter for Kuaishou.
#[derive(Debug, Clone)]
pub struct Kuaishou {
    client: Client,
}

impl Kuaishou {
    pub fn new() -> Result<Self, FetchError> {
        let builder = http::client_builder(TIMEOUT, MAC_CHROME_UA)
            .default_headers(browser_headers())
            .pool_max_idle_per_host(0)
            .min_tls_version(tls::Version::TLS_1_2);
        let client = http::build(builder)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Kuaishou {
    fn platform(&self) -> Platform {
        Platform::Kuaishou
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let html = http::get_text(self.client.get(room_url(room_id)), cancel).await?;
        parse_page(room_id, &html)
    }
}
