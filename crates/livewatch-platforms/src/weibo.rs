//! Weibo live rooms scraped from the `wblive` show page.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use livewatch_core::{Platform, StatusSnapshot};

use crate::extract::{self, embedded_json, number_at, page_title, str_at, Extracted, Strategy};
use crate::http::{self, ACCEPT_HTML, WINDOWS_CHROME_UA};
use crate::{FetchError, StatusSource};

const TIMEOUT: Duration = Duration::from_secs(10);

static INITIAL_STATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<script>window\.__INITIAL_STATE__\s*=\s*(\{.+?\});</script>")
        .expect("static regex")
});
static LIVE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""status":\s*1\b|"living":\s*true"#).expect("static regex"));

const STRATEGIES: &[Strategy] = &[initial_state, live_marker, title_fallback];

fn initial_state(html: &str) -> Extracted {
    let Some(state) = embedded_json(&INITIAL_STATE, html) else {
        return Extracted::default();
    };
    Extracted {
        is_live: number_at(&state, "/liveInfo/status").map(|status| status == 1.0),
        title: str_at(&state, "/liveInfo/title"),
        name: str_at(&state, "/userInfo/screen_name"),
        avatar: str_at(&state, "/userInfo/avatar_large"),
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
        title: page_title(html, &[]),
        ..Default::default()
    }
}

pub fn room_url(room_id: &str) -> String {
    format!("https://weibo.com/l/wblive/p/show/{room_id}")
}

pub(crate) fn parse_page(room_id: &str, html: &str) -> Result<StatusSnapshot, FetchError> {
    extract::run_chain(html, STRATEGIES).into_snapshot(Platform::Weibo, room_id, &room_url(room_id))
}

/// Markup-scraping adapter for Weibo.
#[derive(Debug, Clone)]
pub struct Weibo {
    client: Client,
}

impl Weibo {
    pub fn new() -> Result<Self, FetchError> {
        let client = http::build(http::client_builder(TIMEOUT, WINDOWS_CHROME_UA))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Weibo {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let request = self.client.get(room_url(room_id)).header(ACCEPT, ACCEPT_HTML);
        let html = http::get_text(request, cancel).await?;
        parse_page(room_id, &html)
    }
}
