//! NetEase CC rooms scraped from `cc.163.com/{id}/`.
//!
//! Older room pages assign a `roomData` literal; newer ones are Next.js pages
//! carrying `__NEXT_DATA__`. Both are tried before the page title.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use livewatch_core::{Platform, StatusSnapshot};

use crate::extract::{
    self, bool_at, embedded_json, number_at, page_title, str_at, Extracted, Strategy,
};
use crate::http::{self, WINDOWS_CHROME_UA};
use crate::{FetchError, StatusSource};

const TIMEOUT: Duration = Duration::from_secs(10);

static ROOM_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+roomData\s*=\s*(\{[^;]+\});").expect("static regex"));
static NEXT_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<script id="__NEXT_DATA__"[^>]*>(\{.+?\})</script>"#).expect("static regex")
});

const STRATEGIES: &[Strategy] = &[room_data, next_data, title_fallback];

fn room_data(html: &str) -> Extracted {
    let Some(data) = embedded_json(&ROOM_DATA, html) else {
        return Extracted::default();
    };
    Extracted {
        is_live: number_at(&data, "/isLive").map(|flag| flag == 1.0),
        title: str_at(&data, "/title"),
        name: str_at(&data, "/nickname"),
        avatar: str_at(&data, "/purl"),
    }
}

fn next_data(html: &str) -> Extracted {
    let Some(data) = embedded_json(&NEXT_DATA, html) else {
        return Extracted::default();
    };
    Extracted {
        is_live: bool_at(&data, "/props/pageProps/roomInfo/isLive"),
        title: str_at(&data, "/props/pageProps/roomInfo/title"),
        name: str_at(&data, "/props/pageProps/roomInfo/nickname"),
        avatar: None,
    }
}

fn title_fallback(html: &str) -> Extracted {
    Extracted {
        title: page_title(html, &[]),
        ..Default::default()
    }
}

pub fn room_url(room_id: &str) -> String {
    format!("https://cc.163.com/{room_id}/")
}

pub(crate) fn parse_page(room_id: &str, html: &str) -> Result<StatusSnapshot, FetchError> {
    extract::run_chain(html, STRATEGIES).into_snapshot(Platform::Cc163, room_id, &room_url(room_id))
}

/// Markup-scraping adapter for NetEase CC.
#[derive(Debug, Clone)]
pub struct Cc163 {
    client: Client,
}

impl Cc163 {
    pub fn new() -> Result<Self, FetchError> {
        let client = http::build(http::client_builder(TIMEOUT, WINDOWS_CHROME_UA))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Cc163 {
    fn platform(&self) -> Platform {
        Platform::Cc163
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
