//! Douyin live rooms scraped from `live.douyin.com`.
//!
//! The room page renders server-side state into inline scripts. There is no
//! stable embedded blob name, so every field comes from an individual regex.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use livewatch_core::{Platform, StatusSnapshot};

use crate::extract::{self, capture, page_title, Extracted, Strategy};
use crate::http::{self, ACCEPT_HTML, WINDOWS_CHROME_UA};
use crate::{FetchError, StatusSource};

const TIMEOUT: Duration = Duration::from_secs(15);

/// Without a nonce cookie the page is an anti-bot interstitial.
const NONCE_COOKIE: &str = "__ac_nonce=0123456789";

const TITLE_SUFFIXES: &[&str] = &[" - 抖音直播", "_抖音直播"];

static LIVE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""status":2\b|"alive":true"#).expect("static regex"));
static NICKNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""nickname":"([^"]+)""#).expect("static regex"));
static AVATAR_THUMB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""avatar_thumb":\{"url_list":\["([^"]+)""#).expect("static regex"));

const STRATEGIES: &[Strategy] = &[marker_fields, title_fallback];

fn marker_fields(html: &str) -> Extracted {
    Extracted {
        is_live: LIVE_MARKER.is_match(html).then_some(true),
        title: None,
        name: capture(&NICKNAME, html).map(str::to_string),
        avatar: capture(&AVATAR_THUMB, html).map(|url| url.replace("\\u0026", "&")),
    }
}

fn title_fallback(html: &str) -> Extracted {
    Extracted {
        title: page_title(html, TITLE_SUFFIXES),
        ..Default::default()
    }
}

pub fn room_url(room_id: &str) -> String {
    format!("https://live.douyin.com/{room_id}")
}

pub(crate) fn parse_page(room_id: &str, html: &str) -> Result<StatusSnapshot, FetchError> {
    extract::run_chain(html, STRATEGIES).into_snapshot(
        Platform::Douyin,
        room_id,
        &room_url(room_id),
    )
}

/// Markup-scraping adapter for Douyin.
#[derive(Debug, Clone)]
pub struct Douyin {
    client: Client,
}

impl Douyin {
    pub fn new() -> Result<Self, FetchError> {
        let client = http::build(http::client_builder(TIMEOUT, WINDOWS_CHROME_UA))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Douyin {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let request = self
            .client
            .get(room_url(room_id))
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
            .header(COOKIE, NONCE_COOKIE);
        let html = http::get_text(request, cancel).await?;
        parse_page(room_id, &html)
    }
}
