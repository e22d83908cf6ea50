//! Douyu rooms via the `betard` room endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use livewatch_core::{non_empty, Platform, StatusSnapshot};

use crate::http::{self, WINDOWS_CHROME_UA};
use crate::{FetchError, StatusSource};

const TIMEOUT: Duration = Duration::from_secs(10);

/// `show_status` value for a room that is broadcasting. `2` is offline.
const SHOW_STATUS_LIVE: i64 = 1;

#[derive(Debug, Deserialize)]
pub(crate) struct BetardEnvelope {
    error: i64,
    #[serde(default)]
    room: BetardRoom,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BetardRoom {
    room_name: String,
    nickname: String,
    avatar: BetardAvatar,
    avatar_mid: String,
    show_status: i64,
    online: i64,
    show_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BetardAvatar {
    middle: String,
}

pub fn room_url(room_id: &str) -> String {
    format!("https://www.douyu.com/{room_id}")
}

pub(crate) fn parse_betard(
    room_id: &str,
    envelope: BetardEnvelope,
) -> Result<StatusSnapshot, FetchError> {
    if envelope.error != 0 {
        return Err(FetchError::Api {
            platform: Platform::Douyu.as_str(),
            code: envelope.error,
            message: format!("betard error {}", envelope.error),
        });
    }

    let room = envelope.room;
    let avatar = non_empty(Some(room.avatar_mid.as_str()))
        .or_else(|| non_empty(Some(room.avatar.middle.as_str())));

    let mut snapshot = StatusSnapshot::new(Platform::Douyu, room_id, room_url(room_id));
    snapshot.is_live = room.show_status == SHOW_STATUS_LIVE;
    snapshot.title = room.room_name.clone();
    snapshot.name = non_empty(Some(room.nickname.as_str())).map(str::to_string);
    snapshot.avatar = avatar.map(str::to_string);
    snapshot.viewer_count = Some(room.online);
    if room.show_time > 0 {
        snapshot.start_time = Utc.timestamp_opt(room.show_time, 0).single();
    }
    Ok(snapshot)
}

/// Structured-API adapter for Douyu.
#[derive(Debug, Clone)]
pub struct Douyu {
    client: Client,
}

impl Douyu {
    pub fn new() -> Result<Self, FetchError> {
        let client = http::build(http::client_builder(TIMEOUT, WINDOWS_CHROME_UA))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Douyu {
    fn platform(&self) -> Platform {
        Platform::Douyu
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let url = format!("https://www.douyu.com/betard/{room_id}");
        let envelope: BetardEnvelope = http::get_json(self.client.get(url), cancel).await?;
        parse_betard(room_id, envelope)
    }
}
