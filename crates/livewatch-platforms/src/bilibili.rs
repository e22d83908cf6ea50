//! Bilibili live rooms via the public room API.
//!
//! ```text
//! GET room/v1/Room/get_info?room_id=N              (required)
//!   code, data.{title, live_status, online, live_start_time}
//! GET live_user/v1/UserInfo/get_anchor_in_room?roomid=N   (best effort)
//!   code, data.info.{uname, face}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use livewatch_core::{non_empty, Platform, StatusSnapshot};

use crate::http::{self, WINDOWS_CHROME_UA};
use crate::{FetchError, StatusSource};

const ROOM_INFO_URL: &str = "https://api.live.bilibili.com/room/v1/Room/get_info";
const ANCHOR_URL: &str = "https://api.live.bilibili.com/live_user/v1/UserInfo/get_anchor_in_room";
const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RoomEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: RoomData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoomData {
    title: String,
    live_status: i64,
    online: i64,
    live_start_time: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnchorEnvelope {
    code: i64,
    #[serde(default)]
    data: AnchorData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnchorData {
    info: AnchorInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnchorInfo {
    uname: String,
    face: String,
}

// ============================================================================
// Parsing
// ============================================================================

pub fn room_url(room_id: &str) -> String {
    format!("https://live.bilibili.com/{room_id}")
}

/// Builds a snapshot from the room envelope.
pub(crate) fn parse_room(
    room_id: &str,
    envelope: RoomEnvelope,
) -> Result<StatusSnapshot, FetchError> {
    if envelope.code != 0 {
        return Err(FetchError::Api {
            platform: Platform::Bilibili.as_str(),
            code: envelope.code,
            message: envelope.message,
        });
    }

    let data = envelope.data;
    let mut snapshot = StatusSnapshot::new(Platform::Bilibili, room_id, room_url(room_id));
    snapshot.is_live = data.live_status == 1;
    snapshot.title = data.title;
    snapshot.viewer_count = Some(data.online);
    if data.live_start_time > 0 {
        snapshot.start_time = Utc.timestamp_opt(data.live_start_time, 0).single();
    }
    Ok(snapshot)
}

/// Merges the anchor profile into a snapshot. Non-zero codes are ignored.
pub(crate) fn apply_anchor(snapshot: &mut StatusSnapshot, envelope: AnchorEnvelope) {
    if envelope.code != 0 {
        return;
    }
    let info = envelope.data.info;
    snapshot.avatar = non_empty(Some(info.face.as_str())).map(str::to_string);
    if snapshot.name.is_none() {
        snapshot.name = non_empty(Some(info.uname.as_str())).map(str::to_string);
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Structured-API adapter for Bilibili.
#[derive(Debug, Clone)]
pub struct Bilibili {
    client: Client,
}

impl Bilibili {
    pub fn new() -> Result<Self, FetchError> {
        let client = http::build(http::client_builder(TIMEOUT, WINDOWS_CHROME_UA))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for Bilibili {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn fetch(
        &self,
        room_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusSnapshot, FetchError> {
        let request = self.client.get(ROOM_INFO_URL).query(&[("room_id", room_id)]);
        let envelope: RoomEnvelope = http::get_json(request, cancel).await?;
        let mut snapshot = parse_room(room_id, envelope)?;

        let request = self.client.get(ANCHOR_URL).query(&[("roomid", room_id)]);
        match http::get_json::<AnchorEnvelope>(request, cancel).await {
            Ok(anchor) => apply_anchor(&mut snapshot, anchor),
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => debug!(room_id, error = %e, "Anchor info unavailable"),
        }

        Ok(snapshot)
    }
}
