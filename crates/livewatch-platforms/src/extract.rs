//! Ordered extraction chains for scraped pages.
//!
//! Page markup changes without notice, so each scraping adapter lists several
//! independent strategies (embedded state JSON, an alternate JSON shape, regex
//! markers, the page `<title>`) and runs them in priority order. The first
//! strategy to produce a field wins; later strategies only fill fields that
//! are still empty.
//!
//! Missing secondary fields (name, avatar) are fine. A page that yields
//! neither a liveness signal nor any title text is a [`FetchError::NoSignal`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use livewatch_core::{non_empty, Platform, StatusSnapshot};

use crate::FetchError;

/// One extraction strategy: reads the page, returns whatever it could find.
pub type Strategy = fn(&str) -> Extracted;

static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<title>([^<]+)</title>").expect("static regex"));

// ============================================================================
// Extracted fields
// ============================================================================

/// Fields recovered from a page so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub is_live: Option<bool>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl Extracted {
    /// Fills still-empty fields from `other`. Populated fields never change.
    pub fn fill(&mut self, other: Extracted) {
        if self.is_live.is_none() {
            self.is_live = other.is_live;
        }
        fill_text(&mut self.title, other.title);
        fill_text(&mut self.name, other.name);
        fill_text(&mut self.avatar, other.avatar);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_live.is_some()
            && self.title.is_some()
            && self.name.is_some()
            && self.avatar.is_some()
    }

    /// Turns the extracted fields into a snapshot.
    ///
    /// A page with a title but no liveness signal is reported offline.
    pub fn into_snapshot(
        self,
        platform: Platform,
        room_id: &str,
        room_url: &str,
    ) -> Result<StatusSnapshot, FetchError> {
        if self.is_live.is_none() && self.title.is_none() {
            return Err(FetchError::NoSignal);
        }

        let mut snapshot = StatusSnapshot::new(platform, room_id, room_url);
        snapshot.is_live = self.is_live.unwrap_or(false);
        snapshot.title = self.title.unwrap_or_default();
        snapshot.name = self.name;
        snapshot.avatar = self.avatar;
        Ok(snapshot)
    }
}

fn fill_text(slot: &mut Option<String>, candidate: Option<String>) {
    if slot.is_none() {
        *slot = candidate
            .as_deref()
            .and_then(|v| non_empty(Some(v)))
            .map(str::to_string);
    }
}

/// Runs strategies in order, stopping early once every field is known.
pub fn run_chain(html: &str, strategies: &[Strategy]) -> Extracted {
    let mut found = Extracted::default();
    for strategy in strategies {
        if found.is_complete() {
            break;
        }
        found.fill(strategy(html));
    }
    found
}

// ============================================================================
// Helpers for writing strategies
// ============================================================================

/// Returns the first capture group of `re` in `html`.
pub fn capture<'a>(re: &Regex, html: &'a str) -> Option<&'a str> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses the JSON blob captured by the first group of `re`.
pub fn embedded_json(re: &Regex, html: &str) -> Option<Value> {
    capture(re, html).and_then(|raw| serde_json::from_str(raw).ok())
}

/// Reads a string at a JSON pointer.
pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Reads a boolean at a JSON pointer.
pub fn bool_at(value: &Value, pointer: &str) -> Option<bool> {
    value.pointer(pointer).and_then(Value::as_bool)
}

/// Reads a number at a JSON pointer, accepting integers and floats.
pub fn number_at(value: &Value, pointer: &str) -> Option<f64> {
    value.pointer(pointer).and_then(Value::as_f64)
}

/// The page `<title>` text with any of `suffixes` removed.
///
/// Display text only; never a liveness signal.
pub fn page_title(html: &str, suffixes: &[&str]) -> Option<String> {
    let raw = capture(&TITLE_TAG, html)?.trim();
    let trimmed = suffixes
        .iter()
        .fold(raw, |title, suffix| title.strip_suffix(suffix).unwrap_or(title));
    non_empty(Some(trimmed)).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_marker(html: &str) -> Extracted {
        Extracted {
            is_live: html.contains("LIVE").then_some(true),
            ..Default::default()
        }
    }

    fn titled(html: &str) -> Extracted {
        Extracted {
            is_live: Some(false),
            title: Some(format!("from json ({} bytes)", html.len())),
            ..Default::default()
        }
    }

    fn fallback_title(html: &str) -> Extracted {
        Extracted {
            title: page_title(html, &[]),
            name: Some(String::new()),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_strategy_wins() {
        let html = "LIVE <title>Page</title>";
        let found = run_chain(html, &[live_marker, titled, fallback_title]);
        assert_eq!(found.is_live, Some(true));
        assert!(found.title.unwrap().starts_with("from json"));
        // Empty strings never populate a field
        assert_eq!(found.name, None);
    }

    #[test]
    fn test_later_strategies_fill_gaps() {
        let html = "<title>Only a title</title>";
        let found = run_chain(html, &[live_marker, fallback_title]);
        assert_eq!(found.is_live, None);
        assert_eq!(found.title.as_deref(), Some("Only a title"));
    }

    #[test]
    fn test_title_without_liveness_is_offline() {
        let found = Extracted {
            title: Some("Someone's room".to_string()),
            ..Default::default()
        };
        let snapshot = found.into_snapshot(Platform::Weibo, "1", "https://x").unwrap();
        assert!(!snapshot.is_live);
        assert_eq!(snapshot.title, "Someone's room");
    }

    #[test]
    fn test_nothing_found_is_no_signal() {
        let found = run_chain("<html></html>", &[live_marker, fallback_title]);
        let err = found.into_snapshot(Platform::Weibo, "1", "https://x").unwrap_err();
        assert_eq!(err, FetchError::NoSignal);
    }

    #[test]
    fn test_page_title_strips_suffixes() {
        let html = "<html><title> Night stream - 快手直播</title></html>";
        assert_eq!(
            page_title(html, &[" - 快手直播", " - 快手"]).as_deref(),
            Some("Night stream")
        );
        assert_eq!(page_title("<title> </title>", &[]), None);
    }

    #[test]
    fn test_json_pointer_helpers() {
        let value: Value = serde_json::json!({
            "liveStream": { "living": true, "caption": "hi" },
            "status": 1
        });
        assert_eq!(bool_at(&value, "/liveStream/living"), Some(true));
        assert_eq!(str_at(&value, "/liveStream/caption").as_deref(), Some("hi"));
        assert_eq!(number_at(&value, "/status"), Some(1.0));
        assert_eq!(str_at(&value, "/missing"), None);
    }
}
