use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_aux::prelude::*;

use crate::stream::{self, StreamFormat};

/// Room status code reported while the room is broadcasting.
pub const ROOM_STATUS_LIVE: i64 = 2;
/// Room status code reported once the broadcast is over.
pub const ROOM_STATUS_ENDED: i64 = 4;

/// Quality/protocol label to playable URL, for one protocol family.
pub type StreamManifest = BTreeMap<String, String>;

/// Platform identifier transported as a JSON string to avoid precision loss.
///
/// Accepts both strings and numbers when decoding, and always encodes back
/// to the exact string it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Id(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, or 0 when the id is empty or not a number.
    pub fn as_u64(&self) -> u64 {
        self.0.parse().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0 == "0"
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Id(id.to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_string_from_number(deserializer).map(Id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    NotStarted,
    Live,
    Ended,
}

impl RoomStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            ROOM_STATUS_LIVE => RoomStatus::Live,
            ROOM_STATUS_ENDED => RoomStatus::Ended,
            _ => RoomStatus::NotStarted,
        }
    }
}

/// An account. The numeric `id` is reissued by the platform from time to
/// time; key on `sec_uid` when identity has to survive between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: Id,
    pub sec_uid: String,
    /// The handle shown below the nickname, also used in live room URLs.
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub page_url: String,
    pub country: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub location: String,
    pub videos_count: i64,
    pub followers_count: i64,
    pub followings_count: i64,
    pub favorites_count: i64,
    pub likes_count: i64,
    pub room_id: Id,
    pub picture_small: String,
    pub picture_medium: String,
    pub picture_large: String,
    pub room: Option<Box<Room>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Room {
    pub id: Id,
    /// Handle of the owning account, as used in `live.douyin.com/<handle>`.
    pub douyin_id: String,
    pub page_url: String,
    pub title: String,
    pub status_code: i64,
    pub cover_url: String,
    pub created_at: Option<DateTime<Utc>>,

    pub likes_count: i64,
    pub current_users_count: i64,
    pub total_users_count: i64,
    pub new_followers_count: i64,
    pub gifts_unique_visitor_count: i64,
    pub fans_count: i64,
    /// Viewer count for display, possibly abbreviated ("12.3万").
    pub current_users: String,
    pub total_users: String,

    pub stream_id: Id,
    pub stream_height: i64,
    pub stream_width: i64,
    pub flv_urls: StreamManifest,
    pub hls_urls: StreamManifest,
    /// Default FLV playback URL, used when no quality matches.
    pub stream_url: String,
    /// Default HLS playback URL, used when no quality matches.
    pub hls_url: String,

    pub category: Option<Category>,
    pub user: Option<Box<User>>,
}

impl Room {
    pub fn status(&self) -> RoomStatus {
        RoomStatus::from_code(self.status_code)
    }

    pub fn is_operating(&self) -> bool {
        self.status_code == ROOM_STATUS_LIVE
    }

    /// True once either manifest or a default URL is known.
    pub fn has_stream(&self) -> bool {
        !(self.flv_urls.is_empty()
            && self.hls_urls.is_empty()
            && self.stream_url.is_empty()
            && self.hls_url.is_empty())
    }

    pub fn flv_url_for_quality(&self, quality: &str) -> &str {
        stream::resolve(&self.flv_urls, quality, &self.stream_url)
    }

    pub fn hls_url_for_quality(&self, quality: &str) -> &str {
        stream::resolve(&self.hls_urls, quality, &self.hls_url)
    }

    pub fn url_for(&self, format: StreamFormat, quality: &str) -> &str {
        match format {
            StreamFormat::Flv => self.flv_url_for_quality(quality),
            StreamFormat::Hls => self.hls_url_for_quality(quality),
        }
    }

    /// Copies stream data from `other`, keeping everything else.
    pub fn merge_stream(&mut self, other: Room) {
        self.stream_id = other.stream_id;
        self.stream_height = other.stream_height;
        self.stream_width = other.stream_width;
        self.flv_urls = other.flv_urls;
        self.hls_urls = other.hls_urls;
        self.stream_url = other.stream_url;
        self.hls_url = other.hls_url;
    }
}

/// A node of the two-level category tree. Leaves have no children and are
/// the ones rooms can be listed for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub categories: Vec<Category>,
}

impl Category {
    /// Id of a top-level category: `<type>_<id>`.
    pub fn top_id(kind: i64, id: &str) -> String {
        format!("{}_{}", kind, id)
    }

    /// Id of a sub-category: `<parent type>_<parent id>_<type>_<id>`.
    pub fn sub_id(parent_kind: i64, parent_id: &str, kind: i64, id: &str) -> String {
        format!("{}_{}_{}_{}", parent_kind, parent_id, kind, id)
    }

    pub fn is_leaf(&self) -> bool {
        self.categories.is_empty()
    }
}
