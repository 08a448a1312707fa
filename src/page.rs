//! Decoding embedded page state into rooms, users and categories.
//!
//! Every shape is decoded leniently: unknown fields are ignored, missing or
//! `null` fields become zero values. What the platform has changed over time
//! is *where* the state lives, so a room is tried against each
//! [`RoomShape`] in [`RoomShape::PRIORITY`] order.

use chrono::DateTime;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_aux::prelude::*;
use serde_json::Value;

use crate::{
    model::{Category, Id, Room, StreamManifest, User},
    payload::Convention,
    share,
    util::{first_or_default, LIVE_ORIGIN},
};

#[derive(thiserror::Error, Debug)]
pub enum PageError {
    #[error("Page shape not recognised")]
    NoPayload,
    #[error("No such room or user")]
    NotFound,
    #[error("Request rejected with status {status_code}: {message}")]
    Rejected { status_code: i64, message: String },
    #[error("Invalid page data")]
    InvalidPageData(#[from] serde_json::Error),
}

impl PageError {
    fn rank(&self) -> u8 {
        match self {
            PageError::NoPayload => 0,
            PageError::NotFound => 1,
            PageError::Rejected { .. } => 2,
            PageError::InvalidPageData(_) => 3,
        }
    }
}

/// Parses JSON and drops every `null` object member, so that nulls decode
/// the same way as absent fields.
pub fn parse_tolerant(text: &str) -> Result<Value, serde_json::Error> {
    let mut value: Value = serde_json::from_str(text)?;
    strip_nulls(&mut value);
    Ok(value)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => (),
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

// Field decoders for display-only data. A value of an unexpected JSON type
// becomes the zero value so it cannot sink the room it belongs to.

/// Strings, with numbers taken as their decimal text.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Numbers, or strings holding one.
fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(deserialize_number_from_string::<i64, _>(value).unwrap_or_default())
}

/// Any nested struct of display data.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// First candidate object accepted by `probe`. A candidate that is an array
/// is scanned element by element, since hydration chunks wrap their state.
fn find_state<F>(candidates: &[String], probe: F) -> Result<Value, PageError>
where
    F: Fn(&Value) -> bool,
{
    if candidates.is_empty() {
        return Err(PageError::NoPayload);
    }

    let mut parse_error = None;
    let mut parsed_any = false;

    for candidate in candidates {
        let value = match parse_tolerant(candidate) {
            Ok(value) => value,
            Err(e) => {
                trace!("skipping candidate that is not JSON: {}", e);
                parse_error = Some(e);
                continue;
            }
        };
        parsed_any = true;

        let found = match value {
            Value::Array(items) => items.into_iter().find(|item| item.is_object() && probe(item)),
            object @ Value::Object(_) if probe(&object) => Some(object),
            _ => None,
        };
        if let Some(state) = found {
            return Ok(state);
        }
    }

    match parse_error {
        Some(e) if !parsed_any => Err(PageError::InvalidPageData(e)),
        _ => Err(PageError::NotFound),
    }
}

fn has_room(info: &Value) -> bool {
    match info.pointer("/room/id_str") {
        Some(Value::String(id)) => !id.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

/// Image URLs, normally `{"url_list": [...]}`. A bare string is taken as a
/// one-entry list; anything else is empty.
#[derive(Debug, Default)]
struct UrlList {
    url_list: Vec<String>,
}

impl<'de> Deserialize<'de> for UrlList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let url_list = match Value::deserialize(deserializer)? {
            Value::String(url) => vec![url],
            Value::Object(map) => map
                .get("url_list")
                .and_then(Value::as_array)
                .map(|urls| {
                    urls.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(UrlList { url_list })
    }
}

impl UrlList {
    fn first(&self) -> String {
        first_or_default(&self.url_list)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFollowInfo {
    #[serde(deserialize_with = "count")]
    follower_count: i64,
    #[serde(deserialize_with = "count")]
    following_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOwner {
    id_str: Id,
    sec_uid: String,
    #[serde(deserialize_with = "text")]
    display_id: String,
    #[serde(deserialize_with = "text")]
    nickname: String,
    #[serde(deserialize_with = "text")]
    signature: String,
    #[serde(deserialize_with = "lenient")]
    follow_info: RawFollowInfo,
    avatar_thumb: UrlList,
    avatar_medium: UrlList,
    #[serde(alias = "avatar_larger")]
    avatar_large: UrlList,
}

impl RawOwner {
    fn is_empty(&self) -> bool {
        self.id_str.is_empty() && self.nickname.is_empty()
    }

    fn into_user(self) -> User {
        let page_url = if self.id_str.is_empty() {
            String::new()
        } else {
            share::user_page_url(self.id_str.as_u64(), &self.sec_uid)
        };

        User {
            page_url,
            sec_uid: self.sec_uid,
            name: self.display_id,
            nickname: self.nickname,
            description: self.signature,
            followers_count: self.follow_info.follower_count,
            followings_count: self.follow_info.following_count,
            picture_small: self.avatar_thumb.first(),
            picture_medium: self.avatar_medium.first(),
            picture_large: self.avatar_large.first(),
            id: self.id_str,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStats {
    #[serde(deserialize_with = "count")]
    follow_count: i64,
    #[serde(deserialize_with = "count")]
    gift_uv_count: i64,
    #[serde(deserialize_with = "count")]
    fan_ticket: i64,
    #[serde(deserialize_with = "count")]
    total_user: i64,
    #[serde(deserialize_with = "text")]
    total_user_str: String,
    #[serde(deserialize_with = "text")]
    user_count_str: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawViewStats {
    #[serde(deserialize_with = "count")]
    display_value: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStreamExtra {
    #[serde(deserialize_with = "count")]
    height: i64,
    #[serde(deserialize_with = "count")]
    width: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStreamUrl {
    id_str: Id,
    #[serde(deserialize_with = "lenient")]
    extra: RawStreamExtra,
    flv_pull_url: StreamManifest,
    hls_pull_url_map: StreamManifest,
    hls_pull_url: String,
    default_resolution: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoom {
    id_str: Id,
    #[serde(deserialize_with = "text")]
    title: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    status: i64,
    #[serde(deserialize_with = "count")]
    create_time: i64,
    #[serde(deserialize_with = "count")]
    like_count: i64,
    #[serde(deserialize_with = "count")]
    user_count: i64,
    #[serde(deserialize_with = "lenient")]
    owner: RawOwner,
    #[serde(deserialize_with = "lenient")]
    stats: RawStats,
    #[serde(deserialize_with = "lenient")]
    room_view_stats: RawViewStats,
    stream_url: RawStreamUrl,
    cover: UrlList,
}

impl RawRoom {
    fn into_room(self) -> Room {
        let stream = self.stream_url;
        let stream_url = default_url(&stream.flv_pull_url, &stream.default_resolution, "");
        let hls_url = default_url(
            &stream.hls_pull_url_map,
            &stream.default_resolution,
            &stream.hls_pull_url,
        );

        let user = (!self.owner.is_empty()).then(|| {
            let mut user = self.owner.into_user();
            user.room_id = self.id_str.clone();
            Box::new(user)
        });

        Room {
            current_users: viewer_text(self.room_view_stats.display_value, &self.stats.user_count_str),
            total_users: self.stats.total_user_str,
            title: self.title,
            status_code: self.status,
            cover_url: self.cover.first(),
            created_at: (self.create_time > 0)
                .then(|| DateTime::from_timestamp(self.create_time, 0))
                .flatten(),
            likes_count: self.like_count,
            current_users_count: self.user_count,
            total_users_count: self.stats.total_user,
            new_followers_count: self.stats.follow_count,
            gifts_unique_visitor_count: self.stats.gift_uv_count,
            fans_count: self.stats.fan_ticket,
            stream_id: stream.id_str,
            stream_height: stream.extra.height,
            stream_width: stream.extra.width,
            flv_urls: stream.flv_pull_url,
            hls_urls: stream.hls_pull_url_map,
            stream_url,
            hls_url,
            user,
            id: self.id_str,
            ..Default::default()
        }
    }
}

/// Viewer count for display: the exact value when the platform sends one,
/// otherwise its abbreviated text as is.
pub fn viewer_text(display_value: i64, fallback: &str) -> String {
    if display_value > 0 {
        display_value.to_string()
    } else {
        fallback.to_string()
    }
}

/// `explicit` if set, else the entry for `resolution`, then the best known
/// labels, then whatever comes first.
fn default_url(manifest: &StreamManifest, resolution: &str, explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }

    [resolution, "FULL_HD1", "HD1"]
        .iter()
        .find_map(|label| manifest.get(*label))
        .or_else(|| manifest.values().next())
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoomInfo {
    room: RawRoom,
    web_rid: String,
    #[serde(deserialize_with = "lenient")]
    anchor: RawOwner,
}

impl RawRoomInfo {
    fn into_room(mut self) -> Room {
        if self.room.owner.is_empty() {
            self.room.owner = std::mem::take(&mut self.anchor);
        }

        let mut room = self.room.into_room();
        if !self.web_rid.is_empty() {
            room.page_url = format!("{}{}", LIVE_ORIGIN, self.web_rid);
            if let Some(user) = room.user.as_mut() {
                if user.name.is_empty() {
                    user.name = self.web_rid.clone();
                }
            }
            room.douyin_id = self.web_rid;
        }
        room
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReflow {
    room: RawRoom,
}

/// The known places a room's state has lived, most current first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomShape {
    /// Live page, state pushed through streaming hydration.
    HydrationState,
    /// Live page, state in the `RENDER_DATA` element.
    RenderDataState,
    /// Reflow page, full room under any key of `__INIT_PROPS__`.
    ReflowProps,
    /// Reflow page, only the HLS map, for when the room itself no longer
    /// decodes.
    ReflowStreamMap,
}

const HYDRATION_ROOM_INFO: &str = "/state/roomStore/roomInfo";
const RENDER_DATA_ROOM_INFO: &str = "/app/initialState/roomStore/roomInfo";
const REFLOW_HLS_MAP: &str = "/room/stream_url/hls_pull_url_map";

impl RoomShape {
    pub const PRIORITY: [RoomShape; 4] = [
        RoomShape::HydrationState,
        RoomShape::RenderDataState,
        RoomShape::ReflowProps,
        RoomShape::ReflowStreamMap,
    ];

    pub fn convention(self) -> Convention {
        match self {
            RoomShape::HydrationState => Convention::Hydration,
            RoomShape::RenderDataState => Convention::RenderData,
            RoomShape::ReflowProps | RoomShape::ReflowStreamMap => Convention::ScriptAssignment,
        }
    }

    pub fn decode(self, candidates: &[String]) -> Result<Room, PageError> {
        match self {
            RoomShape::HydrationState => room_from_info(candidates, HYDRATION_ROOM_INFO),
            RoomShape::RenderDataState => room_from_info(candidates, RENDER_DATA_ROOM_INFO),
            RoomShape::ReflowProps => {
                let props = find_state(candidates, |v| props_values(v).any(has_room))?;
                let reflow: RawReflow =
                    decode(props_values(&props).find(|v| has_room(v)).ok_or(PageError::NotFound)?)?;
                let mut room = reflow.room.into_room();
                room.page_url = share::room_page_url(room.id.as_u64());
                Ok(room)
            }
            RoomShape::ReflowStreamMap => {
                let props = find_state(candidates, |v| props_values(v).any(has_hls_map))?;
                let hls_urls: StreamManifest = props_values(&props)
                    .filter_map(|v| v.pointer(REFLOW_HLS_MAP))
                    .find_map(|map| decode(map).ok())
                    .ok_or(PageError::NotFound)?;

                Ok(Room {
                    hls_url: default_url(&hls_urls, "", ""),
                    hls_urls,
                    ..Default::default()
                })
            }
        }
    }
}

fn props_values(props: &Value) -> impl Iterator<Item = &Value> {
    props.as_object().into_iter().flat_map(|map| map.values())
}

fn has_hls_map(value: &Value) -> bool {
    value
        .pointer(REFLOW_HLS_MAP)
        .map(Value::is_object)
        .unwrap_or(false)
}

fn room_from_info(candidates: &[String], pointer: &str) -> Result<Room, PageError> {
    let state = find_state(candidates, |v| v.pointer(pointer).map(has_room).unwrap_or(false))?;
    let info: RawRoomInfo = decode(state.pointer(pointer).ok_or(PageError::NotFound)?)?;
    Ok(info.into_room())
}

/// Decodes the room from any live or reflow page.
pub fn decode_room(html: &str) -> Result<Room, PageError> {
    let mut error = PageError::NoPayload;

    for shape in RoomShape::PRIORITY {
        let candidates = shape.convention().extract(html);
        match shape.decode(&candidates) {
            Ok(room) => {
                debug!("decoded room {} from {:?}", room.id, shape);
                return Ok(room);
            }
            Err(e) => {
                trace!("{:?} did not match: {}", shape, e);
                if e.rank() > error.rank() {
                    error = e;
                }
            }
        }
    }

    Err(error)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPartition {
    id_str: String,
    #[serde(rename = "type", deserialize_with = "deserialize_number_from_string")]
    kind: i64,
    #[serde(deserialize_with = "text")]
    title: String,
}

impl RawPartition {
    fn top(&self) -> Category {
        Category {
            id: Category::top_id(self.kind, &self.id_str),
            name: self.title.clone(),
            categories: Vec::new(),
        }
    }

    fn sub(&self, parent: &RawPartition) -> Category {
        Category {
            id: Category::sub_id(parent.kind, &parent.id_str, self.kind, &self.id_str),
            name: self.title.clone(),
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCategoryEntry {
    partition: RawPartition,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCategoryTab {
    #[serde(rename = "categoryData")]
    category_data: Vec<RawCategoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLayoutData {
    #[serde(rename = "categoryTab")]
    category_tab: RawCategoryTab,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApp {
    #[serde(rename = "layoutData")]
    layout_data: RawLayoutData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPartitionData {
    partition: RawPartition,
    sub_partition: Vec<RawPartition>,
    select_partition: RawPartition,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoomCard {
    room: RawRoom,
    #[serde(deserialize_with = "text")]
    web_rid: String,
    #[serde(rename = "streamSrc", deserialize_with = "text")]
    stream_src: String,
    #[serde(deserialize_with = "text")]
    cover: String,
    #[serde(deserialize_with = "text")]
    avatar: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoomsData {
    data: Vec<RawRoomCard>,
}

/// The page section keyed by an opaque hash that changes between releases;
/// it is found by content instead of by name.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSection {
    #[serde(rename = "partitionData")]
    partition_data: RawPartitionData,
    #[serde(rename = "roomsData")]
    rooms_data: RawRoomsData,
}

/// Everything a category page carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPage {
    /// Top-level categories, without children.
    pub categories: Vec<Category>,
    /// The category the page is about, its sub-categories as children.
    pub current: Category,
    /// The sub-category the listed rooms belong to, if one is selected.
    pub selected: Option<Category>,
    pub rooms: Vec<Room>,
}

fn find_section(state: &Value) -> Option<&Value> {
    props_values(state).find(|v| v.get("partitionData").is_some())
}

/// Decodes a category page; works for both top-level and leaf categories.
pub fn decode_category_page(html: &str) -> Result<CategoryPage, PageError> {
    let mut candidates = Convention::RenderData.extract(html);
    candidates.extend(Convention::Hydration.extract(html));

    let state = find_state(&candidates, |v| v.get("app").is_some() || find_section(v).is_some())?;
    let app = state
        .get("app")
        .map(decode::<RawApp>)
        .transpose()?
        .unwrap_or_default();
    let section = find_section(&state)
        .map(decode::<RawSection>)
        .transpose()?
        .unwrap_or_default();

    let categories = app
        .layout_data
        .category_tab
        .category_data
        .iter()
        .map(|entry| entry.partition.top())
        .collect();

    let parent = &section.partition_data.partition;
    let mut current = parent.top();
    current.categories = section
        .partition_data
        .sub_partition
        .iter()
        .map(|p| p.sub(parent))
        .collect();

    let select = &section.partition_data.select_partition;
    let selected = (!select.id_str.is_empty()).then(|| select.sub(parent));

    let rooms = section
        .rooms_data
        .data
        .into_iter()
        .map(|card| {
            let mut room = card.room.into_room();
            room.douyin_id = card.web_rid.clone();
            room.page_url = format!("{}{}", LIVE_ORIGIN, card.web_rid);
            room.stream_url = card.stream_src;
            room.cover_url = card.cover;
            let user = room.user.get_or_insert_with(Default::default);
            user.name = card.web_rid;
            user.picture_small = card.avatar;
            room.category = Some(Category {
                categories: selected.iter().cloned().collect(),
                ..parent.top()
            });
            room
        })
        .collect();

    Ok(CategoryPage {
        categories,
        current,
        selected,
        rooms,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProfileUser {
    uid: Id,
    short_id: Id,
    #[serde(deserialize_with = "text")]
    unique_id: String,
    sec_uid: String,
    nickname: String,
    #[serde(deserialize_with = "text")]
    signature: String,
    #[serde(deserialize_with = "text")]
    country: String,
    #[serde(deserialize_with = "text")]
    province: String,
    #[serde(deserialize_with = "text")]
    city: String,
    #[serde(deserialize_with = "text")]
    district: String,
    #[serde(deserialize_with = "text")]
    location: String,
    #[serde(deserialize_with = "count")]
    aweme_count: i64,
    #[serde(deserialize_with = "count")]
    follower_count: i64,
    #[serde(deserialize_with = "count")]
    following_count: i64,
    #[serde(deserialize_with = "count")]
    favoriting_count: i64,
    #[serde(deserialize_with = "count")]
    total_favorited: i64,
    room_id: Id,
    avatar_thumb: UrlList,
    avatar_medium: UrlList,
    avatar_larger: UrlList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProfileResponse {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    status_code: i64,
    status_msg: String,
    user: RawProfileUser,
}

/// Decodes the profile endpoint's reply for `user_id`.
///
/// An empty nickname means there is no such user, unless the reply also
/// carries a non-zero status, in which case the request itself (usually the
/// device id) was rejected.
pub fn decode_user_profile(body: &str, user_id: u64) -> Result<User, PageError> {
    let resp: RawProfileResponse = decode(&parse_tolerant(body)?)?;

    if resp.user.nickname.is_empty() {
        if resp.status_code != 0 {
            return Err(PageError::Rejected {
                status_code: resp.status_code,
                message: resp.status_msg,
            });
        }
        return Err(PageError::NotFound);
    }

    let u = resp.user;
    let name = if u.unique_id.is_empty() {
        u.short_id.to_string()
    } else {
        u.unique_id
    };

    Ok(User {
        id: if u.uid.is_empty() { Id::from(user_id) } else { u.uid },
        page_url: share::user_page_url(user_id, &u.sec_uid),
        sec_uid: u.sec_uid,
        name,
        nickname: u.nickname,
        description: u.signature,
        country: u.country,
        province: u.province,
        city: u.city,
        district: u.district,
        location: u.location,
        videos_count: u.aweme_count,
        followers_count: u.follower_count,
        followings_count: u.following_count,
        favorites_count: u.favoriting_count,
        likes_count: u.total_favorited,
        room_id: u.room_id,
        picture_small: u.avatar_thumb.first(),
        picture_medium: u.avatar_medium.first(),
        picture_large: u.avatar_larger.first(),
        room: None,
    })
}
