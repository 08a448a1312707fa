use futures::future::join_all;

use crate::{
    config::Config,
    model::{Category, Room, User},
    page::{self, CategoryPage, PageError},
    share::{self, Input, ShareError},
    util::{Agent, FetchError, HttpClient, Transport, LIVE_ORIGIN},
};

pub const CATEGORY_URL: &str = "https://live.douyin.com/category/";
pub const PROFILE_URL: &str = "https://api3-core-c-lf.amemv.com/aweme/v1/user/profile/other/";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Could not resolve share link: {0}")]
    ShareError(#[from] ShareError),
    #[error("Request failed: {0}")]
    FetchError(#[from] FetchError),
    #[error("{0}")]
    PageError(#[from] PageError),
}

impl ApiError {
    /// The platform says the room or user does not exist; retrying will not
    /// help.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::PageError(PageError::NotFound))
    }

    /// The input held no share link at all.
    pub fn is_no_url(&self) -> bool {
        matches!(self, ApiError::ShareError(ShareError::NoUrl))
    }

    /// The device id was refused; rotate it before retrying.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, ApiError::PageError(PageError::Rejected { .. }))
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::FetchError(_)
                | ApiError::ShareError(ShareError::FetchError(_))
                | ApiError::ShareError(ShareError::TooManyRedirects(_))
        )
    }
}

/// Entry point for everything that talks to the platform.
pub struct Api<T = HttpClient> {
    transport: T,
    config: Config,
}

impl Api<HttpClient> {
    pub fn new(config: Config) -> Result<Self, FetchError> {
        let transport = HttpClient::new(&config)?;
        Ok(Self { transport, config })
    }
}

impl<T: Transport> Api<T> {
    pub fn with_transport(transport: T, config: Config) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finds a share link in `text` and resolves it to `(user_id, room_id)`.
    pub async fn resolve_share(&self, text: &str) -> Result<(u64, u64), ApiError> {
        Ok(share::resolve_share_text(&self.transport, text, self.config.max_redirects).await?)
    }

    /// Profile of a user by numeric id. Uses the configured device id, which
    /// the server may reject.
    pub async fn get_user_info(&self, user_id: u64) -> Result<User, ApiError> {
        let url = format!(
            "{}?device_id={}&aid={}&user_id={}",
            PROFILE_URL, self.config.device_id, self.config.app_id, user_id
        );
        let body = self.transport.get_text(&url, Agent::Mobile).await?;
        Ok(page::decode_user_profile(&body, user_id)?)
    }

    /// Room of the account with handle `douyin_id`.
    pub async fn get_room(&self, douyin_id: &str) -> Result<Room, ApiError> {
        let url = format!("{}{}", LIVE_ORIGIN, douyin_id);
        let html = self.transport.get_text(&url, Agent::Desktop).await?;
        let mut room = page::decode_room(&html)?;
        if room.douyin_id.is_empty() {
            room.douyin_id = douyin_id.to_string();
            room.page_url = url;
        }
        Ok(room)
    }

    pub async fn get_room_by_id(&self, room_id: u64) -> Result<Room, ApiError> {
        self.get_room_from_url(&share::room_page_url(room_id)).await
    }

    /// Room from a reflow page URL.
    pub async fn get_room_from_url(&self, url: &str) -> Result<Room, ApiError> {
        if url.is_empty() {
            return Err(ShareError::NoUrl.into());
        }
        let html = self.transport.get_text(url, Agent::Mobile).await?;
        Ok(page::decode_room(&html)?)
    }

    /// The owner of the live room at `live.douyin.com/<name>`, with that
    /// room attached.
    pub async fn get_user_by_name(&self, name: &str) -> Result<User, ApiError> {
        let mut room = self.get_room(name).await?;
        let mut user = room.user.take().map(|u| *u).unwrap_or_default();
        if user.name.is_empty() {
            user.name = name.to_string();
        }
        user.room_id = room.id.clone();
        user.room = Some(Box::new(room));
        Ok(user)
    }

    /// Fills in stream URLs for a room that was decoded without them.
    pub async fn ensure_stream(&self, room: &mut Room) -> Result<(), ApiError> {
        if room.has_stream() || room.id.is_empty() {
            return Ok(());
        }
        debug!("room {} has no stream data, fetching reflow page", room.id);
        let full = self.get_room_by_id(room.id.as_u64()).await?;
        room.merge_stream(full);
        Ok(())
    }

    /// Resolves one command-line style input to a room.
    pub async fn get_room_for_input(&self, input: &Input) -> Result<Room, ApiError> {
        match input {
            Input::RoomId(id) => self.get_room_by_id(*id).await,
            Input::DouyinId(name) => self.get_room(name).await,
            Input::Share(text) => match self.resolve_share(text).await? {
                (_, room_id) if room_id != 0 => self.get_room_by_id(room_id).await,
                (user_id, _) if user_id != 0 => {
                    let user = self.get_user_info(user_id).await?;
                    if user.room_id.is_empty() {
                        return Err(PageError::NotFound.into());
                    }
                    self.get_room_by_id(user.room_id.as_u64()).await
                }
                _ => Err(ShareError::NoUrl.into()),
            },
        }
    }

    async fn category_page(&self, id: &str) -> Result<CategoryPage, ApiError> {
        let url = format!("{}{}", CATEGORY_URL, id);
        let html = self.transport.get_text(&url, Agent::Mobile).await?;
        Ok(page::decode_category_page(&html)?)
    }

    /// Sub-categories of one top-level category, bounded by the configured
    /// timeout.
    async fn sub_categories(&self, id: &str) -> Result<Vec<Category>, ApiError> {
        let page = tokio::time::timeout(self.config.timeout, self.category_page(id))
            .await
            .map_err(|_| FetchError::Timeout)??;
        Ok(page.current.categories)
    }

    /// Builds the two-level category tree.
    ///
    /// The root category's page is fetched first; it lists every top-level
    /// category and also carries the root's own sub-categories. The others
    /// are then fetched concurrently. A top-level category whose fetch
    /// fails or times out is kept with no children and the failure logged.
    pub async fn get_categories(&self) -> Result<Vec<Category>, ApiError> {
        let root_id = self.config.root_category.as_str();
        let root = self.category_page(root_id).await?;
        let mut categories = root.categories;

        let pending: Vec<(usize, String)> = categories
            .iter()
            .enumerate()
            .filter(|(_, c)| c.id != root_id)
            .map(|(i, c)| (i, c.id.clone()))
            .collect();

        let results = join_all(pending.into_iter().map(|(i, id)| async move {
            let result = self.sub_categories(&id).await;
            (i, id, result)
        }))
        .await;

        for (i, id, result) in results {
            match result {
                Ok(subs) => categories[i].categories = subs,
                Err(e) => warn!("Could not fetch sub-categories of {}: {}", id, e),
            }
        }

        if let Some(category) = categories.iter_mut().find(|c| c.id == root_id) {
            category.categories = root.current.categories;
        }

        info!("Fetched {} categories", categories.len());
        Ok(categories)
    }

    /// Top rooms of a category, as many as one page of the listing holds.
    pub async fn get_rooms_by_category(&self, category_id: &str) -> Result<Vec<Room>, ApiError> {
        Ok(self.category_page(category_id).await?.rooms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        model::{Id, RoomStatus},
        stream::StreamFormat,
        util::testing::{fixture, FixtureTransport},
    };

    fn category_fixtures() -> FixtureTransport {
        FixtureTransport::default()
            .page(
                "https://live.douyin.com/category/1_620",
                fixture("category_root.html"),
            )
            .page(
                "https://live.douyin.com/category/4_103",
                fixture("category_4_103.html"),
            )
    }

    #[tokio::test]
    async fn category_tree_survives_failed_branch() {
        // 3_1000 has no fixture, so its fetch fails.
        let api = Api::with_transport(category_fixtures(), Config::default());
        let categories = api.get_categories().await.expect("Could not build tree");

        assert_eq!(categories.len(), 3);
        assert_eq!(categories[0].id, "1_620");
        assert_eq!(categories[0].categories.len(), 2);
        assert_eq!(categories[1].id, "4_103");
        assert_eq!(
            categories[1]
                .categories
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>(),
            vec!["4_103_1_2", "4_103_1_3"]
        );
        assert_eq!(categories[2].id, "3_1000");
        assert!(categories[2].is_leaf());
    }

    #[tokio::test]
    async fn category_tree_is_repeatable() {
        let api = Api::with_transport(category_fixtures(), Config::default());
        let first = api.get_categories().await.unwrap();
        let second = api.get_categories().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn category_tree_needs_root() {
        let api = Api::with_transport(FixtureTransport::default(), Config::default());
        let err = api.get_categories().await.unwrap_err();
        assert!(err.is_transport());
    }

    /// Never answers for one category.
    struct StallingTransport {
        inner: FixtureTransport,
        stall: &'static str,
    }

    #[async_trait]
    impl Transport for StallingTransport {
        async fn get_text(&self, url: &str, agent: Agent) -> Result<String, FetchError> {
            if url.ends_with(self.stall) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.get_text(url, agent).await
        }

        async fn get_location(&self, url: &str) -> Result<Option<String>, FetchError> {
            self.inner.get_location(url).await
        }
    }

    #[tokio::test]
    async fn stalled_branch_times_out() {
        let transport = StallingTransport {
            inner: category_fixtures(),
            stall: "4_103",
        };
        let config = Config::default().with_timeout(Duration::from_millis(50));
        let api = Api::with_transport(transport, config);

        let categories = api.get_categories().await.unwrap();
        assert_eq!(categories[0].categories.len(), 2);
        assert!(categories[1].is_leaf());
    }

    #[tokio::test]
    async fn rooms_by_category() {
        let transport = FixtureTransport::default().page(
            "https://live.douyin.com/category/1_620_2_1010032",
            fixture("category_rooms.html"),
        );
        let api = Api::with_transport(transport, Config::default());

        let rooms = api.get_rooms_by_category("1_620_2_1010032").await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[1].current_users, "4567");
        assert_eq!(rooms[1].flv_url_for_quality("hd"), rooms[1].stream_url);
    }

    #[tokio::test]
    async fn user_by_name_carries_room() {
        let transport = FixtureTransport::default().page(
            "https://live.douyin.com/maidanglaodo",
            fixture("room_hydration.html"),
        );
        let api = Api::with_transport(transport, Config::default());

        let user = api.get_user_by_name("maidanglaodo").await.unwrap();
        assert_eq!(user.sec_uid, "MS4wLjABAAAAsecuid");
        let room = user.room.expect("User has no room");
        assert_eq!(room.status(), RoomStatus::Live);
        assert!(room.user.is_none());
        assert_eq!(
            room.url_for(StreamFormat::Flv, "hd"),
            "https://pull-flv.example.com/stage/stream-7301_hd.flv"
        );
        assert_eq!(
            room.url_for(StreamFormat::Hls, "uhd"),
            "https://pull-hls.example.com/stage/stream-7301_or4.m3u8"
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_fetched_lazily() {
        let transport = FixtureTransport::default().page(
            "https://webcast.amemv.com/webcast/reflow/6972728684293999374",
            fixture("reflow.html"),
        );
        let api = Api::with_transport(transport, Config::default());

        let mut room = Room {
            id: Id::from(6972728684293999374u64),
            title: "from listing".into(),
            ..Default::default()
        };
        api.ensure_stream(&mut room).await.unwrap();

        assert_eq!(room.title, "from listing");
        assert_eq!(
            room.hls_url_for_quality(""),
            "https://pull.example.com/third/stream-6972_or4.m3u8"
        );
        assert_eq!(
            room.hls_url_for_quality("ld"),
            "https://pull.example.com/third/stream-6972_ld.m3u8"
        );
    }

    #[tokio::test]
    async fn share_text_to_room() {
        let transport = FixtureTransport::default()
            .redirect(
                "https://v.douyin.com/e9oPjy7/",
                "https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAAhongjing",
            )
            .page(
                "https://api3-core-c-lf.amemv.com/aweme/v1/user/profile/other/?device_id=66178590526&aid=1128&user_id=94792729333",
                fixture("profile.json"),
            )
            .page(
                "https://webcast.amemv.com/webcast/reflow/6972728684293999374",
                fixture("reflow.html"),
            );
        let api = Api::with_transport(transport, Config::default());

        let input = Input::parse("快来加入抖音，让你发现最有趣的我！ https://v.douyin.com/e9oPjy7/");
        let room = api.get_room_for_input(&input).await.unwrap();
        assert_eq!(room.title, "红警直播");
    }

    #[tokio::test]
    async fn direct_page_urls_to_room() {
        // Only page fetches are served; a redirect lookup would resolve to
        // nothing and fail the input.
        let transport = FixtureTransport::default()
            .page(
                "https://api3-core-c-lf.amemv.com/aweme/v1/user/profile/other/?device_id=66178590526&aid=1128&user_id=94792729333",
                fixture("profile.json"),
            )
            .page(
                "https://webcast.amemv.com/webcast/reflow/6972728684293999374",
                fixture("reflow.html"),
            );
        let api = Api::with_transport(transport, Config::default());

        for arg in [
            "https://webcast.amemv.com/webcast/reflow/6972728684293999374",
            "https://www.iesdouyin.com/share/user/94792729333?sec_uid=MS4wLjABAAAAhongjing",
        ] {
            let room = api
                .get_room_for_input(&Input::parse(arg))
                .await
                .expect("Could not resolve direct URL");
            assert_eq!(room.id.as_u64(), 6972728684293999374);
            assert_eq!(room.title, "红警直播");
        }
    }

    #[tokio::test]
    async fn error_kinds_are_distinguishable() {
        let transport = FixtureTransport::default()
            .page(
                "https://api3-core-c-lf.amemv.com/aweme/v1/user/profile/other/?device_id=1&aid=1128&user_id=5",
                r#"{"status_code":9,"status_msg":"invalid device","user":{}}"#,
            )
            .page(
                "https://live.douyin.com/nobody",
                r#"<script>self.__pace_f.push([1,"0:[{\"state\":{\"roomStore\":{\"roomInfo\":{}}}}]"])</script>"#,
            );
        let api = Api::with_transport(transport, Config::default().with_device_id(1));

        let err = api.get_user_info(5).await.unwrap_err();
        assert!(err.is_credential_rejected());

        let err = api.get_room("nobody").await.unwrap_err();
        assert!(err.is_not_found());

        let err = api.resolve_share("没有链接").await.unwrap_err();
        assert!(err.is_no_url());

        let err = api.get_room_from_url("").await.unwrap_err();
        assert!(err.is_no_url());
    }
}
