//! Canonical REST surface of a node.

use std::sync::Arc;

use serde_json::{Value, json};

use hydrolink_driver::{Driver, RestRequest};
use hydrolink_protocol::{
    LoadResult, ProtocolError, StatsPatch, Track, UpdatePlayer,
};

use crate::error::NodeError;

/// Typed REST operations against one node.
///
/// Paths and parameters here are the canonical shapes; dialect quirks
/// (path prefixes, casing, local track decoding) are handled below this
/// layer by the driver.
#[derive(Clone)]
pub struct Rest {
    driver: Arc<dyn Driver>,
}

impl Rest {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Builds a session-scoped path. The driver rejects session paths
    /// while no session id exists, so an empty id never hits the wire.
    async fn session_path(&self, suffix: &str) -> String {
        let session = self.driver.session_id().await.unwrap_or_default();
        format!("/sessions/{session}{suffix}")
    }

    /// All players of the current session, as raw backend objects.
    pub async fn get_players(&self) -> Result<Vec<Value>, NodeError> {
        let request = RestRequest::get(self.session_path("/players").await);
        let response = self.driver.request(request).await?;
        Ok(response
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default())
    }

    /// Current load statistics, fetched over REST.
    pub async fn get_status(&self) -> Result<StatsPatch, NodeError> {
        let response =
            self.driver.request(RestRequest::get("/stats")).await?;
        Ok(match response {
            Some(value) => {
                serde_json::from_value(value).map_err(ProtocolError::Decode)?
            }
            None => StatsPatch::default(),
        })
    }

    /// Decodes a track blob into its metadata. Drivers answer locally
    /// when they can read the blob and only then ask the backend.
    pub async fn decode_track(
        &self,
        encoded: &str,
    ) -> Result<Option<Track>, NodeError> {
        let request = RestRequest::get("/decodetrack")
            .with_params(vec![("encodedTrack".into(), encoded.into())]);
        match self.driver.request(request).await? {
            Some(value) => {
                let track = serde_json::from_value(value)
                    .map_err(ProtocolError::Decode)?;
                Ok(Some(track))
            }
            None => Ok(None),
        }
    }

    /// Applies a player update through the dialect's outbound plan.
    pub async fn update_player(
        &self,
        update: &UpdatePlayer,
    ) -> Result<Option<Value>, NodeError> {
        Ok(self.driver.update_player(update).await?)
    }

    /// Removes a guild's player from the backend.
    pub async fn destroy_player(
        &self,
        guild_id: &str,
    ) -> Result<(), NodeError> {
        let path = self.session_path(&format!("/players/{guild_id}")).await;
        self.driver.request(RestRequest::delete(path)).await?;
        Ok(())
    }

    /// Resolves `identifier` (a URL or a `<prefix>search:` query) into
    /// tracks. An empty backend response is an empty result, not an error.
    pub async fn load_tracks(
        &self,
        identifier: &str,
    ) -> Result<LoadResult, NodeError> {
        let request = RestRequest::get("/loadtracks")
            .with_params(vec![("identifier".into(), identifier.into())]);
        match self.driver.request(request).await? {
            Some(value) => Ok(LoadResult::from_value(&value)?),
            None => Ok(LoadResult::Empty),
        }
    }

    /// Route planner status, when the backend has one configured.
    pub async fn route_planner_status(
        &self,
    ) -> Result<Option<Value>, NodeError> {
        let request = RestRequest::get("/routeplanner/status");
        Ok(self.driver.request(request).await?)
    }

    /// Clears a failed address from the backend's route planner.
    pub async fn unmark_failed_address(
        &self,
        address: &str,
    ) -> Result<(), NodeError> {
        let request = RestRequest::post(
            "/routeplanner/free/address",
            json!({ "address": address }),
        );
        self.driver.request(request).await?;
        Ok(())
    }

    /// Backend version and capability report.
    pub async fn get_info(&self) -> Result<Option<Value>, NodeError> {
        Ok(self.driver.request(RestRequest::get("/info")).await?)
    }

    /// Lyrics for an encoded track, on dialects that support it.
    pub async fn get_lyrics(
        &self,
        encoded: &str,
        language: Option<&str>,
    ) -> Result<Option<Value>, NodeError> {
        Ok(self.driver.get_lyrics(encoded, language).await?)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use hydrolink_driver::{DriverError, OutboundPlan};
    use hydrolink_protocol::NodeMessage;
    use hydrolink_transport::TransportEvent;

    // -- Helpers ---

    /// Driver stub that records every request and replays one canned
    /// response.
    struct RecordingDriver {
        session: Mutex<Option<String>>,
        requests: Mutex<Vec<RestRequest>>,
        response: Mutex<Option<Value>>,
    }

    impl RecordingDriver {
        fn new(session: Option<&str>, response: Option<Value>) -> Arc<Self> {
            Arc::new(Self {
                session: Mutex::new(session.map(str::to_string)),
                requests: Mutex::new(Vec::new()),
                response: Mutex::new(response),
            })
        }

        async fn recorded(&self) -> Vec<RestRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        fn id(&self) -> &'static str {
            "test/recording"
        }

        async fn session_id(&self) -> Option<String> {
            self.session.lock().await.clone()
        }

        async fn set_session_id(&self, session_id: Option<String>) {
            *self.session.lock().await = session_id;
        }

        async fn connect(
            &self,
        ) -> Result<UnboundedReceiver<TransportEvent>, DriverError> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }

        async fn send_raw(&self, _text: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn ws_close(&self) -> Result<(), DriverError> {
            Ok(())
        }

        fn translate_inbound(&self, raw: &str) -> Option<NodeMessage> {
            serde_json::from_str(raw).ok()
        }

        async fn translate_outbound(
            &self,
            _update: &UpdatePlayer,
        ) -> Result<OutboundPlan, DriverError> {
            Ok(OutboundPlan::Socket(Vec::new()))
        }

        async fn request(
            &self,
            request: RestRequest,
        ) -> Result<Option<Value>, DriverError> {
            self.requests.lock().await.push(request);
            Ok(self.response.lock().await.take())
        }

        async fn update_session(
            &self,
            _resume: bool,
            _timeout_secs: u64,
        ) -> Result<(), DriverError> {
            Ok(())
        }

        fn decode_track(
            &self,
            _encoded: &str,
        ) -> Result<Track, ProtocolError> {
            Err(ProtocolError::TrackTruncated(0))
        }
    }

    #[tokio::test]
    async fn test_get_players_builds_session_path() {
        let driver = RecordingDriver::new(
            Some("abc123"),
            Some(json!([{ "guildId": "1" }, { "guildId": "2" }])),
        );
        let rest = Rest::new(driver.clone());

        let players = rest.get_players().await.unwrap();
        assert_eq!(players.len(), 2);

        let recorded = driver.recorded().await;
        assert_eq!(recorded[0].path, "/sessions/abc123/players");
        assert_eq!(recorded[0].method.as_str(), "GET");
    }

    #[tokio::test]
    async fn test_get_players_tolerates_empty_response() {
        let driver = RecordingDriver::new(Some("abc123"), None);
        let rest = Rest::new(driver);
        assert_eq!(rest.get_players().await.unwrap(), Vec::<Value>::new());
    }

    #[tokio::test]
    async fn test_get_status_parses_stats_patch() {
        let driver = RecordingDriver::new(
            Some("abc123"),
            Some(json!({ "players": 3, "playingPlayers": 1 })),
        );
        let rest = Rest::new(driver.clone());

        let status = rest.get_status().await.unwrap();
        assert_eq!(status.players, Some(3));
        assert_eq!(status.playing_players, Some(1));
        assert_eq!(driver.recorded().await[0].path, "/stats");
    }

    #[tokio::test]
    async fn test_get_status_empty_response_defaults() {
        let driver = RecordingDriver::new(Some("abc123"), None);
        let rest = Rest::new(driver);
        assert_eq!(rest.get_status().await.unwrap(), StatsPatch::default());
    }

    #[tokio::test]
    async fn test_decode_track_sends_encoded_param() {
        let driver = RecordingDriver::new(Some("abc123"), None);
        let rest = Rest::new(driver.clone());

        let track = rest.decode_track("QAAAbc==").await.unwrap();
        assert_eq!(track, None);

        let recorded = driver.recorded().await;
        assert_eq!(recorded[0].path, "/decodetrack");
        assert_eq!(recorded[0].param("encodedTrack"), Some("QAAAbc=="));
    }

    #[tokio::test]
    async fn test_destroy_player_uses_delete_on_player_path() {
        let driver = RecordingDriver::new(Some("s1"), None);
        let rest = Rest::new(driver.clone());

        rest.destroy_player("424242").await.unwrap();

        let recorded = driver.recorded().await;
        assert_eq!(recorded[0].path, "/sessions/s1/players/424242");
        assert_eq!(recorded[0].method.as_str(), "DELETE");
    }

    #[tokio::test]
    async fn test_load_tracks_empty_response_is_empty_result() {
        let driver = RecordingDriver::new(Some("s1"), None);
        let rest = Rest::new(driver.clone());

        let result = rest.load_tracks("ytsearch:azur lane").await.unwrap();
        assert_eq!(result, LoadResult::Empty);

        let recorded = driver.recorded().await;
        assert_eq!(recorded[0].path, "/loadtracks");
        assert_eq!(
            recorded[0].param("identifier"),
            Some("ytsearch:azur lane")
        );
    }

    #[tokio::test]
    async fn test_load_tracks_parses_canonical_result() {
        let driver = RecordingDriver::new(
            Some("s1"),
            Some(json!({ "loadType": "search", "data": [] })),
        );
        let rest = Rest::new(driver);
        assert_eq!(
            rest.load_tracks("ytsearch:x").await.unwrap(),
            LoadResult::Search(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_unmark_failed_address_posts_address_body() {
        let driver = RecordingDriver::new(Some("s1"), None);
        let rest = Rest::new(driver.clone());

        rest.unmark_failed_address("10.0.0.1").await.unwrap();

        let recorded = driver.recorded().await;
        assert_eq!(recorded[0].path, "/routeplanner/free/address");
        assert_eq!(recorded[0].method.as_str(), "POST");
        assert_eq!(
            recorded[0].body,
            Some(json!({ "address": "10.0.0.1" }))
        );
    }

    #[tokio::test]
    async fn test_get_info_hits_info_path() {
        let driver =
            RecordingDriver::new(Some("s1"), Some(json!({ "version": {} })));
        let rest = Rest::new(driver.clone());

        let info = rest.get_info().await.unwrap();
        assert!(info.is_some());
        assert_eq!(driver.recorded().await[0].path, "/info");
    }
}
