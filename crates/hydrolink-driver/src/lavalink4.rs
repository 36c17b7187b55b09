//! Lavalink v4, the reference dialect.
//!
//! The canonical schema *is* the v4 schema, so translation here is mostly
//! identity: inbound messages parse directly and player updates become a
//! single `PATCH /v4/sessions/{session}/players/{guild}` call.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use hydrolink_protocol::{
    BlobLayout, NodeMessage, ProtocolError, Track, UpdatePlayer,
};
use hydrolink_transport::TransportEvent;

use crate::error::DriverError;
use crate::requester::{RestClient, RestRequest};
use crate::{ClientIdentity, Driver, DriverCore, NodeProfile, OutboundPlan};

pub(crate) const ID: &str = "lavalink/v4/koinu";

pub struct Lavalink4Driver {
    profile: NodeProfile,
    identity: ClientIdentity,
    rest: RestClient,
    core: DriverCore,
}

impl Lavalink4Driver {
    pub fn new(
        profile: NodeProfile,
        identity: ClientIdentity,
    ) -> Result<Self, DriverError> {
        let rest = RestClient::new(&profile, &identity, "/v4")?;
        Ok(Self {
            profile,
            identity,
            rest,
            core: DriverCore::new(),
        })
    }
}

#[async_trait]
impl Driver for Lavalink4Driver {
    fn id(&self) -> &'static str {
        ID
    }

    async fn session_id(&self) -> Option<String> {
        self.core.session().await
    }

    async fn set_session_id(&self, session_id: Option<String>) {
        self.core.set_session(session_id).await;
    }

    async fn connect(
        &self,
    ) -> Result<UnboundedReceiver<TransportEvent>, DriverError> {
        let session = self.core.session().await;
        let headers = self
            .identity
            .connect_headers(&self.profile.auth, session.as_deref());
        self.core
            .open(
                &self.profile.ws_url("/v4/websocket"),
                headers,
                self.profile.legacy_ws,
            )
            .await
    }

    async fn send_raw(&self, text: &str) -> Result<(), DriverError> {
        self.core.send(&self.profile.name, text).await
    }

    async fn ws_close(&self) -> Result<(), DriverError> {
        self.core.close(&self.profile.name).await
    }

    fn translate_inbound(&self, raw: &str) -> Option<NodeMessage> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!(
                    node = %self.profile.name,
                    error = %err,
                    "dropping unparseable node message"
                );
                None
            }
        }
    }

    async fn translate_outbound(
        &self,
        update: &UpdatePlayer,
    ) -> Result<OutboundPlan, DriverError> {
        let session = self
            .core
            .session()
            .await
            .ok_or(DriverError::SessionNotReady)?;
        let body = serde_json::to_value(&update.data)
            .map_err(|err| DriverError::InvalidPayload(err.to_string()))?;
        let request = RestRequest::patch(
            format!("/sessions/{session}/players/{}", update.guild_id),
            body,
        )
        .with_params(vec![(
            "noReplace".to_string(),
            update.no_replace.to_string(),
        )]);
        Ok(OutboundPlan::Rest(request))
    }

    async fn request(
        &self,
        request: RestRequest,
    ) -> Result<Option<Value>, DriverError> {
        if request.path.contains("/sessions")
            && self.core.session().await.is_none()
        {
            return Err(DriverError::SessionNotReady);
        }

        // Decode locally when we can; fall through to the backend's
        // endpoint for blob versions we do not understand.
        if request.path.contains("/decodetrack") {
            if let Some(encoded) = request.param("encodedTrack") {
                match self.decode_track(encoded) {
                    Ok(track) => {
                        return Ok(serde_json::to_value(track).ok());
                    }
                    Err(err) => {
                        tracing::debug!(
                            node = %self.profile.name,
                            error = %err,
                            "local track decode failed, asking the backend"
                        );
                    }
                }
            }
        }

        self.rest.execute(request).await
    }

    async fn update_session(
        &self,
        resume: bool,
        timeout_secs: u64,
    ) -> Result<(), DriverError> {
        let session = self.core.session().await.unwrap_or_default();
        let request = RestRequest::patch(
            format!("/sessions/{session}"),
            serde_json::json!({ "resuming": resume, "timeout": timeout_secs }),
        );
        self.request(request).await?;
        tracing::debug!(
            node = %self.profile.name,
            resume,
            timeout_secs,
            "session configuration updated"
        );
        Ok(())
    }

    fn decode_track(&self, encoded: &str) -> Result<Track, ProtocolError> {
        hydrolink_protocol::decode_track(encoded, BlobLayout::Versioned)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{test_identity, test_profile};
    use hydrolink_protocol::{
        PlayerUpdateData, TrackInfo, UpdateTrack, encode_track,
    };
    use reqwest::Method;
    use serde_json::json;

    fn driver() -> Lavalink4Driver {
        Lavalink4Driver::new(test_profile(), test_identity()).unwrap()
    }

    #[tokio::test]
    async fn test_translate_outbound_builds_player_patch() {
        let driver = driver();
        driver.set_session_id(Some("sess1".into())).await;

        let update = UpdatePlayer {
            guild_id: "42".into(),
            no_replace: true,
            data: PlayerUpdateData {
                track: Some(UpdateTrack {
                    encoded: Some("QAAA...".into()),
                    ..Default::default()
                }),
                volume: Some(80),
                ..Default::default()
            },
        };

        match driver.translate_outbound(&update).await.unwrap() {
            OutboundPlan::Rest(request) => {
                assert_eq!(request.path, "/sessions/sess1/players/42");
                assert_eq!(request.method, Method::PATCH);
                assert_eq!(request.param("noReplace"), Some("true"));
                let body = request.body.unwrap();
                assert_eq!(body["track"]["encoded"], "QAAA...");
                assert_eq!(body["volume"], 80);
                // Untouched fields must stay off the wire entirely.
                assert!(body.get("paused").is_none());
            }
            other => panic!("expected rest plan, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_translate_outbound_requires_session() {
        let driver = driver();
        let update = UpdatePlayer::new("42");
        assert!(matches!(
            driver.translate_outbound(&update).await,
            Err(DriverError::SessionNotReady)
        ));
    }

    #[tokio::test]
    async fn test_request_guards_session_scoped_paths() {
        let driver = driver();
        let result = driver
            .request(RestRequest::get("/sessions/abc/players"))
            .await;
        assert!(matches!(result, Err(DriverError::SessionNotReady)));
    }

    #[tokio::test]
    async fn test_request_decodes_tracks_locally() {
        let driver = driver();
        let info = TrackInfo {
            title: "Stardust".into(),
            author: "Hoagy Carmichael".into(),
            duration_ms: 194_000,
            identifier: "abc123".into(),
            is_seekable: true,
            is_stream: false,
            uri: Some("https://youtu.be/abc123".into()),
            artwork_url: None,
            isrc: None,
            source_name: "youtube".into(),
            position_ms: 0,
        };
        let encoded = encode_track(&info, BlobLayout::Versioned, 3);

        // No HTTP server is listening; a hit on the local decoder is the
        // only way this returns Ok.
        let value = driver
            .request(RestRequest::get("/decodetrack").with_params(vec![(
                "encodedTrack".into(),
                encoded.clone(),
            )]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["encoded"], encoded.as_str());
        assert_eq!(value["info"]["title"], "Stardust");
        assert_eq!(value["info"]["sourceName"], "youtube");
    }

    #[test]
    fn test_translate_inbound_parses_ready() {
        let driver = driver();
        let raw = json!({
            "op": "ready",
            "resumed": false,
            "sessionId": "sess9"
        })
        .to_string();
        match driver.translate_inbound(&raw) {
            Some(NodeMessage::Ready { session_id, .. }) => {
                assert_eq!(session_id, "sess9")
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_translate_inbound_drops_garbage() {
        let driver = driver();
        assert_eq!(driver.translate_inbound("not json"), None);
        assert_eq!(
            driver.translate_inbound(r#"{"op":"discombobulate"}"#),
            None
        );
    }
}
