//! FrequenC v1, the snake_case dialect.
//!
//! FrequenC is a from-scratch C backend with its own conventions: JSON
//! keys are snake_case in both directions, the identity header is
//! `client-info` rather than `client-name`, track blobs always carry the
//! extended header regardless of their version byte, and sessions cannot
//! be resumed. Endpoints live under `/v1`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use hydrolink_protocol::{
    BlobLayout, NodeMessage, ProtocolError, Track, UpdatePlayer,
    camel_to_snake, snake_to_camel,
};
use hydrolink_transport::TransportEvent;

use crate::error::DriverError;
use crate::requester::{RestClient, RestRequest};
use crate::{ClientIdentity, Driver, DriverCore, NodeProfile, OutboundPlan};

pub(crate) const ID: &str = "frequenc/v1/miku";

pub struct FrequencDriver {
    profile: NodeProfile,
    identity: ClientIdentity,
    rest: RestClient,
    core: DriverCore,
}

impl FrequencDriver {
    pub fn new(
        profile: NodeProfile,
        identity: ClientIdentity,
    ) -> Result<Self, DriverError> {
        let rest =
            RestClient::new(&profile, &identity, "/v1")?.wrap_non_json();
        Ok(Self {
            profile,
            identity,
            rest,
            core: DriverCore::new(),
        })
    }
}

#[async_trait]
impl Driver for FrequencDriver {
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
        // FrequenC's identity header is `client-info`; there is no
        // `session-id` because resuming does not exist here.
        let headers = vec![
            ("authorization".to_string(), self.profile.auth.clone()),
            ("user-id".to_string(), self.identity.user_id.clone()),
            ("client-info".to_string(), self.identity.client_name.clone()),
            ("user-agent".to_string(), self.identity.user_agent.clone()),
            (
                "num-shards".to_string(),
                self.identity.shard_count.to_string(),
            ),
        ];
        self.core
            .open(
                &self.profile.ws_url("/v1/websocket"),
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
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(
                    node = %self.profile.name,
                    error = %err,
                    "dropping unparseable node message"
                );
                return None;
            }
        };

        match serde_json::from_value(snake_to_camel(value)) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!(
                    node = %self.profile.name,
                    error = %err,
                    "dropping node message with unknown shape"
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
        // The body stays canonical here; `request` owns the snake_case
        // rewrite for every call uniformly.
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

        let mut request = request;
        request.body = prepare_body(request.body);
        let response = self.rest.execute(request).await?;
        Ok(response.map(snake_to_camel))
    }

    async fn update_session(
        &self,
        resume: bool,
        timeout_secs: u64,
    ) -> Result<(), DriverError> {
        let _ = (resume, timeout_secs);
        tracing::debug!(
            node = %self.profile.name,
            "frequenc does not support resuming, skipping session update"
        );
        Ok(())
    }

    fn decode_track(&self, encoded: &str) -> Result<Track, ProtocolError> {
        hydrolink_protocol::decode_track(encoded, BlobLayout::Extended)
    }
}

/// Rewrites a request body into FrequenC's casing and drops bodies with
/// nothing in them; FrequenC rejects requests carrying a literal `{}`.
fn prepare_body(body: Option<Value>) -> Option<Value> {
    let body = camel_to_snake(body?);
    match &body {
        Value::Object(map) if map.is_empty() => None,
        _ => Some(body),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hydrolink_protocol::{PlayerEvent, TrackInfo, encode_track};
    use serde_json::json;

    fn driver() -> FrequencDriver {
        FrequencDriver::new(
            crate::tests::test_profile(),
            crate::tests::test_identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_prepare_body_converts_and_strips() {
        let body = prepare_body(Some(json!({
            "encodedTrack": "QAAA",
            "userData": { "requesterId": "1" },
        })))
        .unwrap();
        assert_eq!(
            body,
            json!({
                "encoded_track": "QAAA",
                "user_data": { "requester_id": "1" },
            })
        );

        assert_eq!(prepare_body(Some(json!({}))), None);
        assert_eq!(prepare_body(None), None);
    }

    #[test]
    fn test_translate_inbound_converts_snake_keys() {
        let driver = driver();
        let raw = json!({ "op": "ready", "session_id": "fqc1" }).to_string();
        match driver.translate_inbound(&raw) {
            Some(NodeMessage::Ready {
                session_id,
                resumed,
            }) => {
                assert_eq!(session_id, "fqc1");
                assert!(!resumed);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_translate_inbound_converts_nested_track() {
        let driver = driver();
        let raw = json!({
            "op": "event",
            "type": "TrackStartEvent",
            "guild_id": "42",
            "track": {
                "encoded": "QAAA",
                "info": {
                    "title": "Tetoris",
                    "author": "Kasane Teto",
                    "length": 132_000,
                    "identifier": "t3t0",
                    "is_seekable": true,
                    "is_stream": false,
                    "source_name": "youtube",
                    "position": 0,
                },
            },
        })
        .to_string();

        match driver.translate_inbound(&raw) {
            Some(NodeMessage::Event(PlayerEvent::TrackStart {
                guild_id,
                track: Some(track),
            })) => {
                assert_eq!(guild_id, "42");
                assert_eq!(track.info.title, "Tetoris");
                assert!(track.info.is_seekable);
            }
            other => panic!("expected TrackStart with track, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_decodes_with_extended_layout() {
        let driver = driver();
        let info = TrackInfo {
            title: "Triple Baka".into(),
            author: "LamazeP".into(),
            duration_ms: 254_000,
            identifier: "fq-1".into(),
            is_seekable: true,
            is_stream: false,
            uri: Some("https://example.com/fq-1".into()),
            artwork_url: Some("https://example.com/fq-1.jpg".into()),
            isrc: None,
            source_name: "http".into(),
            position_ms: 0,
        };
        // Version byte 1: only the always-extended layout can read this
        // blob's uri and artwork fields.
        let encoded = encode_track(&info, BlobLayout::Extended, 1);

        let value = driver
            .request(RestRequest::get("/decodetrack").with_params(vec![(
                "encodedTrack".into(),
                encoded.clone(),
            )]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["info"]["title"], "Triple Baka");
        assert_eq!(
            value["info"]["artworkUrl"],
            "https://example.com/fq-1.jpg"
        );
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
    async fn test_translate_outbound_keeps_canonical_body() {
        let driver = driver();
        driver.set_session_id(Some("fqc1".into())).await;
        let mut update = UpdatePlayer::new("42");
        update.data.volume = Some(100);

        match driver.translate_outbound(&update).await.unwrap() {
            OutboundPlan::Rest(request) => {
                assert_eq!(request.path, "/sessions/fqc1/players/42");
                // Casing is applied in `request`, not in the plan.
                assert_eq!(request.body.unwrap()["volume"], 100);
            }
            other => panic!("expected rest plan, got {other:?}"),
        }
    }
}
