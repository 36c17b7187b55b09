//! Nodelink v2, a v4-family dialect with its own load taxonomy.
//!
//! Nodelink mirrors the v4 endpoint layout and message shapes, but its
//! load results use content categories (`shorts`, `album`, `artist`,
//! `episode`, ...) instead of the five canonical discriminants, and it is
//! the only backend serving lyrics (`GET /v4/loadlyrics`). Sessions cannot
//! be resumed.

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

pub(crate) const ID: &str = "nodelink/v2/nari";

pub struct Nodelink2Driver {
    profile: NodeProfile,
    identity: ClientIdentity,
    rest: RestClient,
    core: DriverCore,
}

impl Nodelink2Driver {
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
impl Driver for Nodelink2Driver {
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

        let response = self.rest.execute(request).await?;
        Ok(response.map(convert_categories))
    }

    async fn update_session(
        &self,
        resume: bool,
        timeout_secs: u64,
    ) -> Result<(), DriverError> {
        let _ = (resume, timeout_secs);
        tracing::debug!(
            node = %self.profile.name,
            "nodelink does not support resuming, skipping session update"
        );
        Ok(())
    }

    fn decode_track(&self, encoded: &str) -> Result<Track, ProtocolError> {
        hydrolink_protocol::decode_track(encoded, BlobLayout::Versioned)
    }

    async fn get_lyrics(
        &self,
        encoded: &str,
        language: Option<&str>,
    ) -> Result<Option<Value>, DriverError> {
        self.request(lyrics_request(encoded, language)).await
    }
}

fn lyrics_request(encoded: &str, language: Option<&str>) -> RestRequest {
    RestRequest::get("/loadlyrics").with_params(vec![
        ("encodedTrack".to_string(), encoded.to_string()),
        ("language".to_string(), language.unwrap_or("en").to_string()),
    ])
}

/// Maps Nodelink's content categories onto the canonical discriminants.
///
/// Only the discriminant is rewritten; the payload already has the v4
/// shape. Categories we do not recognize (and non-load responses such as
/// lyrics) pass through untouched.
fn convert_categories(mut value: Value) -> Value {
    let Some(load_type) = value.get("loadType").and_then(Value::as_str)
    else {
        return value;
    };
    let canonical = match load_type {
        "shorts" | "short" => "track",
        "album" | "playlist" | "artist" | "show" | "podcast" | "episode" => {
            "playlist"
        }
        _ => return value,
    };
    value["loadType"] = Value::String(canonical.to_string());
    value
}

// =========================================================================
// Tests
// =========================================================================
