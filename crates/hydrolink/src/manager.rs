//! The manager: node bootstrap, search, player lifecycle and voice
//! pairing, behind one handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;

use hydrolink_driver::{ClientIdentity, DriverKind, NodeProfile};
use hydrolink_node::{
    ConnectionOptions, NodeConnection, NodeError, NodeRegistry, NodeSignal,
};
use hydrolink_player::{EventRouter, Player, PlayerError, PlayerRegistry};
use hydrolink_protocol::{ClientEvent, LoadResult};

use crate::config::{ManagerOptions, NodeDescriptor};
use crate::error::HydrolinkError;
use crate::events::EventBus;
use crate::gateway::Gateway;
use crate::search::{SearchResponse, build_identifier, is_url, resolve_source};
use crate::voice::{PendingVoice, join_packet, leave_packet};

/// Options for creating one guild's player.
#[derive(Debug, Clone)]
pub struct CreatePlayerOptions {
    pub guild_id: String,

    /// Channel to join. Without one, no gateway packet is sent and the
    /// caller wires voice up itself.
    pub voice_channel_id: Option<String>,

    /// Gateway shard that owns the guild.
    pub shard_id: u32,

    /// Initial volume; the manager default applies when absent.
    pub volume: Option<u16>,

    /// Pin the player to a node by name.
    pub node: Option<String>,

    /// Prefer a node configured for this region.
    pub region: Option<String>,

    pub self_deaf: bool,
    pub self_mute: bool,
}

impl CreatePlayerOptions {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            voice_channel_id: None,
            shard_id: 0,
            volume: None,
            node: None,
            region: None,
            self_deaf: false,
            self_mute: false,
        }
    }
}

/// Search parameters beyond the query itself.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Engine override for plain-text queries.
    pub engine: Option<String>,

    /// Resolve on a specific node instead of the least used one.
    pub node: Option<String>,

    /// Opaque identity of the requesting user, carried onto the
    /// response.
    pub requester: Option<Value>,
}

/// Caller-supplied node selector; returning `None` falls back to the
/// built-in load balancing.
type NodeResolver =
    dyn Fn(&[NodeConnection]) -> Option<NodeConnection> + Send + Sync;

struct ManagerInner {
    gateway: Arc<dyn Gateway>,
    options: ManagerOptions,
    identity: ClientIdentity,
    nodes: NodeRegistry,
    players: PlayerRegistry,
    router: EventRouter,
    bus: EventBus,
    /// Half-assembled voice credentials per guild.
    voice: Mutex<HashMap<String, PendingVoice>>,
    /// Node name to configured region, for placement preferences.
    regions: Mutex<HashMap<String, String>>,
    resolver: Mutex<Option<Box<NodeResolver>>>,
}

/// The facade over the whole stack: node registry, players, search and
/// the event bus.
///
/// Cheap to clone; every clone drives the same state. All long-lived
/// work (socket loops, signal routing) runs on spawned tasks, so no
/// method here needs to be polled to keep nodes alive.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Builds the manager and connects every configured node.
    ///
    /// Identity (user id, shard count) is taken from the gateway adapter
    /// once, here; nodes added later reuse it.
    pub async fn new(
        gateway: Arc<dyn Gateway>,
        options: ManagerOptions,
    ) -> Result<Self, HydrolinkError> {
        let version = env!("CARGO_PKG_VERSION");
        let identity = ClientIdentity {
            user_id: gateway.user_id(),
            shard_count: gateway.shard_count(),
            user_agent: format!("hydrolink/{version}"),
            client_name: format!("hydrolink/{version}"),
            resume: options.resume,
        };

        let descriptors = options.nodes.clone();
        let players = PlayerRegistry::new();
        let manager = Self {
            inner: Arc::new(ManagerInner {
                gateway,
                identity,
                nodes: NodeRegistry::new(),
                router: EventRouter::new(players.clone()),
                players,
                bus: EventBus::new(),
                voice: Mutex::new(HashMap::new()),
                regions: Mutex::new(HashMap::new()),
                resolver: Mutex::new(None),
                options,
            }),
        };

        for descriptor in descriptors {
            manager.add_node(descriptor).await?;
        }
        Ok(manager)
    }

    /// Connects one more node and starts routing its traffic.
    pub async fn add_node(
        &self,
        descriptor: NodeDescriptor,
    ) -> Result<NodeConnection, HydrolinkError> {
        let kind = descriptor
            .driver
            .as_deref()
            .map(DriverKind::from_id)
            .unwrap_or(DriverKind::Lavalink4);

        let profile = NodeProfile {
            name: descriptor.name.clone(),
            host: descriptor.host,
            port: descriptor.port,
            auth: descriptor.auth,
            secure: descriptor.secure,
            legacy_ws: descriptor.legacy_ws,
        };
        let driver =
            kind.build(profile.clone(), self.inner.identity.clone())?;

        let connection_options = ConnectionOptions {
            retry_delay_ms: self.inner.options.retry_delay_ms,
            retry_count: self.inner.options.retry_count,
            resume: self.inner.options.resume,
            resume_timeout_secs: self.inner.options.resume_timeout_secs,
        };
        let (node, signals) =
            NodeConnection::open(profile, driver, connection_options);

        if let Some(region) = descriptor.region {
            self.inner
                .regions
                .lock()
                .await
                .insert(descriptor.name, region);
        }
        tokio::spawn(pump(
            signals,
            self.inner.router.clone(),
            self.inner.bus.clone(),
        ));
        self.inner.nodes.add(node.clone()).await;
        tracing::info!(node = node.name(), driver = kind.id(), "node added");
        Ok(node)
    }

    /// Disconnects a node and drops it from the registry. Players that
    /// lived on it keep their handle and surface errors on their next
    /// command.
    pub async fn remove_node(&self, name: &str) -> Result<(), HydrolinkError> {
        self.inner.nodes.remove(name).await?;
        self.inner.regions.lock().await.remove(name);
        Ok(())
    }

    /// A new subscription to the client event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.bus.subscribe()
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.inner.nodes
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.inner.players
    }

    /// Installs a custom node selector.
    ///
    /// The resolver sees every registered node and runs before the
    /// built-in least-used balancing; returning `None` defers to it.
    /// Explicit node names and region preferences still win.
    pub async fn set_node_resolver<F>(&self, resolver: F)
    where
        F: Fn(&[NodeConnection]) -> Option<NodeConnection>
            + Send
            + Sync
            + 'static,
    {
        *self.inner.resolver.lock().await = Some(Box::new(resolver));
    }

    // -- Players ---

    /// Creates a player for a guild and, when a voice channel is given,
    /// asks the gateway to join it.
    pub async fn create_player(
        &self,
        options: CreatePlayerOptions,
    ) -> Result<Player, HydrolinkError> {
        if self.inner.players.get(&options.guild_id).await.is_some() {
            return Err(HydrolinkError::PlayerAlreadyExists(options.guild_id));
        }

        let node = self
            .pick_node(options.node.as_deref(), options.region.as_deref())
            .await?;
        let volume = options
            .volume
            .unwrap_or(self.inner.options.default_volume);
        let player = Player::new(
            options.guild_id.clone(),
            options.voice_channel_id.clone(),
            options.shard_id,
            node,
            volume,
        );
        self.inner.players.insert(player.clone()).await;

        if let Some(channel_id) = &options.voice_channel_id {
            self.inner
                .voice
                .lock()
                .await
                .insert(options.guild_id.clone(), PendingVoice::default());
            self.inner
                .gateway
                .send_packet(
                    options.shard_id,
                    join_packet(
                        &options.guild_id,
                        channel_id,
                        options.self_deaf,
                        options.self_mute,
                    ),
                )
                .await;
            self.spawn_voice_watchdog(options.guild_id.clone());
        }

        tracing::info!(
            guild_id = %options.guild_id,
            node = player.node().name(),
            "player created"
        );
        self.inner.bus.publish(ClientEvent::PlayerCreate {
            guild_id: options.guild_id,
        });
        Ok(player)
    }

    /// Raises a diagnostic if voice credentials never complete for a
    /// freshly created player.
    fn spawn_voice_watchdog(&self, guild_id: String) {
        let inner = Arc::clone(&self.inner);
        let timeout =
            Duration::from_millis(inner.options.voice_connection_timeout_ms);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_pending = {
                let voice = inner.voice.lock().await;
                voice
                    .get(&guild_id)
                    .is_some_and(|pending| pending.complete().is_none())
            };
            if still_pending && inner.players.get(&guild_id).await.is_some() {
                inner.bus.debug(format!(
                    "voice credentials for guild {guild_id} did not arrive \
                     within {}ms",
                    timeout.as_millis()
                ));
            }
        });
    }

    /// Tears a guild's player down: backend delete, voice leave, and
    /// removal from the registry.
    pub async fn destroy_player(
        &self,
        guild_id: &str,
    ) -> Result<(), HydrolinkError> {
        let Some(player) = self.inner.players.remove(guild_id).await else {
            return Err(HydrolinkError::PlayerNotFound(guild_id.to_string()));
        };

        // Local cleanup happens even when the backend call fails; the
        // registry entry is already gone either way.
        let destroyed = match player.destroy().await {
            Ok(()) | Err(PlayerError::Destroyed(_)) => Ok(()),
            Err(error) => Err(error),
        };
        self.inner.voice.lock().await.remove(guild_id);
        self.inner
            .gateway
            .send_packet(player.shard_id(), leave_packet(guild_id))
            .await;
        self.inner.bus.publish(ClientEvent::PlayerDestroy {
            guild_id: guild_id.to_string(),
        });
        destroyed.map_err(Into::into)
    }

    // -- Node selection ---

    async fn pick_node(
        &self,
        name: Option<&str>,
        region: Option<&str>,
    ) -> Result<NodeConnection, HydrolinkError> {
        if let Some(name) = name {
            return match self.inner.nodes.get(name).await {
                Some(node) => Ok(node),
                None => Err(NodeError::UnknownNode(name.to_string()).into()),
            };
        }
        if let Some(region) = region {
            if let Some(node) = self.node_in_region(region).await {
                return Ok(node);
            }
            tracing::debug!(region, "no online node for region, falling back");
        }
        {
            let resolver = self.inner.resolver.lock().await;
            if let Some(resolver) = resolver.as_deref() {
                let nodes = self.inner.nodes.all().await;
                if let Some(node) = resolver(&nodes) {
                    return Ok(node);
                }
            }
        }
        Ok(self.inner.nodes.least_used().await?)
    }

    async fn node_in_region(&self, region: &str) -> Option<NodeConnection> {
        let regions = self.inner.regions.lock().await;
        for node in self.inner.nodes.all().await {
            if regions.get(node.name()).map(String::as_str) == Some(region)
                && node.is_online().await
            {
                return Some(node);
            }
        }
        None
    }

    // -- Search ---

    /// Resolves a query into tracks.
    ///
    /// URLs go to the backend untouched; plain text is turned into a
    /// `<source>search:` query on the requested (or default) engine. An
    /// empty result retries once on the configured fallback engine.
    pub async fn search(
        &self,
        query: &str,
        options: Option<SearchOptions>,
    ) -> Result<SearchResponse, HydrolinkError> {
        let options = options.unwrap_or_default();
        let node = self.pick_node(options.node.as_deref(), None).await?;

        let engine = options.engine.unwrap_or_else(|| {
            self.inner.options.default_search_engine.clone()
        });
        let identifier = build_identifier(query, &engine);
        tracing::debug!(node = node.name(), %identifier, "resolving query");

        let mut result = self.load(&node, &identifier).await?;

        let fallback = &self.inner.options.search_fallback;
        if no_tracks(&result)
            && fallback.enabled
            && !is_url(query)
            && resolve_source(&engine) != resolve_source(&fallback.engine)
        {
            let identifier = build_identifier(query, &fallback.engine);
            tracing::debug!(
                %identifier,
                "empty result, retrying on the fallback engine"
            );
            result = self.load(&node, &identifier).await?;
        }

        Ok(SearchResponse::from_load(result, options.requester))
    }

    /// One load call, with unreadable load results degraded to empty
    /// instead of failing the whole search.
    async fn load(
        &self,
        node: &NodeConnection,
        identifier: &str,
    ) -> Result<LoadResult, HydrolinkError> {
        match node.rest().load_tracks(identifier).await {
            Ok(result) => Ok(result),
            Err(NodeError::Protocol(error)) => {
                self.inner.bus.debug(format!(
                    "node {} returned an unreadable load result: {error}",
                    node.name()
                ));
                Ok(LoadResult::Empty)
            }
            Err(error) => Err(error.into()),
        }
    }

    // -- Voice plumbing ---

    /// Forward from the host's voice state update handler, for the
    /// bot's own user only.
    ///
    /// A `None` channel means the bot left (or was moved out of) voice:
    /// pending credentials are dropped and the player is paused and
    /// marked disconnected.
    pub async fn voice_state_update(
        &self,
        guild_id: &str,
        session_id: Option<String>,
        channel_id: Option<String>,
    ) {
        if channel_id.is_none() {
            self.inner.voice.lock().await.remove(guild_id);
            if let Some(player) = self.inner.players.get(guild_id).await {
                if let Err(error) = player.disconnect().await {
                    tracing::debug!(
                        %guild_id,
                        %error,
                        "disconnect after voice drop failed"
                    );
                }
                self.inner.bus.debug(format!(
                    "guild {guild_id} left voice, player disconnected"
                ));
            }
            return;
        }

        if let Some(session_id) = session_id {
            let mut voice = self.inner.voice.lock().await;
            voice.entry(guild_id.to_string()).or_default().session_id =
                Some(session_id);
        }
        self.try_forward_voice(guild_id).await;
    }

    /// Forward from the host's voice server update handler.
    ///
    /// Discord sends a null endpoint while a voice server is being
    /// reassigned; such updates are skipped and the next complete one
    /// wins.
    pub async fn voice_server_update(
        &self,
        guild_id: &str,
        token: String,
        endpoint: Option<String>,
    ) {
        let Some(endpoint) = endpoint else {
            tracing::debug!(
                %guild_id,
                "voice server update without endpoint, waiting for the next"
            );
            return;
        };
        {
            let mut voice = self.inner.voice.lock().await;
            let pending = voice.entry(guild_id.to_string()).or_default();
            pending.token = Some(token);
            pending.endpoint = Some(endpoint);
        }
        self.try_forward_voice(guild_id).await;
    }

    async fn try_forward_voice(&self, guild_id: &str) {
        let update = {
            let voice = self.inner.voice.lock().await;
            voice.get(guild_id).and_then(PendingVoice::complete)
        };
        let Some(update) = update else { return };
        let Some(player) = self.inner.players.get(guild_id).await else {
            tracing::debug!(
                %guild_id,
                "voice credentials for a guild without a player"
            );
            return;
        };

        match player.update_voice(update).await {
            Ok(()) => self.inner.bus.debug(format!(
                "voice credentials forwarded for guild {guild_id}"
            )),
            Err(error) => {
                tracing::warn!(%guild_id, %error, "voice forwarding failed");
                self.inner.bus.publish(ClientEvent::Debug {
                    message: format!(
                        "voice forwarding failed for guild {guild_id}: {error}"
                    ),
                });
            }
        }
    }
}

fn no_tracks(result: &LoadResult) -> bool {
    match result {
        LoadResult::Empty => true,
        LoadResult::Search(tracks) => tracks.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Signal pump
// ---------------------------------------------------------------------------

/// Drains one node's signal stream into the shared bus, routing player
/// traffic through the router first. Ends when the node closes for
/// good.
async fn pump(
    mut signals: UnboundedReceiver<NodeSignal>,
    router: EventRouter,
    bus: EventBus,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            NodeSignal::Event(event) => bus.publish(event),
            NodeSignal::Player(event) => {
                for event in router.route(event).await {
                    bus.publish(event);
                }
            }
            NodeSignal::Update { guild_id, state } => {
                for event in router.position_update(&guild_id, state).await {
                    bus.publish(event);
                }
            }
        }
    }
}
