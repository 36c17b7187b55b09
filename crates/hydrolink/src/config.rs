//! Manager configuration.

use serde::Deserialize;

/// Everything [`Manager::new`](crate::Manager::new) needs, deserializable
/// from the host's own config format. Every field has a default, so an
/// empty object is a valid (if nodeless) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Delay between node reconnect attempts.
    pub retry_delay_ms: u64,

    /// Reconnect attempts before a node is declared closed.
    pub retry_count: u32,

    /// How long a created player may wait for voice credentials before
    /// a diagnostic is raised.
    pub voice_connection_timeout_ms: u64,

    /// Engine used when a search query names none.
    pub default_search_engine: String,

    /// Volume for new players that do not specify one.
    pub default_volume: u16,

    pub search_fallback: SearchFallback,

    /// Ask backends to keep the session alive across reconnects.
    pub resume: bool,

    /// Backend-side session lifetime when resuming is on.
    pub resume_timeout_secs: u64,

    /// Nodes to connect at startup. More can be added at runtime.
    pub nodes: Vec<NodeDescriptor>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            retry_delay_ms: 3000,
            retry_count: 15,
            voice_connection_timeout_ms: 15_000,
            default_search_engine: "youtube".into(),
            default_volume: 100,
            search_fallback: SearchFallback::default(),
            resume: false,
            resume_timeout_secs: 300,
            nodes: Vec::new(),
        }
    }
}

/// One retry on a second engine when a search comes back empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchFallback {
    pub enabled: bool,
    pub engine: String,
}

impl Default for SearchFallback {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: "soundcloud".into(),
        }
    }
}

/// Connection coordinates for one backend node, as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Shared secret for the `Authorization` header.
    pub auth: String,

    #[serde(default)]
    pub secure: bool,

    /// Dialect id, e.g. `lavalink/v4/koinu`. Defaults to Lavalink v4.
    #[serde(default)]
    pub driver: Option<String>,

    /// Use the library websocket implementation instead of the
    /// handcrafted frame codec.
    #[serde(default)]
    pub legacy_ws: bool,

    /// Scheduling hint: players asking for this region prefer this node.
    #[serde(default)]
    pub region: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_options_empty_object_yields_defaults() {
        let options: ManagerOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.retry_delay_ms, 3000);
        assert_eq!(options.retry_count, 15);
        assert_eq!(options.voice_connection_timeout_ms, 15_000);
        assert_eq!(options.default_search_engine, "youtube");
        assert_eq!(options.default_volume, 100);
        assert!(options.search_fallback.enabled);
        assert_eq!(options.search_fallback.engine, "soundcloud");
        assert!(!options.resume);
        assert_eq!(options.resume_timeout_secs, 300);
        assert!(options.nodes.is_empty());
    }

    #[test]
    fn test_manager_options_partial_override() {
        let options: ManagerOptions = serde_json::from_str(
            r#"{
                "retry_count": 2,
                "search_fallback": { "enabled": false },
                "nodes": [{
                    "name": "main",
                    "host": "lava.example.com",
                    "port": 2333,
                    "auth": "secret"
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(options.retry_count, 2);
        // Untouched fields keep their defaults.
        assert_eq!(options.retry_delay_ms, 3000);
        assert!(!options.search_fallback.enabled);
        assert_eq!(options.search_fallback.engine, "soundcloud");

        let node = &options.nodes[0];
        assert_eq!(node.name, "main");
        assert!(!node.secure);
        assert_eq!(node.driver, None);
        assert!(!node.legacy_ws);
        assert_eq!(node.region, None);
    }

    #[test]
    fn test_node_descriptor_requires_coordinates() {
        let result = serde_json::from_str::<NodeDescriptor>(
            r#"{ "name": "incomplete" }"#,
        );
        assert!(result.is_err());
    }
}
