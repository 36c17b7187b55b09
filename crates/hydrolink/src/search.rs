//! Query shaping and search results.

use serde_json::Value;

use hydrolink_protocol::{LoadException, LoadResult, Track};

/// Known engines: full name to the short id used in search prefixes.
const SOURCES: &[(&str, &str)] = &[
    ("youtube", "yt"),
    ("youtubeMusic", "ytm"),
    ("soundcloud", "sc"),
];

/// Resolves an engine name to its search-prefix id.
///
/// Accepts both the full name (`youtube`) and the short id (`yt`).
/// Unknown names pass through unchanged, so backends with extra source
/// plugins keep working without a table update here.
pub(crate) fn resolve_source(engine: &str) -> &str {
    for (name, short) in SOURCES {
        if engine == *name || engine == *short {
            return short;
        }
    }
    tracing::debug!(engine, "engine not in the source table, using as-is");
    engine
}

pub(crate) fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}

/// The identifier a node's load endpoint should resolve: URLs go
/// through untouched, anything else becomes a prefixed search query.
pub(crate) fn build_identifier(query: &str, engine: &str) -> String {
    if is_url(query) {
        query.to_string()
    } else {
        format!("{}search:{query}", resolve_source(engine))
    }
}

/// Which canonical load result a search resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Playlist,
    Search,
    Empty,
    Error,
}

/// Outcome of [`Manager::search`](crate::Manager::search).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub kind: SearchKind,

    /// Resolved tracks, however the backend grouped them.
    pub tracks: Vec<Track>,

    /// Set when the result was a playlist.
    pub playlist_name: Option<String>,

    /// Set when the backend reported a load failure.
    pub exception: Option<LoadException>,

    /// Opaque identity of whoever asked, carried along for the caller.
    pub requester: Option<Value>,
}

impl SearchResponse {
    pub(crate) fn from_load(
        result: LoadResult,
        requester: Option<Value>,
    ) -> Self {
        let (kind, tracks, playlist_name, exception) = match result {
            LoadResult::Track(track) => {
                (SearchKind::Track, vec![track], None, None)
            }
            LoadResult::Playlist(playlist) => (
                SearchKind::Playlist,
                playlist.tracks,
                Some(playlist.info.name),
                None,
            ),
            LoadResult::Search(tracks) => {
                (SearchKind::Search, tracks, None, None)
            }
            LoadResult::Empty => (SearchKind::Empty, Vec::new(), None, None),
            LoadResult::Error(exception) => {
                (SearchKind::Error, Vec::new(), None, Some(exception))
            }
        };
        Self {
            kind,
            tracks,
            playlist_name,
            exception,
            requester,
        }
    }

    /// True when nothing playable came back.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hydrolink_protocol::{Playlist, PlaylistInfo, TrackInfo};
    use serde_json::json;

    fn track(title: &str) -> Track {
        Track {
            encoded: format!("blob-{title}"),
            info: TrackInfo {
                title: title.into(),
                author: "tester".into(),
                duration_ms: 1000,
                identifier: title.into(),
                is_seekable: true,
                is_stream: false,
                uri: None,
                artwork_url: None,
                isrc: None,
                source_name: "youtube".into(),
                position_ms: 0,
            },
            plugin_info: json!({}),
        }
    }

    #[test]
    fn test_resolve_source_accepts_names_and_ids() {
        assert_eq!(resolve_source("youtube"), "yt");
        assert_eq!(resolve_source("yt"), "yt");
        assert_eq!(resolve_source("youtubeMusic"), "ytm");
        assert_eq!(resolve_source("soundcloud"), "sc");
        assert_eq!(resolve_source("sc"), "sc");
    }

    #[test]
    fn test_resolve_source_passes_unknown_through() {
        assert_eq!(resolve_source("deezer"), "deezer");
    }

    #[test]
    fn test_build_identifier_prefixes_plain_text() {
        assert_eq!(
            build_identifier("never gonna give", "youtube"),
            "ytsearch:never gonna give"
        );
        assert_eq!(build_identifier("hello", "sc"), "scsearch:hello");
    }

    #[test]
    fn test_build_identifier_keeps_urls() {
        let url = "https://youtu.be/dQw4w9WgXcQ";
        assert_eq!(build_identifier(url, "youtube"), url);
        assert_eq!(
            build_identifier("http://radio.example/stream", "soundcloud"),
            "http://radio.example/stream"
        );
    }

    #[test]
    fn test_from_load_maps_playlist() {
        let result = LoadResult::Playlist(Playlist {
            info: PlaylistInfo {
                name: "mix".into(),
                selected_track: -1,
            },
            plugin_info: json!({}),
            tracks: vec![track("a"), track("b")],
        });

        let response = SearchResponse::from_load(result, Some(json!("user")));
        assert_eq!(response.kind, SearchKind::Playlist);
        assert_eq!(response.tracks.len(), 2);
        assert_eq!(response.playlist_name.as_deref(), Some("mix"));
        assert_eq!(response.requester, Some(json!("user")));
        assert!(!response.is_empty());
    }

    #[test]
    fn test_from_load_maps_error_with_exception() {
        let result = LoadResult::Error(LoadException {
            message: Some("region locked".into()),
            severity: "common".into(),
            cause: None,
        });

        let response = SearchResponse::from_load(result, None);
        assert_eq!(response.kind, SearchKind::Error);
        assert!(response.is_empty());
        assert_eq!(
            response.exception.unwrap().message.as_deref(),
            Some("region locked")
        );
    }

    #[test]
    fn test_from_load_maps_single_track() {
        let response =
            SearchResponse::from_load(LoadResult::Track(track("one")), None);
        assert_eq!(response.kind, SearchKind::Track);
        assert_eq!(response.tracks.len(), 1);
        assert_eq!(response.playlist_name, None);
    }
}
