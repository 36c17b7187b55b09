//! Rolling statistics snapshot for one node.

use hydrolink_protocol::{CpuStats, FrameStats, MemoryStats, StatsPatch};

/// Last known load statistics for a node.
///
/// Starts at zero and is updated by folding in each `stats` message as it
/// arrives. Dialects report different subsets per message, so the snapshot
/// keeps whatever a message does not mention; values only move forward,
/// never reset, for as long as the node object lives.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeStats {
    pub players: u64,
    pub playing_players: u64,
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    pub frame_stats: FrameStats,
}

impl NodeStats {
    /// Folds one stats message into the snapshot. A section that is present
    /// replaces its counterpart wholesale; a missing section is left alone.
    pub fn merge(&mut self, patch: &StatsPatch) {
        if let Some(players) = patch.players {
            self.players = players;
        }
        if let Some(playing) = patch.playing_players {
            self.playing_players = playing;
        }
        if let Some(uptime) = patch.uptime {
            self.uptime = uptime;
        }
        if let Some(memory) = patch.memory {
            self.memory = memory;
        }
        if let Some(cpu) = patch.cpu {
            self.cpu = cpu;
        }
        if let Some(frames) = patch.frame_stats {
            self.frame_stats = frames;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
