// Copyright 2026 Mapscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mapscout event bus: typed progress events from a harvest run.
//!
//! The bus is a `tokio::sync::broadcast` channel carrying [`HarvestEvent`]
//! values. Any consumer (CLI progress output, log sinks, embedding tools)
//! can subscribe independently. When no subscribers exist, events are
//! silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event a harvest run emits. Serialized to JSON for external consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// A capture window was opened and script instrumentation enabled.
    CaptureOpened,
    /// The capture window closed with this many map-carrying scripts buffered.
    CaptureClosed { scripts: usize },
    /// Concurrent resolution of the buffered scripts has started.
    ResolutionStarted { scripts: usize },
    /// One script's source map was retrieved and parsed.
    MapResolved {
        script_url: String,
        source_map_url: Option<String>,
    },
    /// One script's source map could not be retrieved or parsed.
    MapFailed { script_url: String, error: String },
    /// The whole run finished; the result collection was handed to the caller.
    HarvestComplete {
        scripts: usize,
        resolved: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

/// The harvest event bus.
///
/// Cloning is cheap and every clone feeds the same set of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}
