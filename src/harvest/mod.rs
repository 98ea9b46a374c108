// Copyright 2026 Mapscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! The capture-then-resolve pipeline.
//!
//! A harvest run opens a capture window over a page session, buffers every
//! script-parse notification that declares a source map, and at window close
//! resolves all buffered references concurrently. Each buffered script yields
//! exactly one [`MapOutcome`], in arrival order, with per-script failures
//! reported inline instead of aborting the batch.

pub mod aggregate;
pub mod capture;
pub mod fetch;
pub mod resolve;

use crate::config::HarvestConfig;
use crate::events::{EventBus, HarvestEvent};
use crate::inspector::InspectorPage;
use anyhow::{bail, Result};
use capture::CaptureWindow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// A buffered capture entry: a script that declared a source map.
///
/// The map reference is non-optional here; scripts without one never enter
/// the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedScript {
    /// URL the script was loaded from.
    pub script_url: String,
    /// The declared reference, verbatim: either a `data:` payload or a
    /// possibly-relative URL.
    pub map_reference: String,
}

/// The result of resolving one buffered script's source map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MapOutcome {
    /// The map was retrieved and parsed.
    Resolved {
        script_url: String,
        /// Resolved absolute map location; `None` for inline payloads, where
        /// nothing external was fetched.
        source_map_url: Option<String>,
        /// The parsed map document.
        map: Value,
    },
    /// The map could not be retrieved or parsed.
    Failed {
        script_url: String,
        /// Resolved absolute map location when one was computed before the
        /// failure; `None` for inline payloads.
        source_map_url: Option<String>,
        error: String,
    },
}

impl MapOutcome {
    pub fn script_url(&self) -> &str {
        match self {
            Self::Resolved { script_url, .. } | Self::Failed { script_url, .. } => script_url,
        }
    }

    pub fn source_map_url(&self) -> Option<&str> {
        match self {
            Self::Resolved { source_map_url, .. } | Self::Failed { source_map_url, .. } => {
                source_map_url.as_deref()
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

enum Phase {
    Idle,
    Capturing(CaptureWindow),
    Done,
}

/// A single harvest run: Idle, then Capturing between `begin` and `finish`,
/// then Done once the result collection has been handed out.
///
/// Misuse (finishing without beginning, finishing twice, beginning twice)
/// fails fast with a descriptive error instead of hanging.
pub struct SourceMapHarvest {
    config: HarvestConfig,
    bus: Option<EventBus>,
    phase: Phase,
}

impl SourceMapHarvest {
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            bus: None,
            phase: Phase::Idle,
        }
    }

    /// Like `new`, but progress events are emitted on `bus`.
    pub fn with_bus(config: HarvestConfig, bus: EventBus) -> Self {
        Self {
            config,
            bus: Some(bus),
            phase: Phase::Idle,
        }
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(bus) = &self.bus {
            bus.emit(event);
        }
    }

    /// Open the capture window: subscribe to script events and enable
    /// instrumentation on the page.
    pub async fn begin(&mut self, page: &dyn InspectorPage) -> Result<()> {
        match self.phase {
            Phase::Idle => {}
            Phase::Capturing(_) => bail!("a capture window is already open"),
            Phase::Done => bail!("harvest already completed; reset before reuse"),
        }

        let window = CaptureWindow::open(page).await?;
        self.phase = Phase::Capturing(window);
        self.emit(HarvestEvent::CaptureOpened);
        debug!("capture window opened");
        Ok(())
    }

    /// Close the capture window and resolve every buffered script, returning
    /// one outcome per script in arrival order. Yields the collection exactly
    /// once.
    pub async fn finish(&mut self, page: &dyn InspectorPage) -> Result<Vec<MapOutcome>> {
        let window = match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Capturing(window) => window,
            Phase::Idle => bail!("no capture window is open"),
            Phase::Done => bail!("harvest already completed"),
        };

        let started = Instant::now();
        let scripts = window.close(page).await?;
        self.emit(HarvestEvent::CaptureClosed {
            scripts: scripts.len(),
        });
        self.emit(HarvestEvent::ResolutionStarted {
            scripts: scripts.len(),
        });

        let outcomes =
            aggregate::resolve_all(page, scripts, self.config.fetch_timeout_ms).await;

        let mut resolved = 0usize;
        let mut failed = 0usize;
        for outcome in &outcomes {
            match outcome {
                MapOutcome::Resolved {
                    script_url,
                    source_map_url,
                    ..
                } => {
                    resolved += 1;
                    self.emit(HarvestEvent::MapResolved {
                        script_url: script_url.clone(),
                        source_map_url: source_map_url.clone(),
                    });
                }
                MapOutcome::Failed {
                    script_url, error, ..
                } => {
                    failed += 1;
                    self.emit(HarvestEvent::MapFailed {
                        script_url: script_url.clone(),
                        error: error.clone(),
                    });
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.emit(HarvestEvent::HarvestComplete {
            scripts: outcomes.len(),
            resolved,
            failed,
            elapsed_ms,
        });
        info!(
            scripts = outcomes.len(),
            resolved, failed, elapsed_ms, "harvest complete"
        );
        Ok(outcomes)
    }

    /// Return a completed harvest to Idle so the instance can run another
    /// capture window.
    pub fn reset(&mut self) -> Result<()> {
        match self.phase {
            Phase::Capturing(_) => bail!("cannot reset while a capture window is open"),
            Phase::Idle | Phase::Done => {
                self.phase = Phase::Idle;
                Ok(())
            }
        }
    }
}
