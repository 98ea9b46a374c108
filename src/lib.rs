// Copyright 2026 Mapscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mapscout library: capture script-parse notifications from an instrumented
//! Chromium page and resolve every declared source map into parsed content
//! or a per-script failure record.

pub mod cli;
pub mod config;
pub mod events;
pub mod harvest;
pub mod inspector;
