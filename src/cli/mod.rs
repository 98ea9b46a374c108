//! CLI subcommand implementations for the Mapscout binary.

pub mod collect_cmd;
