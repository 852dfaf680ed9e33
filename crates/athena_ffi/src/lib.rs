//! Flutter-facing bindings for the Athena core.

pub mod api;
