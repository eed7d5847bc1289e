//! Tests for the block engine
//!
//! Organized by concern: loading and stepping, control flow between
//! blocks, detector triggers and runtime values, snapshots.

mod helpers;

mod block_tests;
mod flow_tests;
mod snapshot_tests;
mod trigger_tests;
