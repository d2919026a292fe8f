//! Integration tests for the bitmap:port set.
//!
//! Run with: `cargo test --test integration`

mod commands;
mod expiry;
mod packet_path;
