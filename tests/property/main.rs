//! Property-based tests against simple in-memory models.
//!
//! Run with: `cargo test --test property`

mod set_model;
