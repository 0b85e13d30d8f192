//! Integration test entry point for viaduct-proxy.
//!
//! Run with: cargo test --test integration

mod harness;
mod pipe;
mod sessions;
