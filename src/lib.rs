#![forbid(unsafe_code)]

//! Public entry point for the socialgrab crate.
//!
//! The binary only parses flags and serves [`server::router`]; everything it
//! wires together lives here so the handlers can run against a scripted
//! engine in tests.

pub mod config;
pub mod engine;
pub mod files;
pub mod media;
pub mod options;
pub mod platform;
pub mod retry;
pub mod server;

#[cfg(test)]
mod testing;
