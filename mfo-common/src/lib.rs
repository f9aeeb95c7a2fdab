//! # MFO Common Library
//!
//! Shared code for the media file organizer client crates:
//! - Error type
//! - TOML configuration loading, writing and source resolution
//! - Session event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
