//! mfo-resolve library interface
//!
//! Client-side engine for interactive media resolution: talks to the
//! backend resolution process, turns its text output into selectable
//! candidates, enriches them with metadata, and drives the session to
//! completion.

pub mod config;
pub mod confirmation;
pub mod controller;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod models;
pub mod prompt_detector;
pub mod services;
pub mod stream_reader;
pub mod timers;

pub use crate::controller::{InternalEvent, SessionCommand, SessionController};
pub use crate::error::{ResolveError, ResolveResult};
