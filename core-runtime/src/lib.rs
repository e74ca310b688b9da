//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the folder player core:
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the playback core depends on.
//! It establishes the logging conventions and the event broadcasting
//! mechanism used throughout the system: every state transition in the
//! player is published once on the [`events::EventBus`], and views
//! subscribe to that single channel instead of wiring per-resource
//! callbacks.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
