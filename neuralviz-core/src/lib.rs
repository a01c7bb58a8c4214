//! # neuralviz-core
//!
//! Core library for neuralviz, a live graph of AI agent sessions.
//!
//! This library provides:
//! - Normalization of push-hook payloads and session-log records into
//!   canonical events, with per-session parent tracking
//! - The in-memory graph store and its placement policy
//! - A force-directed layout engine
//! - The viewer message model and broadcast seam
//! - Configuration, logging, and the remote bridge client
//!
//! ## Data flow
//!
//! ```text
//! raw payload ─► Normalizer (+ SessionTracker) ─► CanonicalEvent
//!             ─► GraphStore mutation ─► Broadcaster
//!
//! every tick:  ForceLayout ─► GraphStore positions
//! ```
//!
//! ## Example
//!
//! ```rust
//! use neuralviz_core::broadcast::MessageLog;
//! use neuralviz_core::graph::GraphStore;
//! use neuralviz_core::ingest::{IngestCoordinator, Normalizer};
//! use std::sync::{Arc, Mutex};
//!
//! let coordinator = IngestCoordinator::new(
//!     Normalizer::default(),
//!     Arc::new(Mutex::new(GraphStore::default())),
//!     MessageLog::new(),
//! );
//! let event = coordinator
//!     .handle_push_event("UserPromptSubmit", &serde_json::json!({"prompt": "fix bug"}))
//!     .unwrap();
//! assert_eq!(event.label, "User Prompt");
//! ```

// Re-export commonly used items at the crate root
pub use broadcast::{Broadcaster, ChannelBroadcaster, GraphMessage};
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{GraphSnapshot, GraphStore};
pub use ingest::{IngestCoordinator, SharedGraph};
pub use layout::{ForceLayout, LayoutParams};
pub use types::*;

// Public modules
pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod layout;
pub mod logging;
pub mod types;
