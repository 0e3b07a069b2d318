//! picrelay: trigger-keyword media/text relay core for chat bots.
//!
//! Operators register keyword triggers mapped to remote endpoints — media
//! APIs (an indirection layer returning media URLs), direct media URLs,
//! or text APIs — and [`RelayService`] resolves matching chat messages
//! into typed [`Reply`] values the host framework renders.
//!
//! The chat host owns message delivery, command parsing and logging setup;
//! this crate owns the registry, endpoint classification, the resolution
//! pipelines and batch packaging.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod media;
pub mod registry;
pub mod reply;
pub mod service;
pub mod text;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use media::{MediaKind, ResolvedMedia};
pub use registry::{Category, TriggerRegistry};
pub use reply::{ForwardNode, MediaItem, Reply};
pub use service::RelayService;
