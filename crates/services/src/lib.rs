#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod scoring;
pub mod selection;
pub mod sessions;

pub use exam_core::Clock;

pub use config::EngineConfig;
pub use error::EngineError;
pub use monitor::{ChannelNotifier, ExamNotifier, ExpiryMonitor, MonitorEvent};
pub use scoring::ScoringService;
pub use selection::Selector;
pub use sessions::SessionEngine;
