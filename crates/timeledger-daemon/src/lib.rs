//! timeledger daemon library
//!
//! Live sync adapters, timing and background jobs over the core store,
//! exposed as a library for testing.

pub mod config;
pub mod event_manager;
pub mod events;
pub mod runner;
pub mod sync;
pub mod timer;

pub use config::{ConfigManager, Preferences};
pub use event_manager::EventManager;
pub use events::DaemonEvent;
pub use runner::BackgroundRunner;
pub use sync::{SegmentAdapter, SegmentView, SyncError, SyncManager, TaskAdapter};
pub use timer::{RapidFiringDetector, TickTarget, TimingScheduler};
