//! # metricol-core
//!
//! Host-resident metrics collection: independent input workers poll data
//! sources, normalize what they find into [`MetricRecord`]s and push them
//! onto a shared [`SampleQueue`]; output workers drain the queue on their
//! own cadence and ship batches to a remote collector.
//!
//! ## Quick Start
//!
//! ```no_run
//! use metricol_core::{Config, SampleQueue, Supervisor, registry};
//!
//! let config = Config::load("/etc/metricol.ini").unwrap();
//! config.validate().unwrap();
//!
//! let queue = SampleQueue::new();
//! let supervisor = Supervisor::new();
//! for section in config.worker_sections() {
//!     let worker = registry::build_worker(&section, &queue).unwrap();
//!     supervisor.spawn(worker).unwrap();
//! }
//!
//! // ... on shutdown:
//! supervisor.stop_all();
//! supervisor.join_all();
//! ```
//!
//! ## Architecture
//!
//! Input → fetch → parse → extract (rate-adjusted) → Sample Queue → Output
//! → format → (gzip) → transport
//!
//! Every periodic unit implements the [`Worker`] trait and runs on its own
//! thread. Inputs are built from a [`MetricSource`](input::MetricSource)
//! wrapped in an [`InputWorker`](input::InputWorker); the log watchers are
//! their own workers because they own a follower subprocess.

pub mod config;
pub mod error;
pub mod helpers;
pub mod input;
pub mod logwatch;
pub mod output;
pub mod queue;
pub mod rate;
pub mod record;
pub mod registry;
pub mod supervisor;
pub mod timefmt;
pub mod worker;

pub use config::{Config, SectionConfig, SectionRole};
pub use error::{ConfigError, DeliveryError, SourceError};
pub use queue::SampleQueue;
pub use rate::{RateTracker, ResetPolicy};
pub use record::{MetricKind, MetricRecord, MetricValue, unix_now};
pub use supervisor::Supervisor;
pub use timefmt::decode_time;
pub use worker::{Worker, WorkerHandle, WorkerState};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
