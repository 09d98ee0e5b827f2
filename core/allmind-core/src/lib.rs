//! # allmind-core
//!
//! Registry reconciliation and live-state cache for the AllMind operator
//! dashboard. Takes the strap registry of known repositories and command
//! shims, probes each entry's live filesystem and git state, and serves one
//! internally-consistent snapshot to the route layer.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Probes fan out on scoped
//!   threads; the background refresher is a plain thread.
//! - **Graceful degradation**: Missing files return empty/default values, and
//!   probe failures are recorded in-band instead of aborting a scan.
//! - **Single-flight**: At most one snapshot build runs at a time; concurrent
//!   refresh requests join it.
//! - **No ambient state**: Every cache is an owned value, so independent
//!   dashboards (e.g. under test) can coexist.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use allmind_core::Dashboard;
//!
//! let dashboard = Dashboard::from_env();
//! let snapshot = dashboard.get_snapshot(true);
//! let shims = dashboard.get_shim_report();
//! ```

pub mod cache;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod probes;
pub mod registry;
pub mod shims;
pub mod snapshot;
pub mod types;

pub use cache::{RefresherHandle, RepoCache};
pub use config::{CacheConfig, StrapConfig};
pub use doctor::run_doctor;
pub use engine::Dashboard;
pub use error::{AllmindError, ProbeError, Result};
pub use probes::{LiveProbe, RepoProbe};
pub use registry::load_registry;
pub use shims::{reconcile_shims, ShimMetadata};
pub use snapshot::SnapshotBuilder;
pub use types::*;
