//! Pipeline entry points for engine operations.
//!
//! - `run_sync`: one full sync cycle for one source
//! - `Scheduler`: periodic scheduling across all active sources
//! - `trigger_manual_sync` / `apply_manual_reading`: operator-initiated runs
//! - `on_internal_booking`: booking events fed straight to the dispatcher

pub mod scheduler;
pub mod sync;

pub use scheduler::{is_due, jitter_secs, Scheduler};
pub use sync::{
    apply_manual_reading, on_internal_booking, run_sync, trigger_manual_sync, SyncContext,
};
