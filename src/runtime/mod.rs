// src/runtime/mod.rs
//! Multi-process launch
//!
//! ```text
//!                 seismic-toolbox (launcher)
//!                            │ spawn × processes
//!        ┌───────────────────┼───────────────────┐
//!        ▼                   ▼                   ▼
//!  STBX_RANK=0         STBX_RANK=1   ...   STBX_RANK=n-1
//!  (coordinator)        (worker)             (worker)
//! ```

pub mod process_manager;

// Re-export commonly used types
pub use process_manager::{LaunchPlan, LaunchReport, ProcessLauncher};
