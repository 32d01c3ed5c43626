//! Stratus cloud convergence engine
//!
//! This crate holds everything a resource handler needs that is not specific
//! to one vendor: classifying errors, retrying mutating calls, polling for
//! server-side state and driving a resource through declared transitions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Stratus CLI                     │
//! │          (stratus apply/refresh/destroy)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               stratus-cloud                      │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Lifecycle { create/read/update/.. }│   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────────┐    │
//! │  │  retry   │ │   wait   │ │  transition   │    │
//! │  └──────────┘ └──────────┘ └───────────────┘    │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Transport   │  │  State Mgmt  │             │
//! │  └──────────────┘  └──────────────┘             │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────────┐
//! │ stratus-cloud-aliyun  │
//! │  DTS / RDS handlers   │
//! └───────────────────────┘
//! ```

pub mod classify;
pub mod context;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod retry;
pub mod state;
pub mod transition;
pub mod wait;

// Re-exports
pub use classify::{Classifier, ErrorClass, OPERATION_DENIED_DB_STATUS, is_expected_error, needs_retry};
pub use context::{Api, Context, Params, Request, Transport};
pub use error::{CloudError, Result};
pub use id::{composite_id, parse_composite_id};
pub use lifecycle::{Lifecycle, ResourceData, Timeouts};
pub use retry::{Operation, RetryPolicy, retry};
pub use state::{GlobalState, ResourceState, ResourceStatus, StateLock, StateManager};
pub use transition::{Edge, EdgeSource, TransitionTable, Transitions, drive_to_state};
pub use wait::{Describe, Stateful, WaitSpec, wait_for_state};
