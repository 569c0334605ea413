//! Nimbus Cloud Reconciliation
//!
//! Converges one named compute server, and the floating IPs attached to it, towards a
//! declarative [`ServerSpec`]. Every run observes the cloud afresh and issues only the calls
//! needed to close the gap, so running it twice in a row changes nothing the second time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   nimbus CLI                    │
//! │               (nimbus apply/validate)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ServerSpec
//! ┌─────────────────▼───────────────────────────────┐
//! │                 nimbus-cloud                    │
//! │  ┌──────────┐  ┌──────────────────────────────┐ │
//! │  │ validate │─▶│      InstanceReconciler      │ │
//! │  └──────────┘  │  ┌──────────┐ ┌───────────┐  │ │
//! │                │  │ Resolver │ │  Poller   │  │ │
//! │                │  └──────────┘ └───────────┘  │ │
//! │                │  ┌────────────────────────┐  │ │
//! │                │  │ FloatingIpReconciler   │  │ │
//! │                │  └────────────────────────┘  │ │
//! │                └──────────────────────────────┘ │
//! │          trait ComputeClient { ... }            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!         ┌─────────▼─────────┐
//!         │  nimbus-openstack │
//!         │ (openstack CLI)   │
//!         └───────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod floating_ip;
pub mod hostvars;
pub mod model;
pub mod provider;
pub mod reconciler;
pub mod resolver;
pub mod validate;
pub mod waiter;

#[cfg(test)]
pub(crate) mod fake;

// Re-exports
pub use action::{Action, ActionLog, ActionSummary, ActionType};
pub use error::{CloudError, ReconcileError, ReconcileFailure, ResourceKind, Result};
pub use floating_ip::{AddressDiff, FloatingIpOutcome, FloatingIpReconciler};
pub use hostvars::HostVars;
pub use model::{
    Address, AddressKind, BootRequest, BootSource, Flavor, FlavorQuery, FloatingIpPolicy, Image,
    ImageQuery, NamedResource, NetworkAttachment, ResolvedAttachment, ResolvedBootSource,
    ServerRecord, ServerSpec, ServerStatus, TargetState, ValidatedSpec,
};
pub use provider::{ComputeClient, FloatingIpSource};
pub use reconciler::{InstanceReconciler, ReconcileResult};
pub use resolver::ResourceResolver;
pub use validate::validate;
pub use waiter::{Clock, PollConfig, Poller, Probe, TokioClock, WaitOutcome};
