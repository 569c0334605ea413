//! OpenStack compute client for nimbus
//!
//! This crate implements the `ComputeClient` trait for OpenStack clouds by driving the
//! `openstack` command-line client.
//!
//! # Requirements
//!
//! - `openstack` CLI (python-openstackclient) must be installed
//! - Credentials are read by the CLI itself (`clouds.yaml` or `OS_*` variables)
//!
//! # Example
//!
//! ```ignore
//! use nimbus_cloud::{InstanceReconciler, TokioClock};
//! use nimbus_openstack::OpenStackCompute;
//!
//! let compute = OpenStackCompute::new(Some("devstack".into()), None)
//!     .with_default_pool(Some("public".into()));
//! let clock = TokioClock::new();
//!
//! let result = InstanceReconciler::new(&compute, &clock).reconcile(&spec).await?;
//! ```

pub mod cli;
pub mod error;
pub mod provider;

pub use cli::OpenStackCli;
pub use error::{OpenStackError, Result};
pub use provider::OpenStackCompute;
