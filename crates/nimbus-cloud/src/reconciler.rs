//! Instance reconciliation
//!
//! One call to [`InstanceReconciler::reconcile`] observes the named server, picks a branch from
//! (target state × observed status) and applies it:
//!
//! | Observed          | present                                   | absent                 |
//! |-------------------|-------------------------------------------|------------------------|
//! | missing           | create, wait for ACTIVE, converge IPs     | nothing                |
//! | settled           | converge IPs                              | delete, wait until gone|
//! | ERROR             | fail, never recreate                      | delete, wait until gone|
//! | transitional      | wait for a settled status, then branch    | same                   |
//!
//! The server is identified by name only. Every invocation starts from a fresh lookup, so a
//! failed run can simply be repeated.

use crate::action::{Action, ActionLog};
use crate::error::{CloudError, ReconcileError, ReconcileFailure};
use crate::floating_ip::FloatingIpReconciler;
use crate::hostvars::HostVars;
use crate::model::{
    BootRequest, BootSource, ResolvedBootSource, ServerRecord, ServerSpec, TargetState,
    ValidatedSpec,
};
use crate::provider::ComputeClient;
use crate::resolver::ResourceResolver;
use crate::validate::validate;
use crate::waiter::{Clock, PollConfig, Poller, Probe, WaitOutcome};
use serde::Serialize;

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    /// Whether any mutating call was issued
    pub changed: bool,
    /// The server as last observed; `None` once it is absent
    pub record: Option<ServerRecord>,
    pub hostvars: Option<HostVars>,
    pub actions: ActionLog,
}

impl ReconcileResult {
    fn absent(actions: ActionLog) -> Self {
        Self {
            changed: !actions.is_empty(),
            record: None,
            hostvars: None,
            actions,
        }
    }
}

pub struct InstanceReconciler<'a> {
    client: &'a dyn ComputeClient,
    clock: &'a dyn Clock,
    poll: PollConfig,
    region: Option<String>,
}

impl<'a> InstanceReconciler<'a> {
    pub fn new(client: &'a dyn ComputeClient, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            clock,
            poll: PollConfig::default(),
            region: None,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Region reported in host variables
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Validate `spec` and converge the cloud towards it.
    ///
    /// Validation failures are returned before any control-plane call is made.
    pub async fn reconcile(&self, spec: &ServerSpec) -> Result<ReconcileResult, ReconcileFailure> {
        let validated = validate(spec)?;
        self.reconcile_validated(&validated).await
    }

    pub async fn reconcile_validated(
        &self,
        spec: &ValidatedSpec,
    ) -> Result<ReconcileResult, ReconcileFailure> {
        tracing::info!(
            "Reconciling server '{}' (state: {}) via {}",
            spec.name,
            spec.state,
            self.client.name()
        );

        let observed = match self.client.get_server_by_name(&spec.name).await? {
            Some(record) if record.status.is_transitional() => {
                self.wait_until_settled(spec, record).await?
            }
            other => other,
        };

        match (spec.state, observed) {
            (TargetState::Present, None) => self.create(spec).await,
            (TargetState::Present, Some(record)) if record.status.is_error() => {
                tracing::warn!("Server '{}' is in ERROR state", spec.name);
                Err(ReconcileFailure::with_record(
                    ReconcileError::InstanceInErrorState {
                        name: spec.name.clone(),
                        status: record.status.to_string(),
                    },
                    record,
                ))
            }
            (TargetState::Present, Some(record)) => {
                tracing::debug!(
                    "Server '{}' exists ({}), converging floating IPs",
                    spec.name,
                    record.status
                );
                self.converge_floating_ips(spec, record, ActionLog::new())
                    .await
            }
            (TargetState::Absent, None) => {
                tracing::info!("Server '{}' is already absent", spec.name);
                Ok(ReconcileResult::absent(ActionLog::new()))
            }
            (TargetState::Absent, Some(record)) => self.delete(spec, record).await,
        }
    }

    /// Wait out a transitional status observed before branching.
    ///
    /// Returns `None` if the server disappeared meanwhile. When the wait runs out with a
    /// present target the result is a provisioning timeout; with an absent target the delete is
    /// issued anyway.
    async fn wait_until_settled(
        &self,
        spec: &ValidatedSpec,
        record: ServerRecord,
    ) -> Result<Option<ServerRecord>, ReconcileFailure> {
        tracing::info!(
            "Server '{}' is {}, waiting for it to settle",
            spec.name,
            record.status
        );

        let outcome = self
            .poller()
            .poll(spec.timeout, || async move {
                Ok::<_, CloudError>(match self.client.get_server_by_name(&spec.name).await? {
                    Some(current) if current.status.is_transitional() => {
                        Probe::Pending(Some(current))
                    }
                    current => Probe::Ready(current),
                })
            })
            .await
            .map_err(|err| ReconcileFailure::with_record(err.into(), record.clone()))?;

        match outcome {
            WaitOutcome::Ready(current) => Ok(current),
            WaitOutcome::TimedOut(last) => {
                let last = last.unwrap_or(record);
                if spec.state == TargetState::Absent {
                    tracing::warn!(
                        "Server '{}' still {} after {}s, deleting anyway",
                        spec.name,
                        last.status,
                        spec.timeout.as_secs()
                    );
                    return Ok(Some(last));
                }
                Err(ReconcileFailure::with_record(
                    ReconcileError::ProvisioningTimeout {
                        name: spec.name.clone(),
                        status: last.status.to_string(),
                        timeout_secs: spec.timeout.as_secs(),
                    },
                    last,
                ))
            }
        }
    }

    async fn create(&self, spec: &ValidatedSpec) -> Result<ReconcileResult, ReconcileFailure> {
        let request = self.build_request(spec).await?;

        tracing::debug!("Boot request: {:?}", request);
        let record = self.client.create_server(&request).await?;
        let mut actions = ActionLog::new();
        actions.push(Action::create_server(&spec.name));

        if !spec.wait {
            tracing::info!(
                "Not waiting for '{}'; floating IPs are converged on the next run",
                spec.name
            );
            return Ok(self.finish(record, actions));
        }

        let record = self.wait_for_active(spec, record).await?;
        if record.status.is_error() {
            return Err(ReconcileFailure::with_record(
                ReconcileError::InstanceInErrorState {
                    name: spec.name.clone(),
                    status: record.status.to_string(),
                },
                record,
            ));
        }

        self.converge_floating_ips(spec, record, actions).await
    }

    /// Resolve every reference in `spec` into a [`BootRequest`]
    pub async fn build_request(&self, spec: &ValidatedSpec) -> Result<BootRequest, ReconcileError> {
        let resolver = ResourceResolver::new(self.client);

        let source = match &spec.boot_source {
            Some(BootSource::Image(query)) => ResolvedBootSource::Image {
                image_id: resolver.resolve_image(query).await?,
            },
            Some(BootSource::Volume {
                volume,
                delete_on_termination,
            }) => ResolvedBootSource::Volume {
                volume_id: volume.clone(),
                delete_on_termination: *delete_on_termination,
            },
            None => {
                return Err(ReconcileError::SpecConflict(
                    "parameter 'image' or 'root_volume' is required if state == 'present'"
                        .to_string(),
                ));
            }
        };

        let flavor_id = match &spec.flavor {
            Some(query) => resolver.resolve_flavor(query).await?,
            None => {
                return Err(ReconcileError::SpecConflict(
                    "parameter 'flavor' or 'flavor_ram' is required if state == 'present'"
                        .to_string(),
                ));
            }
        };

        let nics = resolver.resolve_network_attachments(&spec.nics).await?;

        Ok(BootRequest {
            name: spec.name.clone(),
            source,
            flavor_id,
            nics,
            key_name: spec.key_name.clone(),
            security_groups: spec.security_groups.clone(),
            metadata: spec.metadata.clone(),
            userdata: spec.userdata.clone(),
            config_drive: spec.config_drive,
            availability_zone: spec.availability_zone.clone(),
        })
    }

    /// Poll a freshly created server until it leaves its transitional status.
    ///
    /// A timeout leaves the server in place; the failure carries its last record.
    async fn wait_for_active(
        &self,
        spec: &ValidatedSpec,
        created: ServerRecord,
    ) -> Result<ServerRecord, ReconcileFailure> {
        let outcome = self
            .poller()
            .poll(spec.timeout, || async move {
                let current = self
                    .client
                    .get_server_by_name(&spec.name)
                    .await?
                    .ok_or_else(|| {
                        CloudError::ResourceNotFound(format!(
                            "server '{}' disappeared while building",
                            spec.name
                        ))
                    })?;
                Ok::<_, CloudError>(if current.status.is_transitional() {
                    Probe::Pending(current)
                } else {
                    Probe::Ready(current)
                })
            })
            .await
            .map_err(|err| ReconcileFailure::with_record(err.into(), created.clone()))?;

        match outcome {
            WaitOutcome::Ready(record) => {
                tracing::info!("Server '{}' is {}", spec.name, record.status);
                Ok(record)
            }
            WaitOutcome::TimedOut(record) => Err(ReconcileFailure::with_record(
                ReconcileError::ProvisioningTimeout {
                    name: spec.name.clone(),
                    status: record.status.to_string(),
                    timeout_secs: spec.timeout.as_secs(),
                },
                record,
            )),
        }
    }

    async fn converge_floating_ips(
        &self,
        spec: &ValidatedSpec,
        record: ServerRecord,
        mut actions: ActionLog,
    ) -> Result<ReconcileResult, ReconcileFailure> {
        let outcome = FloatingIpReconciler::new(self.client)
            .converge(record, &spec.floating_ip)
            .await?;
        actions.extend(outcome.actions);
        Ok(self.finish(outcome.record, actions))
    }

    async fn delete(
        &self,
        spec: &ValidatedSpec,
        record: ServerRecord,
    ) -> Result<ReconcileResult, ReconcileFailure> {
        match self.client.delete_server(&spec.name).await {
            Ok(()) => {}
            Err(CloudError::ResourceNotFound(_)) => {
                tracing::info!("Server '{}' vanished before deletion", spec.name);
                return Ok(ReconcileResult::absent(ActionLog::new()));
            }
            Err(err) => return Err(ReconcileFailure::with_record(err.into(), record)),
        }

        let mut actions = ActionLog::new();
        actions.push(Action::delete_server(&spec.name));

        if spec.wait {
            self.wait_until_gone(spec, record).await?;
        }
        Ok(ReconcileResult::absent(actions))
    }

    async fn wait_until_gone(
        &self,
        spec: &ValidatedSpec,
        record: ServerRecord,
    ) -> Result<(), ReconcileFailure> {
        let outcome = self
            .poller()
            .poll(spec.timeout, || async move {
                Ok::<_, CloudError>(match self.client.get_server_by_name(&spec.name).await? {
                    Some(current) => Probe::Pending(Some(current)),
                    None => Probe::Ready(None),
                })
            })
            .await
            .map_err(|err| ReconcileFailure::with_record(err.into(), record.clone()))?;

        match outcome {
            WaitOutcome::Ready(_) => {
                tracing::info!("Server '{}' is gone", spec.name);
                Ok(())
            }
            WaitOutcome::TimedOut(last) => Err(ReconcileFailure::with_record(
                ReconcileError::DeletionTimeout {
                    name: spec.name.clone(),
                    timeout_secs: spec.timeout.as_secs(),
                },
                last.unwrap_or(record),
            )),
        }
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(self.clock, self.poll.clone())
    }

    fn finish(&self, record: ServerRecord, actions: ActionLog) -> ReconcileResult {
        let hostvars = HostVars::from_record(&record, self.region.as_deref());
        ReconcileResult {
            changed: !actions.is_empty(),
            record: Some(record),
            hostvars: Some(hostvars),
            actions,
        }
    }
}
