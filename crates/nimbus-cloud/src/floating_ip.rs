//! Floating IP convergence
//!
//! Computes the smallest set of attach/detach calls that brings a server's floating addresses in
//! line with its [`FloatingIpPolicy`]. Fixed addresses are never touched, and running it against
//! a converged record issues no calls at all.

use crate::action::{Action, ActionLog};
use crate::error::{CloudError, ReconcileError, ReconcileFailure};
use crate::model::{FloatingIpPolicy, ServerRecord};
use crate::provider::{ComputeClient, FloatingIpSource};

/// Result of a convergence pass
#[derive(Debug, Clone)]
pub struct FloatingIpOutcome {
    pub changed: bool,
    /// The record re-read after any change, or the input record when nothing changed
    pub record: ServerRecord,
    pub actions: ActionLog,
}

/// Attach/detach plan for an explicit address list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressDiff {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl AddressDiff {
    /// `missing` keeps the desired order, `extra` keeps the observed order
    pub fn compute(observed: &[&str], desired: &[String]) -> Self {
        let mut missing: Vec<String> = Vec::new();
        for ip in desired {
            if !observed.contains(&ip.as_str()) && !missing.contains(ip) {
                missing.push(ip.clone());
            }
        }
        let extra = observed
            .iter()
            .filter(|ip| !desired.iter().any(|d| d.as_str() == **ip))
            .map(|ip| ip.to_string())
            .collect();
        Self { missing, extra }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

pub struct FloatingIpReconciler<'a> {
    client: &'a dyn ComputeClient,
}

impl<'a> FloatingIpReconciler<'a> {
    pub fn new(client: &'a dyn ComputeClient) -> Self {
        Self { client }
    }

    pub async fn converge(
        &self,
        record: ServerRecord,
        policy: &FloatingIpPolicy,
    ) -> Result<FloatingIpOutcome, ReconcileFailure> {
        let observed: Vec<String> = record.floating_ips().into_iter().map(String::from).collect();
        let mut actions = ActionLog::new();

        let result = match policy {
            FloatingIpPolicy::Disabled => Ok(()),
            FloatingIpPolicy::AutoAssign => {
                if observed.is_empty() {
                    self.attach_auto(&record, &mut actions).await
                } else {
                    Ok(())
                }
            }
            FloatingIpPolicy::Explicit(desired) => {
                let observed_refs: Vec<&str> = observed.iter().map(String::as_str).collect();
                let diff = AddressDiff::compute(&observed_refs, desired);
                self.apply_diff(&record, &diff, &mut actions).await
            }
            FloatingIpPolicy::Pools(pools) => {
                if observed.is_empty() {
                    self.attach_from_pools(&record, pools, &mut actions).await
                } else {
                    Ok(())
                }
            }
        };

        if actions.is_empty() {
            return match result {
                Ok(()) => {
                    tracing::debug!("Floating IPs of '{}' already converged", record.name);
                    Ok(FloatingIpOutcome {
                        changed: false,
                        record,
                        actions,
                    })
                }
                Err(error) => Err(ReconcileFailure::with_record(error, record)),
            };
        }

        match result {
            Ok(()) => {
                let refreshed = self
                    .refresh(&record.name)
                    .await
                    .map_err(|error| ReconcileFailure::with_record(error, record.clone()))?;
                Ok(FloatingIpOutcome {
                    changed: true,
                    record: refreshed,
                    actions,
                })
            }
            Err(error) => {
                // Part of the diff was applied; report the freshest record available
                let latest = self.refresh(&record.name).await.unwrap_or(record);
                Err(ReconcileFailure::with_record(error, latest))
            }
        }
    }

    async fn attach_auto(
        &self,
        record: &ServerRecord,
        actions: &mut ActionLog,
    ) -> Result<(), ReconcileError> {
        match self
            .client
            .attach_floating_ip(&record.id, &FloatingIpSource::Auto)
            .await
        {
            Ok(address) => {
                actions.push(Action::attach_floating_ip(&record.name, &address));
                Ok(())
            }
            Err(
                err @ (CloudError::PoolExhausted(_)
                | CloudError::AddressUnavailable(_)
                | CloudError::ResourceNotFound(_)),
            ) => {
                Err(ReconcileError::AllocationFailed {
                    name: record.name.clone(),
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Attach everything missing first, then detach the extras, so replacing one address
    /// with another never leaves the server without a floating IP.
    async fn apply_diff(
        &self,
        record: &ServerRecord,
        diff: &AddressDiff,
        actions: &mut ActionLog,
    ) -> Result<(), ReconcileError> {
        if diff.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            "Floating IP diff for '{}': missing {:?}, extra {:?}",
            record.name,
            diff.missing,
            diff.extra
        );

        for ip in &diff.missing {
            let source = FloatingIpSource::Address(ip.clone());
            match self.client.attach_floating_ip(&record.id, &source).await {
                Ok(address) => actions.push(Action::attach_floating_ip(&record.name, &address)),
                Err(
                    err @ (CloudError::AddressUnavailable(_)
                    | CloudError::ResourceNotFound(_)
                    | CloudError::PoolExhausted(_)),
                ) => {
                    return Err(ReconcileError::AllocationFailed {
                        name: record.name.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        for ip in &diff.extra {
            self.client.detach_floating_ip(&record.id, ip).await?;
            actions.push(Action::detach_floating_ip(&record.name, ip));
        }

        Ok(())
    }

    async fn attach_from_pools(
        &self,
        record: &ServerRecord,
        pools: &[String],
        actions: &mut ActionLog,
    ) -> Result<(), ReconcileError> {
        for pool in pools {
            let source = FloatingIpSource::Pool(pool.clone());
            match self.client.attach_floating_ip(&record.id, &source).await {
                Ok(address) => {
                    actions.push(Action::attach_floating_ip(&record.name, &address));
                    return Ok(());
                }
                Err(CloudError::PoolExhausted(reason)) => {
                    tracing::warn!("Pool '{}' exhausted ({}), trying next", pool, reason);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ReconcileError::PoolExhausted {
            pools: pools.to_vec(),
        })
    }

    async fn refresh(&self, name: &str) -> Result<ServerRecord, ReconcileError> {
        self.client.get_server_by_name(name).await?.ok_or_else(|| {
            ReconcileError::Cloud(CloudError::ResourceNotFound(format!(
                "server '{}' disappeared during floating IP convergence",
                name
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeCompute};
    use crate::model::{Address, ServerStatus};

    fn active_server(cloud: &FakeCompute, floating: &[&str]) -> ServerRecord {
        let mut record = ServerRecord::new("srv-1", "vm1", ServerStatus::Active)
            .with_address("private", Address::fixed("10.1.0.5"));
        for ip in floating {
            record = record.with_address("private", Address::floating(*ip));
        }
        cloud.insert_server(record.clone());
        record
    }

    fn mutating(calls: &[Call]) -> Vec<Call> {
        calls.iter().filter(|c| c.is_mutating()).cloned().collect()
    }

    #[test]
    fn test_address_diff() {
        let diff = AddressDiff::compute(
            &["10.0.0.1", "10.0.0.2"],
            &["10.0.0.2".to_string(), "10.0.0.3".to_string()],
        );
        assert_eq!(diff.missing, vec!["10.0.0.3"]);
        assert_eq!(diff.extra, vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_explicit_list_attaches_before_detaching() {
        let cloud = FakeCompute::new().with_free_floating_ips(&["10.0.0.3"]);
        let record = active_server(&cloud, &["10.0.0.1", "10.0.0.2"]);
        let policy =
            FloatingIpPolicy::Explicit(vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record, &policy)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(
            mutating(&cloud.calls()),
            vec![
                Call::Attach(
                    "srv-1".to_string(),
                    FloatingIpSource::Address("10.0.0.3".to_string())
                ),
                Call::Detach("srv-1".to_string(), "10.0.0.1".to_string()),
            ]
        );
        let mut final_ips = outcome.record.floating_ips();
        final_ips.sort();
        assert_eq!(final_ips, vec!["10.0.0.2", "10.0.0.3"]);
        assert_eq!(outcome.record.fixed_ips(), vec!["10.1.0.5"]);
    }

    #[tokio::test]
    async fn test_explicit_list_is_idempotent() {
        let cloud = FakeCompute::new();
        let record = active_server(&cloud, &["10.0.0.2"]);
        let policy = FloatingIpPolicy::Explicit(vec!["10.0.0.2".to_string()]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record.clone(), &policy)
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.record, record);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_unavailable_ip_fails_allocation() {
        let cloud = FakeCompute::new();
        let record = active_server(&cloud, &[]);
        let policy = FloatingIpPolicy::Explicit(vec!["198.51.100.9".to_string()]);

        let failure = FloatingIpReconciler::new(&cloud)
            .converge(record, &policy)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            ReconcileError::AllocationFailed { .. }
        ));
        assert_eq!(failure.record.unwrap().id, "srv-1");
    }

    #[tokio::test]
    async fn test_auto_assign_only_when_none() {
        let cloud = FakeCompute::new().with_default_pool("public", &["172.24.4.20"]);
        let record = active_server(&cloud, &[]);

        let reconciler = FloatingIpReconciler::new(&cloud);
        let first = reconciler
            .converge(record, &FloatingIpPolicy::AutoAssign)
            .await
            .unwrap();
        assert!(first.changed);
        assert_eq!(first.record.floating_ips(), vec!["172.24.4.20"]);

        let second = reconciler
            .converge(first.record, &FloatingIpPolicy::AutoAssign)
            .await
            .unwrap();
        assert!(!second.changed);
        assert_eq!(
            mutating(&cloud.calls()),
            vec![Call::Attach("srv-1".to_string(), FloatingIpSource::Auto)]
        );
    }

    #[tokio::test]
    async fn test_auto_assign_never_adds_second() {
        let cloud = FakeCompute::new().with_default_pool("public", &["172.24.4.20"]);
        let record = active_server(&cloud, &["172.24.4.1", "172.24.4.2"]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record, &FloatingIpPolicy::AutoAssign)
            .await
            .unwrap();
        assert!(!outcome.changed);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_assign_with_empty_default_pool() {
        let cloud = FakeCompute::new().with_default_pool("public", &[]);
        let record = active_server(&cloud, &[]);

        let failure = FloatingIpReconciler::new(&cloud)
            .converge(record, &FloatingIpPolicy::AutoAssign)
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ReconcileError::AllocationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_auto_assign_without_external_network() {
        let cloud = FakeCompute::new();
        let record = active_server(&cloud, &[]);

        let failure = FloatingIpReconciler::new(&cloud)
            .converge(record, &FloatingIpPolicy::AutoAssign)
            .await
            .unwrap_err();
        match failure.error {
            ReconcileError::AllocationFailed { name, reason } => {
                assert_eq!(name, "vm1");
                assert!(reason.contains("external network"), "{}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(failure.record.unwrap().id, "srv-1");
    }

    #[tokio::test]
    async fn test_pools_fall_through_to_next() {
        let cloud = FakeCompute::new()
            .with_pool("primary", &[])
            .with_pool("secondary", &["192.0.2.50"]);
        let record = active_server(&cloud, &[]);
        let policy = FloatingIpPolicy::Pools(vec!["primary".to_string(), "secondary".to_string()]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record, &policy)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.record.floating_ips(), vec!["192.0.2.50"]);
        assert_eq!(
            mutating(&cloud.calls()),
            vec![
                Call::Attach("srv-1".to_string(), FloatingIpSource::Pool("primary".to_string())),
                Call::Attach(
                    "srv-1".to_string(),
                    FloatingIpSource::Pool("secondary".to_string())
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_pools_exhausted() {
        let cloud = FakeCompute::new().with_pool("a", &[]).with_pool("b", &[]);
        let record = active_server(&cloud, &[]);
        let policy = FloatingIpPolicy::Pools(vec!["a".to_string(), "b".to_string()]);

        let failure = FloatingIpReconciler::new(&cloud)
            .converge(record, &policy)
            .await
            .unwrap_err();
        match failure.error {
            ReconcileError::PoolExhausted { pools } => assert_eq!(pools, vec!["a", "b"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pools_noop_when_floating_present() {
        let cloud = FakeCompute::new().with_pool("a", &["192.0.2.1"]);
        let record = active_server(&cloud, &["203.0.113.4"]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record, &FloatingIpPolicy::Pools(vec!["a".to_string()]))
            .await
            .unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_disabled_policy_leaves_extras() {
        let cloud = FakeCompute::new();
        let record = active_server(&cloud, &["203.0.113.4"]);

        let outcome = FloatingIpReconciler::new(&cloud)
            .converge(record, &FloatingIpPolicy::Disabled)
            .await
            .unwrap();
        assert!(!outcome.changed);
        assert!(cloud.calls().is_empty());
    }
}
