//! Spec validation
//!
//! Runs before any control-plane call. Every mutually exclusive pair is checked first, then the
//! fields required for `state: present`.

use crate::error::ReconcileError;
use crate::model::{
    BootSource, FlavorQuery, FloatingIpPolicy, ImageQuery, ServerSpec, TargetState, ValidatedSpec,
};
use std::time::Duration;

/// Check `spec` and turn it into a [`ValidatedSpec`].
///
/// Fails with [`ReconcileError::SpecConflict`] when two exclusive fields are both set, or when a
/// present-state spec lacks a boot source or a flavor.
pub fn validate(spec: &ServerSpec) -> Result<ValidatedSpec, ReconcileError> {
    if spec.name.trim().is_empty() {
        return Err(ReconcileError::SpecConflict(
            "'name' must not be empty".to_string(),
        ));
    }

    let auto_ip = spec.auto_floating_ip == Some(true);
    let has_ips = !spec.floating_ips.is_empty();
    let has_pools = !spec.floating_ip_pools.is_empty();

    let exclusive = [
        ("auto_floating_ip", auto_ip, "floating_ips", has_ips),
        ("auto_floating_ip", auto_ip, "floating_ip_pools", has_pools),
        ("floating_ips", has_ips, "floating_ip_pools", has_pools),
        (
            "flavor",
            spec.flavor.is_some(),
            "flavor_ram",
            spec.flavor_ram.is_some(),
        ),
        (
            "image",
            spec.image.is_some(),
            "root_volume",
            spec.root_volume.is_some(),
        ),
    ];
    for (left, left_set, right, right_set) in exclusive {
        if left_set && right_set {
            return Err(ReconcileError::SpecConflict(format!(
                "parameters are mutually exclusive: {}|{}",
                left, right
            )));
        }
    }

    let boot_source = match (&spec.image, &spec.root_volume) {
        (Some(image), None) => Some(BootSource::Image(ImageQuery {
            reference: image.clone(),
            exclude: Some(spec.image_exclude.clone()).filter(|e| !e.is_empty()),
        })),
        (None, Some(volume)) => Some(BootSource::Volume {
            volume: volume.clone(),
            delete_on_termination: spec.terminate_volume,
        }),
        _ => None,
    };

    let flavor = match (&spec.flavor, spec.flavor_ram) {
        (Some(flavor), None) => Some(FlavorQuery::Exact(flavor.clone())),
        (None, Some(min_ram_mb)) => Some(FlavorQuery::Capacity {
            min_ram_mb,
            include: spec.flavor_include.clone().filter(|i| !i.is_empty()),
        }),
        _ => None,
    };

    if spec.state == TargetState::Present {
        if boot_source.is_none() {
            return Err(ReconcileError::SpecConflict(
                "parameter 'image' or 'root_volume' is required if state == 'present'".to_string(),
            ));
        }
        if flavor.is_none() {
            return Err(ReconcileError::SpecConflict(
                "parameter 'flavor' or 'flavor_ram' is required if state == 'present'".to_string(),
            ));
        }
    }

    let floating_ip = if has_ips {
        FloatingIpPolicy::Explicit(spec.floating_ips.clone())
    } else if has_pools {
        FloatingIpPolicy::Pools(spec.floating_ip_pools.clone())
    } else if spec.auto_floating_ip.unwrap_or(true) {
        FloatingIpPolicy::AutoAssign
    } else {
        FloatingIpPolicy::Disabled
    };

    Ok(ValidatedSpec {
        name: spec.name.clone(),
        state: spec.state,
        boot_source,
        flavor,
        key_name: spec.key_name.clone(),
        security_groups: spec.security_groups.clone(),
        nics: spec.nics.clone(),
        metadata: spec.meta.clone(),
        userdata: spec.userdata.clone(),
        config_drive: spec.config_drive,
        availability_zone: spec.availability_zone.clone(),
        floating_ip,
        wait: spec.wait,
        timeout: Duration::from_secs(spec.timeout),
    })
}
