pub mod apply;
pub mod validate;

use anyhow::Context;
use colored::Colorize;
use nimbus_cloud::{BootSource, FlavorQuery, FloatingIpPolicy, ValidatedSpec};
use nimbus_config::SpecDocument;
use std::path::PathBuf;

/// Load the spec document from `file`, or discover it
pub fn load(file: Option<PathBuf>) -> anyhow::Result<(PathBuf, SpecDocument)> {
    let path = match file {
        Some(path) => path,
        None => nimbus_config::find_spec_file()?,
    };
    let document = nimbus_config::load_document(&path)
        .with_context(|| format!("could not load {}", path.display()))?;
    Ok((path, document))
}

/// Print what a validated spec resolves to
pub fn print_plan(spec: &ValidatedSpec) {
    println!("  name:        {}", spec.name.cyan());
    println!("  state:       {}", spec.state);

    if let Some(source) = &spec.boot_source {
        let text = match source {
            BootSource::Image(query) => match &query.exclude {
                Some(exclude) => format!("image {} (excluding \"{}\")", query.reference, exclude),
                None => format!("image {}", query.reference),
            },
            BootSource::Volume {
                volume,
                delete_on_termination,
            } => {
                let lifetime = if *delete_on_termination {
                    "deleted with server"
                } else {
                    "kept"
                };
                format!("volume {} ({})", volume, lifetime)
            }
        };
        println!("  boot:        {}", text);
    }

    if let Some(flavor) = &spec.flavor {
        let text = match flavor {
            FlavorQuery::Exact(name) => name.clone(),
            FlavorQuery::Capacity {
                min_ram_mb,
                include: Some(include),
            } => format!("smallest with >= {} MB RAM matching \"{}\"", min_ram_mb, include),
            FlavorQuery::Capacity {
                min_ram_mb,
                include: None,
            } => format!("smallest with >= {} MB RAM", min_ram_mb),
        };
        println!("  flavor:      {}", text);
    }

    let floating = match &spec.floating_ip {
        FloatingIpPolicy::Disabled => "unmanaged".to_string(),
        FloatingIpPolicy::AutoAssign => "auto-assign".to_string(),
        FloatingIpPolicy::Explicit(ips) => format!("exactly {}", ips.join(", ")),
        FloatingIpPolicy::Pools(pools) => format!("one from {}", pools.join(" > ")),
    };
    println!("  floating IP: {}", floating);
    println!(
        "  wait:        {} (timeout {}s)",
        spec.wait,
        spec.timeout.as_secs()
    );
}
