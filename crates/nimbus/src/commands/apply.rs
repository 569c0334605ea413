use colored::Colorize;
use nimbus_cloud::{
    InstanceReconciler, ReconcileFailure, ReconcileResult, ServerSpec, TargetState, TokioClock,
};
use nimbus_openstack::OpenStackCompute;
use std::path::PathBuf;

pub struct ApplyOptions {
    pub file: Option<PathBuf>,
    pub state: Option<TargetState>,
    pub no_wait: bool,
    pub timeout: Option<u64>,
    pub json: bool,
}

/// Command-line flags take precedence over the document
fn apply_overrides(spec: &mut ServerSpec, options: &ApplyOptions) {
    if let Some(state) = options.state {
        spec.state = state;
    }
    if options.no_wait {
        spec.wait = false;
    }
    if let Some(timeout) = options.timeout {
        spec.timeout = timeout;
    }
}

pub async fn handle(options: ApplyOptions) -> anyhow::Result<()> {
    let (path, mut document) = super::load(options.file.clone())?;
    apply_overrides(&mut document.server, &options);
    tracing::debug!("Using spec {}", path.display());

    let spec = match nimbus_cloud::validate(&document.server) {
        Ok(spec) => spec,
        Err(e) => {
            report_failure(&ReconcileFailure::new(e), options.json);
            std::process::exit(1);
        }
    };

    let cloud = &document.cloud;
    let compute = OpenStackCompute::new(cloud.cloud.clone(), cloud.region.clone())
        .with_default_pool(cloud.default_floating_pool.clone());
    compute.check_installed().await?;

    let clock = TokioClock::new();
    let mut reconciler = InstanceReconciler::new(&compute, &clock);
    if let Some(region) = &cloud.region {
        reconciler = reconciler.with_region(region.clone());
    }

    if !options.json {
        println!(
            "{}",
            format!("Applying '{}' (state: {})...", spec.name, spec.state).blue()
        );
    }

    match reconciler.reconcile_validated(&spec).await {
        Ok(result) => {
            report_success(&result, options.json)?;
            Ok(())
        }
        Err(failure) => {
            report_failure(&failure, options.json);
            std::process::exit(1);
        }
    }
}

fn report_success(result: &ReconcileResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for action in result.actions.iter() {
        println!("  {} {}", "✓".green(), action.description);
    }

    if result.changed {
        println!("{}", "✓ Changed".green().bold());
        println!("  {}", result.actions.summary());
    } else {
        println!("{}", "✓ Already up to date".green().bold());
    }

    match (&result.record, &result.hostvars) {
        (Some(record), Some(vars)) => {
            println!();
            println!("  {} ({})", record.name.cyan(), record.id);
            println!("  status:       {}", record.status);
            if let Some(ip) = &vars.interface_ip {
                println!("  interface IP: {}", ip);
            }
            let floating = record.floating_ips();
            if !floating.is_empty() {
                println!("  floating IPs: {}", floating.join(", "));
            }
        }
        _ => println!("  server is absent"),
    }

    Ok(())
}

fn report_failure(failure: &ReconcileFailure, json: bool) {
    if json {
        let body = serde_json::json!({
            "failed": true,
            "msg": failure.error.to_string(),
            "retryable": failure.error.is_retryable(),
            "record": failure.record,
        });
        println!("{}", body);
        return;
    }

    eprintln!();
    eprintln!("{}", "✗ Reconciliation failed".red().bold());
    eprintln!("  {}", failure.error);
    if let Some(record) = &failure.record {
        eprintln!(
            "  last observed: {} ({}) status {}",
            record.name, record.id, record.status
        );
    }
    if failure.error.is_retryable() {
        eprintln!("  {}", "Re-run apply to continue converging".yellow());
    }
}
