mod common;

use common::TestProject;
use predicates::prelude::*;

const VALID_SPEC: &str = r#"
cloud:
  cloud: devstack
server:
  name: web
  image: ubuntu-24.04
  flavor_ram: 1024
  flavor_include: standard
  floating_ip_pools: [public, backup]
"#;

const CONFLICTING_SPEC: &str = r#"
server:
  name: web
  image: ubuntu-24.04
  root_volume: web-root
  flavor: m1.small
"#;

#[test]
fn test_cli_help() {
    let project = TestProject::new();
    project
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version() {
    let project = TestProject::new();
    project
        .command()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus"));
}

#[test]
fn test_apply_help_lists_overrides() {
    let project = TestProject::new();
    project
        .command()
        .args(["apply", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--state"))
        .stdout(predicate::str::contains("--no-wait"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_validate_discovers_spec() {
    let project = TestProject::new();
    project.write_spec(VALID_SPEC);

    project
        .command()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spec is valid"))
        .stdout(predicate::str::contains("one from public > backup"))
        .stdout(predicate::str::contains("matching \"standard\""));
}

#[test]
fn test_validate_rejects_conflicting_spec() {
    let project = TestProject::new();
    project.write_spec(CONFLICTING_SPEC);

    project
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "parameters are mutually exclusive: image|root_volume",
        ));
}

#[test]
fn test_validate_without_spec_file() {
    let project = TestProject::new();

    project
        .command()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Spec file not found"));
}

#[test]
fn test_validate_explicit_file() {
    let project = TestProject::new();
    let other = project.path().join("elsewhere.yaml");
    std::fs::write(&other, VALID_SPEC).unwrap();

    project
        .command()
        .args(["validate", "--file"])
        .arg(&other)
        .assert()
        .success()
        .stdout(predicate::str::contains("elsewhere.yaml"));
}

#[test]
fn test_apply_rejects_conflict_before_contacting_cloud() {
    let project = TestProject::new();
    project.write_spec(CONFLICTING_SPEC);

    project
        .command()
        .args(["apply", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"failed\":true"))
        .stdout(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_apply_rejects_unknown_state() {
    let project = TestProject::new();
    project.write_spec(VALID_SPEC);

    project
        .command()
        .args(["apply", "--state", "paused"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown state 'paused'"));
}
