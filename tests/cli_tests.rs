mod common;

use common::{CommandOutput, TestContext};
use ghpkg::manifest::write_manifest;
use ghpkg::{InstallType, Manifest, PackageIdentity};
use std::fs;

fn run(ctx: &TestContext, args: &[&str]) -> CommandOutput {
    ctx.cmd()
        .args(args)
        .output()
        .expect("Failed to run ghpkg")
        .into()
}

/// Drop a manifest into the package root as if `install` had run.
fn fake_install(ctx: &TestContext, owner: &str, repo: &str, version: &str) {
    let id = PackageIdentity::new(owner, repo);
    let dir = id.install_dir(&ctx.package_root);
    fs::create_dir_all(&dir).unwrap();
    let manifest = Manifest::new(&id, version, InstallType::Release, vec!["bin/app".into()]);
    write_manifest(&manifest, &dir).unwrap();
}

#[test]
fn test_help_and_version() {
    let ctx = TestContext::new();

    run(&ctx, &["--help"])
        .assert_success()
        .assert_stdout_contains("GitHub release assets")
        .assert_stdout_contains("Usage: ghpkg");

    run(&ctx, &["version"])
        .assert_success()
        .assert_stdout_contains("ghpkg");
}

#[test]
fn test_config_set_get_show() {
    let ctx = TestContext::new();

    run(&ctx, &["config", "set", "http-timeout-secs", "42"]).assert_success();
    run(&ctx, &["config", "set", "verify=required"]).assert_success();

    run(&ctx, &["config", "get", "http_timeout_secs"])
        .assert_success()
        .assert_stdout_contains("42");

    let output = run(&ctx, &["config", "show", "--format", "json"]);
    output.assert_success();
    let shown: serde_json::Value =
        serde_json::from_str(&output.stdout).expect("Output was not valid JSON");
    assert_eq!(shown["http_timeout_secs"], 42);
    assert_eq!(shown["verify"], "required");

    let output = run(&ctx, &["config", "show", "--format", "yaml"]);
    output.assert_success();
    let _: serde_yaml::Value =
        serde_yaml::from_str(&output.stdout).expect("Output was not valid YAML");

    run(&ctx, &["config", "unset", "verify"]).assert_success();
    run(&ctx, &["config", "get", "verify"])
        .assert_success()
        .assert_stdout_contains("if-available");

    run(&ctx, &["config", "set", "shim_dir=/tmp"])
        .assert_failure()
        .assert_stderr_contains("not a valid configuration setting");
}

#[test]
fn test_list_pin_channel_and_info() {
    let ctx = TestContext::new();

    run(&ctx, &["list"])
        .assert_success()
        .assert_stdout_contains("No packages installed yet");

    fake_install(&ctx, "acme", "app", "v1.2.3");
    fake_install(&ctx, "acme", "tool", "v0.1.0");

    run(&ctx, &["pin", "acme/app"])
        .assert_success()
        .assert_stdout_contains("Pinned acme/app at v1.2.3");
    run(&ctx, &["channel", "acme/tool", "prerelease"]).assert_success();

    let output = run(&ctx, &["list"]);
    output
        .assert_success()
        .assert_stdout_contains("v1.2.3 [release] (pinned)")
        .assert_stdout_contains("v0.1.0 [prerelease]");

    let output = run(&ctx, &["info", "acme/app", "--format", "json"]);
    output.assert_success();
    let info: serde_json::Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(info["version"], "v1.2.3");
    assert_eq!(info["pinned"], true);

    run(&ctx, &["unpin", "acme/app"]).assert_success();
    run(&ctx, &["info", "acme/app"])
        .assert_success()
        .assert_stdout_contains("Pinned:       false");
}

#[test]
fn test_pinned_update_makes_no_network_calls() {
    let ctx = TestContext::new();
    fake_install(&ctx, "acme", "app", "v1.2.3");
    run(&ctx, &["pin", "acme/app"]).assert_success();

    // The API URL points at a closed port, so reaching the network would fail.
    run(&ctx, &["update", "acme/app"])
        .assert_success()
        .assert_stdout_contains("pinned at v1.2.3");
}

#[test]
fn test_invalid_invocations_fail() {
    let ctx = TestContext::new();

    run(&ctx, &["update"]).assert_failure();
    run(&ctx, &["install", "not-a-repo"]).assert_failure();
    run(&ctx, &["remove", "acme/app@v1.0.0"])
        .assert_failure()
        .assert_stderr_contains("takes no version");
    run(&ctx, &["info", "acme/ghost"])
        .assert_failure()
        .assert_stderr_contains("not installed");
}
