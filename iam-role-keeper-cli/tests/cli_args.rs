use std::io::Write;
use std::process::Command;

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_iam-role-keeper"));
    // Keep the tests away from real credentials
    cmd.env("AWS_ACCESS_KEY_ID", "test")
        .env("AWS_SECRET_ACCESS_KEY", "test")
        .env("AWS_REGION", "us-east-1")
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .env_remove("AWS_PROFILE");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let out = cli().arg("--help").output().expect("failed to run --help");
    let s = String::from_utf8_lossy(&out.stdout);
    for subcommand in ["ensure", "probe", "instance-profile", "destroy"] {
        assert!(s.contains(subcommand), "help should list {subcommand}: {s}");
    }
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_ensure_rejects_unknown_service_principal() {
    let output = cli()
        .args(["ensure", "--name", "my-role", "--service", "invalid-service"])
        .output()
        .expect("failed to run ensure");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr.contains("Invalid service principal"),
        "stderr was: {}",
        stderr
    );
}

#[test]
fn test_ensure_requires_name_or_spec() {
    let output = cli()
        .args(["ensure", "--service", "ec2"])
        .output()
        .expect("failed to run ensure");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("--name"), "stderr was: {}", stderr);
}

#[test]
fn test_ensure_spec_file_with_bad_instance_profile_flag() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(br#"{"name": "my-role", "service": "batch", "instance_profile": "yes"}"#)
        .expect("failed to write spec");

    let output = cli()
        .args(["ensure", "--spec"])
        .arg(file.path())
        .output()
        .expect("failed to run ensure with spec");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr.contains("Invalid instance profile flag"),
        "stderr was: {}",
        stderr
    );
}

#[test]
fn test_ensure_spec_file_with_mixed_policy_list() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(br#"{"name": "my-role", "policies": ["AmazonS3ReadOnlyAccess", 7]}"#)
        .expect("failed to write spec");

    let output = cli()
        .args(["ensure", "--spec"])
        .arg(file.path())
        .output()
        .expect("failed to run ensure with spec");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Invalid policy set"), "stderr was: {}", stderr);
}

#[test]
fn test_probe_rejects_invalid_role_name() {
    let output = cli()
        .args(["probe", "not a role"])
        .output()
        .expect("failed to run probe");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Invalid role name"), "stderr was: {}", stderr);
}

#[test]
fn test_destroy_refuses_without_tty() {
    let output = cli()
        .args(["destroy", "my-role"])
        .output()
        .expect("failed to run destroy");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr.contains("run interactively in a TTY"),
        "stderr was: {}",
        stderr
    );
}
