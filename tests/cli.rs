//! End-to-end tests for the fleetctl binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A client config whose state lives under `dir`
fn write_config(dir: &Path, cookbooks: &Path, runlist: &Path) -> PathBuf {
    let path = dir.join("client.toml");
    fs::write(
        &path,
        format!(
            r#"
cookbook_path = ["{cookbooks}"]
runlist = "{runlist}"
outputs_dir = "{dir}/outputs"
lock_path = "{dir}/fleetctl.lock"

[sentinels]
override_file = "{dir}/cron.default.override"
test_timestamp = "{dir}/test_timestamp"
"#,
            cookbooks = cookbooks.display(),
            runlist = runlist.display(),
            dir = dir.display(),
        ),
    )
    .unwrap();
    path
}

fn fleetctl(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fleetctl").unwrap();
    cmd.env("NO_COLOR", "1").arg("-c").arg(config);
    cmd
}

fn fixture_config(dir: &TempDir) -> PathBuf {
    write_config(
        dir.path(),
        &fixtures().join("cookbooks"),
        &fixtures().join("runlist.json"),
    )
}

/// One-recipe cookbook converging files under `root`
fn demo_cookbook(root: &Path, recipe: &str) -> PathBuf {
    let cookbooks = root.join("cookbooks");
    let dir = cookbooks.join("demo");
    fs::create_dir_all(dir.join("recipes")).unwrap();
    fs::write(dir.join("metadata.toml"), "name = \"demo\"\n").unwrap();
    fs::write(dir.join("recipes/default.toml"), recipe).unwrap();
    cookbooks
}

#[test]
fn test_validate_fixture_cookbooks() {
    let dir = TempDir::new().unwrap();
    fleetctl(&fixture_config(&dir))
        .args(["-v", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run list compiles"))
        .stdout(predicate::str::contains("fb_cron::default"))
        .stdout(predicate::str::contains("scale_datadog::default"));
}

#[test]
fn test_plan_shows_resources_and_notifications() {
    let dir = TempDir::new().unwrap();
    fleetctl(&fixture_config(&dir))
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("template[/etc/ssh/sshd_config]"))
        .stdout(predicate::str::contains("cron[chef]"))
        .stdout(predicate::str::contains("notifies restart service[sshd] (delayed)"));
}

#[test]
fn test_plan_does_not_touch_state() {
    let dir = TempDir::new().unwrap();
    fleetctl(&fixture_config(&dir)).arg("plan").assert().success();
    assert!(!dir.path().join("outputs").exists());
}

#[test]
fn test_validate_rejects_duplicate_resource() {
    let dir = TempDir::new().unwrap();
    let cookbooks = demo_cookbook(
        dir.path(),
        r#"
[[resource]]
type = "service"
name = "sshd"

[[resource]]
type = "service"
name = "sshd"
"#,
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));
    fleetctl(&config)
        .args(["validate", "-o", "recipe[demo]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate resource service[sshd]"));
}

#[test]
fn test_validate_rejects_unknown_notification_target() {
    let dir = TempDir::new().unwrap();
    let cookbooks = demo_cookbook(
        dir.path(),
        r#"
[[resource]]
type = "file"
name = "/etc/motd"
content = "hi"
notifies = [{ action = "restart", target = "service[httpd]" }]
"#,
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));
    fleetctl(&config)
        .args(["validate", "-o", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown resource service[httpd]"));
}

#[test]
fn test_run_converges_then_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();
    let cookbooks = demo_cookbook(
        dir.path(),
        &format!(
            r#"
[[resource]]
type = "file"
name = "{root}/motd"
content = "Welcome to SCALE\n"
mode = "0644"
notifies = [{{ action = "run", target = "execute[reload]" }}]

[[resource]]
type = "execute"
name = "reload"
command = "touch {root}/reloaded"
action = "nothing"
"#
        ),
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));

    fleetctl(&config)
        .args(["run", "-o", "recipe[demo]"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 converged"));
    assert_eq!(
        fs::read_to_string(dir.path().join("motd")).unwrap(),
        "Welcome to SCALE\n"
    );
    assert!(dir.path().join("reloaded").exists());
    assert!(dir.path().join("outputs/chef.last.out").exists());
    assert!(!dir.path().join("outputs/chef.cur.out").exists());

    fs::remove_file(dir.path().join("reloaded")).unwrap();
    fleetctl(&config)
        .args(["run", "-o", "recipe[demo]"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 converged"));
    assert!(!dir.path().join("reloaded").exists());
}

#[test]
fn test_why_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();
    let cookbooks = demo_cookbook(
        dir.path(),
        &format!(
            r#"
[[resource]]
type = "file"
name = "{root}/motd"
content = "hi"
"#
        ),
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));
    fleetctl(&config)
        .args(["run", "--why-run", "-o", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing was changed"));
    assert!(!dir.path().join("motd").exists());
}

#[test]
fn test_failed_run_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();
    let cookbooks = demo_cookbook(
        dir.path(),
        &format!(
            r#"
[[resource]]
type = "execute"
name = "broken"
command = "exit 3"

[[resource]]
type = "file"
name = "{root}/after"
content = "never"
"#
        ),
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));
    fleetctl(&config)
        .args(["run", "-o", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Run failed at execute[broken]"));
    assert!(!dir.path().join("after").exists());

    let log = fs::read_to_string(dir.path().join("outputs/chef.last.out")).unwrap();
    assert!(log.contains("Run failed at execute[broken]"));
}

#[test]
fn test_scheduled_run_honors_pause() {
    let dir = TempDir::new().unwrap();
    let config = fixture_config(&dir);

    fleetctl(&config)
        .args(["pause", "--minutes", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paused until"));
    assert!(dir.path().join("cron.default.override").exists());

    fleetctl(&config)
        .args(["run", "--scheduled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipping scheduled run"));
    assert!(!dir.path().join("outputs").exists());

    fleetctl(&config)
        .arg("resume")
        .assert()
        .success()
        .stdout(predicate::str::contains("resumed"));
    assert!(!dir.path().join("cron.default.override").exists());
}

#[test]
fn test_profile_reads_knife_toml() {
    let dir = TempDir::new().unwrap();
    let chef = dir.path().join(".chef");
    fs::create_dir_all(&chef).unwrap();
    fs::write(
        chef.join("knife.toml"),
        "node_name = \"phil\"\nclient_key = \"phil.pem\"\ncookbook_path = [\"../cookbooks\"]\n",
    )
    .unwrap();

    Command::cargo_bin("fleetctl")
        .unwrap()
        .env("NO_COLOR", "1")
        .current_dir(dir.path())
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("phil"))
        .stdout(predicate::str::contains(chef.join("phil.pem").display().to_string()));
}

#[test]
fn test_completions() {
    Command::cargo_bin("fleetctl")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetctl"));
}

#[test]
fn test_generate_cookbook_keeps_existing_files() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), dir.path(), &dir.path().join("runlist.json"));

    fleetctl(&config)
        .args(["generate", "cookbook", "scale_wiki", "-I", "apachev2", "-p"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created file["));
    let cookbook = dir.path().join("scale_wiki");
    let metadata = fs::read_to_string(cookbook.join("metadata.toml")).unwrap();
    assert!(metadata.contains("name = \"scale_wiki\""));
    assert!(metadata.contains("license = \"Apache-2.0\""));
    assert!(cookbook.join("attributes/default.toml").exists());
    assert!(cookbook.join("recipes/default.toml").exists());

    fs::write(cookbook.join("README.md"), "# wiki\n").unwrap();
    fleetctl(&config)
        .args(["generate", "cookbook", "scale_wiki", "-p"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Kept existing"));
    assert_eq!(fs::read_to_string(cookbook.join("README.md")).unwrap(), "# wiki\n");
    assert!(
        fs::read_to_string(cookbook.join("metadata.toml"))
            .unwrap()
            .contains("Apache-2.0")
    );

    fleetctl(&config)
        .args(["validate", "-o", "scale_wiki"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run list compiles"));
}

#[test]
fn test_recipe_without_secrets_is_skipped_with_warning() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().display().to_string();
    let cookbooks = demo_cookbook(
        dir.path(),
        &format!(
            r#"
skip_unless = ["{root}/datadog_secrets"]

[[resource]]
type = "file"
name = "{root}/datadog.yaml"
content = "api_key: x\n"
"#
        ),
    );
    let config = write_config(dir.path(), &cookbooks, &dir.path().join("runlist.json"));
    fleetctl(&config)
        .args(["run", "-o", "demo"])
        .assert()
        .success()
        .stderr(predicate::str::contains("skipping recipe"))
        .stdout(predicate::str::contains("0 converged"));
    assert!(!dir.path().join("datadog.yaml").exists());
}
