//! Integration tests for the exec action

use exec_action::child::{EXIT_EXEC, EXIT_SUBSTITUTION};
use exec_action::{
    ActionSet, ConfigError, CredentialResolver, ExecOutcome, RuntimeMode, SystemResolver,
    Uevent,
};
use nix::unistd::{getgroups, setgroups, Gid, Uid};
use serial_test::serial;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use tempfile::{NamedTempFile, TempDir};

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn load(yaml: &str) -> Result<ActionSet, ConfigError> {
    let file = write_config(yaml);
    ActionSet::load(file.path(), &SystemResolver)
}

#[test]
#[serial]
fn test_event_and_env_reach_command() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.txt");

    let actions = load(
        r#"
actions:
  - name: record
    command: "sh -c 'echo \"$DEVNAME $TAG $LOG_LEVEL\" > ${OUT}'"
    env:
      - "TAG=first"
      - "TAG=usb-${SUBSYSTEM}"
      - LOG_LEVEL
"#,
    )
    .unwrap();

    let event = Uevent::from_pairs([
        ("DEVNAME", "/dev/sdb1"),
        ("SUBSYSTEM", "block"),
        ("LOG_LEVEL", "3"),
        ("OUT", out.to_str().unwrap()),
    ]);

    let action = &actions.get("record").unwrap().action;
    let outcome = action.execute(&event, RuntimeMode::default()).unwrap();

    assert_eq!(outcome, ExecOutcome::Exited(0));
    assert_eq!(
        fs::read_to_string(&out).unwrap().trim(),
        "/dev/sdb1 usb-block 3"
    );
}

#[test]
#[serial]
fn test_failures_surface_as_exit_status() {
    let actions = load(
        r#"
actions:
  - name: missing-property
    command: "echo ${NOT_THERE}"
  - name: missing-program
    command: "/nonexistent/exec-action-program"
  - name: failing
    command: "sh -c 'exit 4'"
"#,
    )
    .unwrap();

    let event = Uevent::new();
    let mode = RuntimeMode::default();
    let run = |name: &str| actions.get(name).unwrap().action.execute(&event, mode).unwrap();

    assert_eq!(run("missing-property"), ExecOutcome::Exited(EXIT_SUBSTITUTION));
    assert_eq!(run("missing-program"), ExecOutcome::Exited(EXIT_EXEC));
    assert_eq!(run("failing"), ExecOutcome::Exited(4));
    assert!(!run("failing").is_success());
}

#[test]
fn test_dry_run_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("never.txt");

    let actions = load(&format!(
        r#"
actions:
  - name: touch
    command: "touch {}"
    uid: 0
"#,
        out.display()
    ))
    .unwrap();

    let mode = RuntimeMode {
        dry_run: true,
        debug: true,
    };
    let outcome = actions
        .get("touch")
        .unwrap()
        .action
        .execute(&Uevent::new(), mode)
        .unwrap();

    assert_eq!(outcome, ExecOutcome::DryRun);
    assert!(!out.exists());
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        "actions:\n  - command: \"echo ${OPEN\"\n",
        "actions:\n  - command: \"echo \\\"open\"\n",
        "actions:\n  - command: \"true\"\n    env: \"1BAD=x\"\n",
        "actions:\n  - command: \"true\"\n    uid: no-such-user-exec-action\n",
        "actions:\n  - command: \"true\"\n    gid: no-such-group-exec-action\n",
        "actions:\n  - command: \"true\"\n    uid: 1.5\n",
        "actions:\n  - type: mail\n    command: \"true\"\n",
        "actions:\n  - env: FOO\n",
    ];

    for yaml in cases {
        let err = load(yaml).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidAction { .. }),
            "{yaml}: {err}"
        );
    }
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = ActionSet::load(&dir.path().join("absent.yaml"), &SystemResolver).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_root_by_name_and_id() {
    let actions = load(
        r#"
actions:
  - name: by-name
    command: id
    uid: root
  - name: by-id
    command: id
    uid: 0
"#,
    )
    .unwrap();

    for name in ["by-name", "by-id"] {
        let exec_action::Action::Exec(exec) = &actions.get(name).unwrap().action;
        let creds = exec.template().credentials();
        assert_eq!(creds.uid.map(|u| u.as_raw()), Some(0));
        assert_eq!(creds.gid.map(|g| g.as_raw()), Some(0));
    }

    actions.release();
}

fn read_ids(path: &std::path::Path) -> (u32, Vec<u32>) {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let uid = lines.next().unwrap().trim().parse().unwrap();
    let groups = lines
        .next()
        .unwrap()
        .split_whitespace()
        .map(|g| g.parse().unwrap())
        .collect();
    (uid, groups)
}

#[test]
#[serial]
fn test_switch_to_nobody_drops_root_groups() {
    if !Uid::effective().is_root() {
        eprintln!("skipping: needs root");
        return;
    }
    let Ok((nobody_uid, nobody_gid)) = SystemResolver.user_by_name("nobody") else {
        eprintln!("skipping: no `nobody' user");
        return;
    };

    let dir = TempDir::new().unwrap();
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o777)).unwrap();
    let by_name = dir.path().join("by-name.txt");
    let by_id = dir.path().join("by-id.txt");

    let actions = load(
        r#"
actions:
  - name: by-name
    command: "sh -c 'id -u > ${OUT}; id -G >> ${OUT}'"
    uid: nobody
  - name: by-id
    command: "sh -c 'id -u > ${OUT}; id -G >> ${OUT}'"
    uid: 65534
    gid: 65534
"#,
    )
    .unwrap();

    let saved = getgroups().unwrap();
    setgroups(&[Gid::from_raw(0), Gid::from_raw(4242)]).unwrap();

    let run = |name: &str, out: &std::path::Path| {
        let event = Uevent::from_pairs([("OUT", out.to_str().unwrap())]);
        actions
            .get(name)
            .unwrap()
            .action
            .execute(&event, RuntimeMode::default())
            .unwrap()
    };
    let named = run("by-name", &by_name);
    let numeric = run("by-id", &by_id);

    setgroups(&saved).unwrap();

    assert_eq!(named, ExecOutcome::Exited(0));
    let (uid, groups) = read_ids(&by_name);
    assert_eq!(uid, nobody_uid.as_raw());
    assert!(groups.contains(&nobody_gid.as_raw()), "{groups:?}");
    assert!(!groups.contains(&0), "{groups:?}");
    assert!(!groups.contains(&4242), "{groups:?}");

    assert_eq!(numeric, ExecOutcome::Exited(0));
    assert_eq!(read_ids(&by_id), (65534, vec![65534]));
}
