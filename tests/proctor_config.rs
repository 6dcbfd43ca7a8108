use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use proctor_kernel::config::ProctorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PROCTOR_CONFIG",
        "PROCTOR_TEST_TITLE",
        "PROCTOR_ALLOW_TAB_SWITCH",
        "PROCTOR_SHOW_WARNINGS",
        "PROCTOR_TIME_LIMIT_SECS",
        "PROCTOR_ALERT_SECS",
        "PROCTOR_KEY_SEED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(
        br#"
test_title = "Thermodynamics Midterm"
time_limit_secs = 3600

[policy]
allow_tab_switch = false
show_warnings = true

[alert]
seconds = 7

[signing]
key_seed = "room-12"
"#,
    )
    .expect("write config");

    std::env::set_var("PROCTOR_CONFIG", file.path());
    std::env::set_var("PROCTOR_ALLOW_TAB_SWITCH", "true");
    std::env::set_var("PROCTOR_TIME_LIMIT_SECS", "5400");

    let cfg = ProctorConfig::load().expect("load config");
    assert_eq!(cfg.test_title, "Thermodynamics Midterm");
    assert_eq!(cfg.time_limit_secs, Some(5400));
    assert!(cfg.allow_tab_switch);
    assert!(cfg.show_warnings);
    assert_eq!(cfg.alert_duration, Duration::from_secs(7));
    assert_eq!(cfg.key_seed.as_deref(), Some("room-12"));

    let policy = cfg.to_policy().expect("policy");
    assert!(policy.allow_tab_switch);
    assert_eq!(policy.time_remaining_seconds, Some(5400));

    clear_env();
}

#[test]
fn loads_json_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    file.write_all(
        br#"{
            "test_title": "World History",
            "policy": { "show_warnings": false }
        }"#,
    )
    .expect("write config");
    std::env::set_var("PROCTOR_CONFIG", file.path());

    let cfg = ProctorConfig::load().expect("load config");
    assert_eq!(cfg.test_title, "World History");
    assert!(!cfg.show_warnings);
    assert!(!cfg.allow_tab_switch);
    assert_eq!(cfg.time_limit_secs, None);

    clear_env();
}

#[test]
fn rejects_unknown_fields_and_bad_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(b"test_title = \"Quiz\"\nallow_everything = true\n")
        .expect("write config");
    std::env::set_var("PROCTOR_CONFIG", file.path());
    assert!(ProctorConfig::load().is_err());

    std::env::remove_var("PROCTOR_CONFIG");
    std::env::set_var("PROCTOR_SHOW_WARNINGS", "sometimes");
    assert!(ProctorConfig::load().is_err());

    std::env::set_var("PROCTOR_SHOW_WARNINGS", "on");
    std::env::set_var("PROCTOR_ALERT_SECS", "0");
    assert!(ProctorConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PROCTOR_CONFIG", "/nonexistent/proctor.toml");
    let err = ProctorConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
