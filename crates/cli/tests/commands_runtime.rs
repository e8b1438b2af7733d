use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use lineup_cli::commands::{config, doctor, migrate, slots};
use lineup_core::{FrontDesk, NoopNotifier, OwnerId, Slot};
use lineup_db::{connect_with_settings, SqlLineupRepository};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("LINEUP_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_horizon() {
    with_env(
        &[("LINEUP_DATABASE_URL", "sqlite::memory:"), ("LINEUP_BOOKING_HORIZON_DAYS", "0")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn config_redacts_bot_token_and_attributes_env_source() {
    with_env(
        &[
            ("LINEUP_DATABASE_URL", "sqlite::memory:"),
            ("LINEUP_MESSENGER_ENABLED", "true"),
            ("LINEUP_MESSENGER_BOT_TOKEN", "123456:very-secret"),
        ],
        || {
            let output = config::run();
            assert!(output.contains(
                "- messenger.bot_token = 123456:*** (source: env (LINEUP_MESSENGER_BOT_TOKEN))"
            ));
            assert!(output.contains("- booking.horizon_days = 7 (source: default)"));
            assert!(!output.contains("very-secret"));
        },
    );
}

#[test]
fn doctor_reports_pending_schema_until_migrated() {
    let dir = TempDir::new().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("LINEUP_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 2);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(check(&report, "database_connectivity")["status"], "pass");
        assert_eq!(check(&report, "schema_migrations")["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(check(&report, "messenger_readiness")["status"], "pass");
    });
}

#[test]
fn slots_lists_free_times_for_a_seeded_provider() {
    let dir = TempDir::new().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("LINEUP_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);
        let provider_id = seed_provider(&url);

        let result = slots::run(provider_id, "2025-08-25");
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        let times: Vec<&str> =
            message.trim_start_matches("2025-08-25: ").split(", ").collect();
        assert_eq!(times.len(), 16, "09:00 is blocked: {message}");
        assert_eq!(times.first(), Some(&"09:30"));
        assert_eq!(times.last(), Some(&"17:00"));

        let unknown = slots::run(provider_id + 100, "2025-08-25");
        assert_eq!(unknown.exit_code, 7);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "not_found");

        let malformed = slots::run(provider_id, "25/08/2025");
        assert_eq!(malformed.exit_code, 6);
        assert_eq!(parse_payload(&malformed.output)["error_class"], "invalid_input");
    });
}

fn seed_provider(url: &str) -> i64 {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await.expect("connect");
        let repository = Arc::new(SqlLineupRepository::new(pool.clone()));
        let desk = FrontDesk::new(repository, Arc::new(NoopNotifier));
        let owner = OwnerId(42);
        let provider = desk.register_provider(owner, "Salon").await.expect("register");
        desk.add_busy_block(owner, Slot::parse("2025-08-25", "09:00").expect("slot"))
            .await
            .expect("busy block");
        pool.close().await;
        provider.id.0
    })
}

fn file_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("lineup.db").display())
}

fn check<'a>(report: &'a Value, name: &str) -> &'a Value {
    static MISSING: Value = Value::Null;
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .unwrap_or(&MISSING)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LINEUP_DATABASE_URL",
        "LINEUP_DATABASE_MAX_CONNECTIONS",
        "LINEUP_DATABASE_TIMEOUT_SECS",
        "LINEUP_MESSENGER_ENABLED",
        "LINEUP_MESSENGER_BOT_TOKEN",
        "LINEUP_MESSENGER_API_BASE_URL",
        "LINEUP_MESSENGER_TIMEOUT_SECS",
        "LINEUP_BOOKING_HORIZON_DAYS",
        "LINEUP_BOOKING_INTAKE_TIMEOUT_SECS",
        "LINEUP_SERVER_BIND_ADDRESS",
        "LINEUP_SERVER_PORT",
        "LINEUP_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LINEUP_LOGGING_LEVEL",
        "LINEUP_LOGGING_FORMAT",
        "LINEUP_LOG_LEVEL",
        "LINEUP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
