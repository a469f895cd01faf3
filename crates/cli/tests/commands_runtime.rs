use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use threadline_cli::commands::{doctor, index, migrate, seed, start};

const VALID_ENV: &[(&str, &str)] = &[
    ("TWILIO_ACCOUNT_SID", "AC00000000000000000000000000000000"),
    ("TWILIO_AUTH_TOKEN", "test-auth-token"),
    ("TWILIO_PHONE_NUMBER", "+14155238886"),
    ("GEMINI_API_KEY", "test-gemini-key"),
    ("THREADLINE_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn start_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("threadline seed"));
    });
}

#[test]
fn start_returns_config_failure_without_credentials() {
    with_env(&[], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_connectivity_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}/missing-dir/threadline.db", dir.path().display());
    let mut vars = VALID_ENV
        .iter()
        .filter(|(key, _)| *key != "THREADLINE_DATABASE_URL")
        .copied()
        .collect::<Vec<_>>();
    vars.push(("THREADLINE_DATABASE_URL", url.as_str()));

    with_env(&vars, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 4, "expected db connectivity failure: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn seed_loads_the_demo_catalog() {
    with_env(VALID_ENV, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo catalog loaded: 7 products"), "{message}");
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("threadline.db").display());
    let mut vars = VALID_ENV
        .iter()
        .filter(|(key, _)| *key != "THREADLINE_DATABASE_URL")
        .copied()
        .collect::<Vec<_>>();
    vars.push(("THREADLINE_DATABASE_URL", url.as_str()));

    with_env(&vars, || {
        let first = seed::run();
        let second = seed::run();
        assert_eq!(first.exit_code, 0, "{}", first.output);
        assert_eq!(second.exit_code, 0, "{}", second.output);
        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );

        let preflight = parse_payload(&start::run().output);
        let message = preflight["message"].as_str().unwrap_or_default();
        assert!(message.contains("(7 products, 0 catalog documents)"), "{message}");
        assert!(message.contains("threadline index"), "{message}");
    });
}

#[test]
fn index_fails_fast_without_configuration() {
    with_env(&[], || {
        let result = index::run(false, None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn index_reports_unreadable_source_files() {
    with_env(VALID_ENV, || {
        let result = index::run(false, Some(std::path::Path::new("/nonexistent/knowledge.txt")));
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "index_source");
        assert!(payload["message"].as_str().unwrap_or_default().contains("knowledge.txt"));
    });
}

#[test]
fn doctor_json_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");

        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn doctor_flags_an_empty_catalog() {
    with_env(VALID_ENV, || {
        let report: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");

        let checks = report["checks"].as_array().expect("checks");
        let status_of = |name: &str| {
            checks.iter().find(|check| check["name"] == name).map(|check| check["status"].clone())
        };
        assert_eq!(status_of("gateway_credentials"), Some(Value::from("pass")));
        assert_eq!(status_of("database_connectivity"), Some(Value::from("pass")));
        assert_eq!(status_of("catalog_readiness"), Some(Value::from("fail")));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "THREADLINE_DATABASE_URL",
        "THREADLINE_DATABASE_MAX_CONNECTIONS",
        "THREADLINE_DATABASE_TIMEOUT_SECS",
        "THREADLINE_GATEWAY_ACCOUNT_SID",
        "THREADLINE_GATEWAY_AUTH_TOKEN",
        "THREADLINE_GATEWAY_FROM_NUMBER",
        "THREADLINE_GATEWAY_API_BASE_URL",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "TWILIO_PHONE_NUMBER",
        "THREADLINE_LLM_PROVIDER",
        "THREADLINE_LLM_API_KEY",
        "GEMINI_API_KEY",
        "THREADLINE_LLM_BASE_URL",
        "THREADLINE_LLM_MODEL",
        "THREADLINE_LLM_MAX_RETRIES",
        "THREADLINE_AGENT_MAX_TOOL_ITERATIONS",
        "THREADLINE_SERVER_BIND_ADDRESS",
        "THREADLINE_SERVER_PORT",
        "THREADLINE_LOGGING_LEVEL",
        "THREADLINE_LOGGING_FORMAT",
        "THREADLINE_LOG_LEVEL",
        "THREADLINE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
