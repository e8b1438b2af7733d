use lineup_core::config::AppConfig;
use lineup_db::{connect_with_config, migrations::MIGRATOR};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{load_config, runtime, CommandResult, EXIT_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\
                 \"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match load_config("doctor") {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_messenger(&config));
            checks.extend(check_database(&config));
        }
        Err(failure) => {
            checks.push(DoctorCheck::fail("config_validation", failure_message(&failure)));
            checks.push(DoctorCheck::skipped("messenger_readiness"));
            checks.push(DoctorCheck::skipped("database_connectivity"));
            checks.push(DoctorCheck::skipped("schema_migrations"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn failure_message(failure: &CommandResult) -> String {
    serde_json::from_str::<serde_json::Value>(&failure.output)
        .ok()
        .and_then(|payload| payload["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| failure.output.clone())
}

fn check_messenger(config: &AppConfig) -> DoctorCheck {
    if !config.messenger.enabled {
        return DoctorCheck::pass(
            "messenger_readiness",
            "messenger disabled; client and provider notifications are dropped",
        );
    }

    let bot_id = config
        .messenger
        .bot_token
        .expose_secret()
        .split_once(':')
        .map(|(bot_id, _)| bot_id.to_string())
        .unwrap_or_else(|| "<opaque token>".to_string());
    DoctorCheck::pass(
        "messenger_readiness",
        format!("bot {bot_id} will post through {}", config.messenger.api_base_url),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return vec![
                DoctorCheck::fail("database_connectivity", failure_message(&failure)),
                DoctorCheck::fail("schema_migrations", "no runtime to inspect the schema"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::fail("schema_migrations", "database is unreachable"),
                ];
            }
        };

        let connectivity = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await {
            Ok(_) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => {
                DoctorCheck::fail("database_connectivity", format!("probe failed: {error}"))
            }
        };

        let expected = MIGRATOR
            .iter()
            .filter(|migration| migration.migration_type.is_up_migration())
            .count();
        let applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap_or(0);
        let schema = if applied as usize >= expected {
            DoctorCheck::pass(
                "schema_migrations",
                format!("{applied} of {expected} migrations applied"),
            )
        } else {
            DoctorCheck::fail(
                "schema_migrations",
                format!("{applied} of {expected} migrations applied; run `lineup migrate`"),
            )
        };

        pool.close().await;
        vec![connectivity, schema]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
