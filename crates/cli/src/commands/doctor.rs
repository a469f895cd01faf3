use secrecy::ExposeSecret;
use serde::Serialize;
use threadline_core::config::{AppConfig, LoadOptions};
use threadline_db::{connect_with_settings, CatalogRepository, SqlCatalogRepository};

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
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["gateway_credentials", "model_credentials", "database_connectivity", "catalog_readiness"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_gateway_credentials(&config));
            checks.push(check_model_credentials(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(
                DEPENDENT_CHECKS
                    .iter()
                    .map(|name| DoctorCheck::skipped(*name, "configuration did not load")),
            );
        }
    }

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_gateway_credentials(config: &AppConfig) -> DoctorCheck {
    let gateway = &config.gateway;
    let token_set = !gateway.auth_token.expose_secret().trim().is_empty();
    DoctorCheck {
        name: "gateway_credentials",
        status: if token_set { CheckStatus::Pass } else { CheckStatus::Fail },
        details: format!(
            "sending as {} through {} (auth token {})",
            gateway.from_number,
            gateway.api_base_url,
            if token_set { "set" } else { "missing" }
        ),
    }
}

fn check_model_credentials(config: &AppConfig) -> DoctorCheck {
    let key_set =
        config.llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
    DoctorCheck {
        name: "model_credentials",
        status: if key_set { CheckStatus::Pass } else { CheckStatus::Fail },
        details: format!(
            "{} for chat, {} for embeddings (api key {})",
            config.llm.model,
            config.llm.embedding_model,
            if key_set { "set" } else { "missing" }
        ),
    }
}

/// Connectivity first; the catalog check only runs against a reachable database.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck::skipped("catalog_readiness", "the database was not checked"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck::skipped("catalog_readiness", "the database is unreachable"),
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let catalog = catalog_readiness(&SqlCatalogRepository::new(pool.clone())).await;
        pool.close().await;
        vec![connectivity, catalog]
    })
}

async fn catalog_readiness(repository: &dyn CatalogRepository) -> DoctorCheck {
    let counts = async {
        let products = repository.list_products().await?.len();
        let documents = repository.count_documents().await?;
        Ok::<_, threadline_db::RepositoryError>((products, documents))
    }
    .await;

    match counts {
        Ok((0, _)) => DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Fail,
            details: "no products found; run `threadline migrate` and `threadline seed`"
                .to_string(),
        },
        Ok((products, 0)) => DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Fail,
            details: format!("{products} products but no search documents; run `threadline index`"),
        },
        Ok((products, documents)) => DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Pass,
            details: format!("{products} products, {documents} search documents"),
        },
        Err(error) => DoctorCheck {
            name: "catalog_readiness",
            status: CheckStatus::Fail,
            details: format!("catalog could not be read: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
