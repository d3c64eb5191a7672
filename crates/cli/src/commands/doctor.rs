use serde::Serialize;

use rolodex_core::config::{AppConfig, LoadOptions};
use rolodex_db::connect;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> String {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "failed",
                detail: error.to_string(),
            });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(database_check(config));
    } else {
        checks.push(DoctorCheck {
            name: "database",
            status: "skipped",
            detail: "config did not load".to_string(),
        });
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let report =
        DoctorReport { status: if healthy { "ready" } else { "degraded" }, checks };

    if json {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"detail\":\"{error}\"}}"))
    } else {
        render_report(&report)
    }
}

fn database_check(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: "failed",
                detail: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect(&config.database).await?;
        sqlx_ping(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    });

    match outcome {
        Ok(()) => DoctorCheck {
            name: "database",
            status: "ok",
            detail: format!("connected to {}", config.database.url),
        },
        Err(error) => DoctorCheck {
            name: "database",
            status: "failed",
            detail: error.to_string(),
        },
    }
}

async fn sqlx_ping(pool: &rolodex_db::DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

fn render_report(report: &DoctorReport) -> String {
    let mut lines = vec![format!("rolodex doctor: {}", report.status)];
    for check in &report.checks {
        lines.push(format!("  [{}] {} - {}", check.status, check.name, check.detail));
    }
    lines.join("\n")
}
