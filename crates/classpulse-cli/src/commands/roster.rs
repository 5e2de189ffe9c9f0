//! The `classpulse roster` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use classpulse_core::cache::SessionCache;
use classpulse_core::engine::DashboardEngine;
use classpulse_core::model::{LastAccess, StudentRow, TeacherView};
use classpulse_core::risk::{RiskEngine, RiskEngineConfig};
use classpulse_remote::config::{create_predictor, create_store, load_config_from};

pub async fn execute(
    teacher_id: String,
    format: String,
    output: Option<PathBuf>,
    parallelism: Option<usize>,
    cache_ttl_secs: Option<u64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(!teacher_id.trim().is_empty(), "teacher id must not be empty");
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
    }

    let config = load_config_from(config_path.as_deref())?;
    tracing::debug!(?config, "loaded configuration");
    let mut dashboard_config = config.dashboard_config();
    if let Some(p) = parallelism {
        dashboard_config.parallelism = p;
    }
    if let Some(ttl) = cache_ttl_secs {
        dashboard_config.cache_ttl = Duration::from_secs(ttl);
    }

    let store = create_store(&config.store);
    let predictor = create_predictor(&config.predictor);
    let engine = DashboardEngine::new(
        store,
        Arc::new(RiskEngine::new(predictor, RiskEngineConfig::default())),
        Arc::new(SessionCache::new()),
        dashboard_config,
    );

    let view = engine.build_teacher_view(&teacher_id).await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        "table" => print_roster(&view),
        other => anyhow::bail!("unknown format: {other} (expected table or json)"),
    }

    if let Some(path) = &output {
        view.save_json(path)?;
        eprintln!("View saved to: {}", path.display());
    }

    Ok(())
}

fn print_roster(view: &TeacherView) {
    use comfy_table::{Cell, Table};

    let mut rows: Vec<&StudentRow> = view.students.iter().collect();
    rows.sort_by(|a, b| b.risk.score.cmp(&a.risk.score));

    let mut table = Table::new();
    table.set_header(vec![
        "Student",
        "Avg Score",
        "Completion",
        "Missing",
        "Last Access",
        "Risk",
        "At Risk",
    ]);

    for row in rows {
        let (score, completion, risk) = if row.degraded {
            ("-".to_string(), "-".to_string(), "unavailable".to_string())
        } else {
            (
                format!("{:.1}%", row.overview.average_score),
                format!("{:.1}%", row.overview.completion_rate),
                format!("{} ({})", row.risk.level, row.risk.score),
            )
        };
        table.add_row(vec![
            Cell::new(&row.student_name),
            Cell::new(score),
            Cell::new(completion),
            Cell::new(row.overview.missing_assignments),
            Cell::new(format_last_access(row.overview.last_access)),
            Cell::new(risk),
            Cell::new(if row.risk.is_at_risk { "yes" } else { "" }),
        ]);
    }

    println!("{table}");
    println!(
        "\n{} students, {} at risk, {} courses ({}ms)",
        view.students.len(),
        view.at_risk_count(),
        view.courses.len(),
        view.duration_ms,
    );
    println!(
        "Generated {} for teacher {}",
        view.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        view.teacher_id,
    );
}

fn format_last_access(access: LastAccess) -> String {
    match access {
        LastAccess::DaysAgo(0) => "today".to_string(),
        LastAccess::DaysAgo(1) => "1 day ago".to_string(),
        LastAccess::DaysAgo(d) => format!("{d} days ago"),
        LastAccess::Unparseable => "unknown".to_string(),
        LastAccess::Never => "never".to_string(),
    }
}
