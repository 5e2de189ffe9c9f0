//! The `classpulse health` command.

use std::path::PathBuf;

use anyhow::Result;

use classpulse_core::model::RecordKind;
use classpulse_core::traits::{RecordStore, RiskPredictor};
use classpulse_remote::config::{create_predictor, create_store, load_config_from};

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let store = create_store(&config.store);
    let predictor = create_predictor(&config.predictor);

    // Any well-formed answer from the store counts, including "not found".
    let store_ok = match store.get(RecordKind::User, "health-probe").await {
        Ok(_) => {
            println!("store      ok        {}", config.store.base_url);
            true
        }
        Err(e) => {
            println!("store      DOWN      {} ({e})", config.store.base_url);
            false
        }
    };

    let predictor_ok = match predictor.health().await {
        Ok(health) if health.is_available() => {
            println!("predictor  ok        {}", config.predictor.base_url);
            true
        }
        Ok(health) => {
            println!(
                "predictor  degraded  {} (status {}, model_loaded {})",
                config.predictor.base_url, health.status, health.model_loaded
            );
            false
        }
        Err(e) => {
            println!("predictor  DOWN      {} ({e})", config.predictor.base_url);
            false
        }
    };

    if store_ok && predictor_ok {
        Ok(())
    } else if store_ok {
        // The dashboard still works on the rule-based fallback.
        println!("\nprediction service unavailable; assessments will use the rule-based fallback");
        Ok(())
    } else {
        anyhow::bail!("document store unreachable")
    }
}
