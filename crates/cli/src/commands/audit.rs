//! `compagent audit`: Print a candidate's audit log.

use compagent_agent::normalize::extract_candidate_id;
use compagent_config::AppConfig;

pub async fn run(candidate: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let id = extract_candidate_id(candidate)
        .ok_or_else(|| format!("'{candidate}' is not a candidate ID (expected CAND-XXX)"))?;

    let store = compagent_store::open_context_store(
        &config.store.backend,
        &config.store.dir,
        config.store.context_retention_days,
    )?;
    let entries = store.audit_log(&id).await?;

    println!("💼 Audit log for {id}");
    println!();
    if entries.is_empty() {
        println!("  No entries.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "  {}  {:<28} {:<20} {} → {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.user,
            entry.field,
            entry.old_value.as_deref().unwrap_or("∅"),
            entry.new_value.as_deref().unwrap_or("∅"),
        );
    }
    println!();
    println!("  {} entries", entries.len());

    Ok(())
}
