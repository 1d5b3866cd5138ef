//! `compagent status`: Show configuration status.

use compagent_config::AppConfig;
use compagent_core::user::UserType;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let comp = config
        .users
        .iter()
        .filter(|u| u.user_type == UserType::CompTeam)
        .count();

    println!("💼 CompAgent Status");
    println!("===================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Fallback:     {}", config.fallback.join(", "));
    println!("  Model:        {}", config.default_model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Comp ranges:  {}", config.data.comp_ranges_path().display());
    println!("  Roster:       {}", config.data.employee_roster_path().display());
    println!("  Store:        {} ({})", config.store.backend, config.store.dir.display());
    println!("  Retention:    {} days", config.store.context_retention_days);
    println!("  Validator:    {}", if config.agent.enable_validator { "enabled" } else { "disabled" });
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Users:        {} ({} comp team, {} recruitment)", config.users.len(), comp, config.users.len() - comp);

    for (label, path) in [
        ("Comp ranges table", config.data.comp_ranges_path()),
        ("Employee roster", config.data.employee_roster_path()),
    ] {
        if path.exists() {
            println!("\n  ✅ {label} found");
        } else {
            println!("\n  ⚠️  {label} missing — run `compagent onboard` or set COMPAGENT_DATA_DIR");
        }
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file — run `compagent onboard` first");
    }

    Ok(())
}
