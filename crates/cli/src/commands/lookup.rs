//! `compagent lookup`: Print the rows a recommendation would be built from.

use compagent_config::AppConfig;
use compagent_core::candidate::Location;
use compagent_core::lookup::LookupProvider;
use compagent_data::CsvLookup;

pub async fn run(title: &str, location: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let location: Location = location.parse()?;
    let lookup = CsvLookup::new(
        config.data.comp_ranges_path(),
        config.data.employee_roster_path(),
    );

    let catalog = lookup.catalog().await?;
    let title = catalog.canonical_title(title).unwrap_or(title).to_string();

    println!("💼 {title} @ {location}");
    println!();

    let market = lookup.market_rows(&title, location.code()).await?;
    if market.is_empty() {
        println!("  No market range found.");
    }
    for row in &market {
        println!(
            "  Market:  {} {:.0} – {:.0}",
            row.currency, row.min, row.max
        );
    }

    let parity = lookup.parity_rows(&title, location.code()).await?;
    println!();
    println!("  Internal employees: {}", parity.len());
    for row in &parity {
        println!(
            "    {:<20} {:<14} {:<14} {:.0}",
            row.name,
            row.job_family.as_deref().unwrap_or("-"),
            row.proficiency,
            row.compensation
        );
    }

    Ok(())
}
