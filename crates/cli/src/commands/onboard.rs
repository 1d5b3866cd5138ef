//! `compagent onboard`: First-time setup.

use compagent_config::AppConfig;

const SAMPLE_COMP_RANGES: &str = "\
Job Title,Location,Currency,Min,Max
Software Engineer,SEA,USD,120000,180000
Software Engineer,LAX,USD,125000,185000
Data Scientist,SEA,USD,130000,190000
Product Manager,DUB,EUR,80000,120000
";

const SAMPLE_EMPLOYEE_ROSTER: &str = "\
Name,Job Title,Job Family,Proficiency,Location,Compensation
Employee 1,Software Engineer,Engineering,Advanced,SEA,170000
Employee 2,Software Engineer,Engineering,Intermediate,SEA,150000
Employee 3,Data Scientist,Engineering,Advanced,SEA,175000
";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let config = AppConfig::default();

    println!("💼 CompAgent — First-Time Setup");
    println!("===============================\n");

    for dir in [&config_dir, &config.data.data_dir, &config.store.dir] {
        if dir.exists() {
            println!("  Directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created {}", dir.display());
        }
    }

    // Sample lookup tables, only when none are present
    for (path, sample) in [
        (config.data.comp_ranges_path(), SAMPLE_COMP_RANGES),
        (config.data.employee_roster_path(), SAMPLE_EMPLOYEE_ROSTER),
    ] {
        if !path.exists() {
            std::fs::write(&path, sample)?;
            println!("✅ Created sample table {}", path.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set COMPAGENT_API_KEY (or add api_key to {})", config_path.display());
        println!("   2. Replace the sample CSV tables in {}", config.data.data_dir.display());
        println!("   3. Run: compagent chat\n");
    }

    println!("🎉 Setup complete! Run `compagent chat` to start.\n");

    Ok(())
}
