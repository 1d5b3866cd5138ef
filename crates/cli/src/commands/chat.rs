//! `compagent chat`: Interactive or single-message mode.

use std::io::Write;
use std::sync::Arc;

use compagent_agent::normalize::extract_candidate_id;
use compagent_agent::{Assistant, TurnEvent, TurnRequest};
use compagent_config::AppConfig;
use compagent_core::user::User;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::debug;

/// Pick the acting user: the named one, else the first configured
/// Comp Team member.
fn resolve_user(config: &AppConfig, email: Option<&str>) -> Result<User, String> {
    match email {
        Some(email) => config
            .user(email)
            .map(|u| User::new(u.email.to_lowercase(), u.user_type))
            .ok_or_else(|| format!("Unknown user '{email}'. Add it to the users list in config.toml.")),
        None => config
            .users
            .iter()
            .find(|u| u.user_type.can_reset())
            .map(|u| User::new(u.email.to_lowercase(), u.user_type))
            .ok_or_else(|| "No Comp Team user configured; pass --user".to_string()),
    }
}

/// Run one turn, printing progress to stderr. Returns the selected
/// candidate afterwards.
async fn turn(assistant: &Arc<Assistant>, request: TurnRequest) -> Option<String> {
    let mut rx = assistant.clone().stream(request);
    let mut selected = None;
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Processing { message, .. } => {
                eprint!("\r  ... {message}                    ");
            }
            TurnEvent::Response(response) => {
                eprint!("\r{:60}\r", "");
                println!();
                for line in response.content.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
                selected = response.candidate_id;
            }
            TurnEvent::Error {
                message,
                kind,
                candidate_id,
                ..
            } => {
                eprint!("\r{:60}\r", "");
                eprintln!("  [{kind}] {message}");
                println!();
                selected = candidate_id;
            }
        }
    }
    selected
}

pub async fn run(
    message: Option<String>,
    user: Option<String>,
    candidate: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions when no key is configured
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    COMPAGENT_API_KEY=sk-...   (preferred)");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let user = resolve_user(&config, user.as_deref())?;
    let mut selected = match candidate.as_deref() {
        Some(raw) => Some(
            extract_candidate_id(raw)
                .ok_or_else(|| format!("'{raw}' is not a candidate ID (expected CAND-XXX)"))?,
        ),
        None => None,
    };
    let assistant = Arc::new(Assistant::from_config(&config)?);
    let session_id = format!("cli-{}", chrono::Utc::now().timestamp_millis());
    debug!(user = %user.email, session = %session_id, "Chat session started");

    if let Some(msg) = message {
        // Single message mode
        let mut request = TurnRequest::new(user, msg).with_session(session_id);
        request.candidate_id = selected;
        turn(&assistant, request).await;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║      CompAgent — Interactive Mode             ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  User:      {} ({})", user.email, user.user_type);
    if let Some(id) = &selected {
        println!("  Candidate: {id}");
    }
    println!();
    println!("  Describe a candidate, e.g. \"CAND-001 is a P3 software engineer in Seattle\".");
    println!("  Type /help for commands, 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        if !line.is_empty() {
            let mut request = TurnRequest::new(user.clone(), line).with_session(&session_id);
            request.candidate_id = selected.clone();
            if let Some(id) = turn(&assistant, request).await {
                selected = Some(id);
            }
        }
        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}
