//! Slash commands. They act on the Context Store and the user's selection
//! directly and never go through extraction.

use compagent_core::candidate::{CandidateContext, CandidateStatus, ContextPatch, format_amount};
use compagent_core::error::TurnError;
use compagent_core::store::ContextStore;
use compagent_core::user::User;
use compagent_store::UserContextStore;
use tracing::info;

use crate::normalize::extract_candidate_id;

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Switch(String),
    Close(Option<String>),
    Reopen(String),
    List,
    Status,
    New(Option<String>),
    Help,
}

/// What a command produced: text for the user and the selection afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub content: String,
    pub candidate_id: Option<String>,
}

impl SlashCommand {
    /// Parse a message starting with `/`. `None` for ordinary messages.
    pub fn parse(message: &str) -> Option<Result<Self, TurnError>> {
        let trimmed = message.trim();
        let body = trimmed.strip_prefix('/')?;
        let mut parts = body.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();

        let id_arg = |usage: &str| -> Result<String, TurnError> {
            arg.and_then(extract_candidate_id)
                .ok_or_else(|| TurnError::Command(format!("Usage: {usage}")))
        };
        let optional_id = || -> Result<Option<String>, TurnError> {
            match arg {
                None => Ok(None),
                Some(raw) => extract_candidate_id(raw).map(Some).ok_or_else(|| {
                    TurnError::Command(format!("'{raw}' is not a candidate ID (expected CAND-XXX)"))
                }),
            }
        };

        let command = match name.as_str() {
            "switch" => id_arg("/switch CAND-XXX").map(Self::Switch),
            "close" => optional_id().map(Self::Close),
            "reopen" => id_arg("/reopen CAND-XXX").map(Self::Reopen),
            "list" => Ok(Self::List),
            "status" => Ok(Self::Status),
            "new" => optional_id().map(Self::New),
            "help" => Ok(Self::Help),
            "" => Err(TurnError::Command(
                "Empty command. Type /help for the list of commands.".into(),
            )),
            other => Err(TurnError::Command(format!(
                "Unknown command '/{other}'. Type /help for the list of commands."
            ))),
        };
        Some(command)
    }

    /// Run the command for `user`, whose current selection is `current`.
    pub async fn execute(
        &self,
        store: &dyn ContextStore,
        users: &UserContextStore,
        user: &User,
        current: Option<String>,
    ) -> Result<CommandOutcome, TurnError> {
        match self {
            Self::Switch(id) => {
                let existing = store.get(id).await?;
                match &existing {
                    Some(ctx) if !ctx.is_open() => {
                        return Err(TurnError::Command(format!(
                            "{id} is closed. Use /reopen {id} to work on it again."
                        )));
                    }
                    _ => {}
                }
                ensure_permitted(user, existing.as_ref(), id)?;
                users.set_current(&user.email, Some(id.clone())).await?;
                info!(user = %user.email, candidate_id = %id, "Switched candidate");

                let content = match existing {
                    Some(ctx) => format!("Switched to {id}.\n\n{}", describe(&ctx)),
                    None => format!(
                        "Switched to {id}. This is a new candidate; tell me about the role to get started."
                    ),
                };
                Ok(CommandOutcome {
                    content,
                    candidate_id: Some(id.clone()),
                })
            }

            Self::Close(id) => {
                let Some(id) = id.clone().or(current) else {
                    return Err(TurnError::Command(
                        "No candidate is selected. Use /close CAND-XXX or /switch first.".into(),
                    ));
                };
                let Some(ctx) = store.get(&id).await? else {
                    return Err(TurnError::Command(format!("No candidate found with ID {id}.")));
                };
                if !ctx.is_open() {
                    return Err(TurnError::Command(format!("{id} is already closed.")));
                }
                ensure_permitted(user, Some(&ctx), &id)?;

                let patch = ContextPatch {
                    status: Some(CandidateStatus::Closed),
                    ..Default::default()
                };
                store.apply(&id, &patch, &user.email).await?;
                users.forget_candidate(&id).await?;
                info!(user = %user.email, candidate_id = %id, "Closed candidate");
                Ok(CommandOutcome {
                    content: format!(
                        "Closed {id}. It no longer appears in active listings; use /reopen {id} to continue later."
                    ),
                    candidate_id: None,
                })
            }

            Self::Reopen(id) => {
                let Some(ctx) = store.get(id).await? else {
                    return Err(TurnError::Command(format!("No candidate found with ID {id}.")));
                };
                if ctx.is_open() {
                    return Err(TurnError::Command(format!("{id} is already open.")));
                }
                ensure_permitted(user, Some(&ctx), id)?;

                let patch = ContextPatch {
                    status: Some(CandidateStatus::Open),
                    ..Default::default()
                };
                let ctx = store.apply(id, &patch, &user.email).await?;
                users.set_current(&user.email, Some(id.clone())).await?;
                info!(user = %user.email, candidate_id = %id, "Reopened candidate");
                Ok(CommandOutcome {
                    content: format!("Reopened {id}.\n\n{}", describe(&ctx)),
                    candidate_id: Some(id.clone()),
                })
            }

            Self::List => {
                let visible = |ctx: &CandidateContext| {
                    !user.user_type.requires_history() || !ctx.recommendation_history.is_empty()
                };
                let mut active = store.list_active(&user.email).await?;
                let mut closed = store.list_closed().await?;
                active.retain(|c| visible(c));
                closed.retain(|c| visible(c));
                let mut content = String::new();
                if active.is_empty() {
                    content.push_str("No active candidates.");
                } else {
                    content.push_str("Active candidates:\n");
                    for ctx in &active {
                        let marker = if current.as_deref() == Some(ctx.candidate_id.as_str()) {
                            " (current)"
                        } else {
                            ""
                        };
                        content.push_str(&format!("- {}{marker}: {}\n", ctx.candidate_id, one_line(ctx)));
                    }
                }
                if !closed.is_empty() {
                    content.push_str("\nClosed candidates:\n");
                    for ctx in &closed {
                        content.push_str(&format!("- {}: {}\n", ctx.candidate_id, one_line(ctx)));
                    }
                }
                Ok(CommandOutcome {
                    content: content.trim_end().to_string(),
                    candidate_id: current,
                })
            }

            Self::Status => {
                let Some(id) = current else {
                    return Ok(CommandOutcome {
                        content: "No candidate is selected. Mention a candidate ID (CAND-XXX) or use /switch.".into(),
                        candidate_id: None,
                    });
                };
                let ctx = store.get(&id).await?;
                ensure_permitted(user, ctx.as_ref(), &id)?;
                let content = match ctx {
                    Some(ctx) => describe(&ctx),
                    None => format!("{id} is selected but nothing has been recorded for it yet."),
                };
                Ok(CommandOutcome {
                    content,
                    candidate_id: Some(id),
                })
            }

            Self::New(id) => match id {
                None => {
                    users.set_current(&user.email, None).await?;
                    Ok(CommandOutcome {
                        content: "Ready for a new candidate. Which candidate ID should I use?".into(),
                        candidate_id: None,
                    })
                }
                Some(id) => {
                    if store.get(id).await?.is_some() {
                        return Err(TurnError::Command(format!(
                            "{id} already exists. Use /switch {id} to work on it."
                        )));
                    }
                    ensure_permitted(user, None, id)?;
                    store.apply(id, &ContextPatch::default(), &user.email).await?;
                    users.set_current(&user.email, Some(id.clone())).await?;
                    info!(user = %user.email, candidate_id = %id, "Started candidate");
                    Ok(CommandOutcome {
                        content: format!("Started {id}. What is the job title for this role?"),
                        candidate_id: Some(id.clone()),
                    })
                }
            },

            Self::Help => Ok(CommandOutcome {
                content: HELP.to_string(),
                candidate_id: current,
            }),
        }
    }
}

const HELP: &str = "Commands:\n\
- /switch CAND-XXX: work on another candidate\n\
- /close [CAND-XXX]: close the current (or given) candidate\n\
- /reopen CAND-XXX: reopen a closed candidate\n\
- /list: active and closed candidates\n\
- /status: what is recorded for the current candidate\n\
- /new [CAND-XXX]: start a new candidate";

/// Recruiters may only touch candidates that already have a recommendation.
pub fn ensure_permitted(
    user: &User,
    ctx: Option<&CandidateContext>,
    candidate_id: &str,
) -> Result<(), TurnError> {
    if !user.user_type.requires_history() {
        return Ok(());
    }
    match ctx {
        Some(ctx) if !ctx.recommendation_history.is_empty() => Ok(()),
        _ => Err(TurnError::NotPermitted(format!(
            "I can only help you with candidates that have existing recommendations from the \
             Compensation Team, and {candidate_id} has none yet."
        ))),
    }
}

fn one_line(ctx: &CandidateContext) -> String {
    let title = ctx.job_title.as_deref().unwrap_or("(no title)");
    let level = ctx.job_level.map(|l| l.to_string()).unwrap_or_else(|| "?".into());
    let location = ctx.location.map(|l| l.to_string()).unwrap_or_else(|| "?".into());
    format!("{title}, {level}, {location}")
}

/// Multi-line summary of what is recorded for a candidate.
pub fn describe(ctx: &CandidateContext) -> String {
    let mut out = format!("**{}** ({})\n", ctx.candidate_id, ctx.status);
    for field in compagent_core::RequiredField::ALL.into_iter().skip(1) {
        let value = ctx
            .field_value(field)
            .unwrap_or_else(|| "not provided".to_string());
        out.push_str(&format!("- {}: {value}\n", field.display_name()));
    }
    if let Some(p) = ctx.proficiency {
        out.push_str(&format!("- Proficiency: {p}\n"));
    }
    let extra = ctx.additional_context.entries();
    if !extra.is_empty() {
        out.push_str("- Additional context: ");
        let parts: Vec<String> = extra.iter().map(|(k, v)| format!("{k} = {v}")).collect();
        out.push_str(&parts.join(", "));
        out.push('\n');
    }
    match ctx.recommendation_history.last() {
        Some(last) => out.push_str(&format!(
            "- Last recommendation: {} {} total ({} recommendation(s) on record)",
            format_amount(last.recommendation.total_compensation),
            last.recommendation.currency,
            ctx.recommendation_history.len()
        )),
        None => {
            let missing = ctx.missing_fields();
            if missing.is_empty() {
                out.push_str("- Ready for a recommendation");
            } else {
                let names: Vec<&str> = missing.iter().map(|f| f.display_name()).collect();
                out.push_str(&format!("- Still needed: {}", names.join(", ")));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use compagent_core::candidate::{
        CompleteFields, InterviewFeedback, JobFamily, JobLevel, Location,
    };
    use compagent_core::lookup::{CachedLookup, LookupKey, MarketRow};
    use compagent_core::recommendation::RecommendationSnapshot;
    use compagent_data::InMemoryLookup;
    use compagent_store::InMemoryContextStore;
    use std::sync::Arc;

    use crate::engine::{EngineInput, RecommendationEngine};

    fn comp() -> User {
        User::comp_team("comp@example.com")
    }

    fn recruiter() -> User {
        User::recruiter("rec@example.com")
    }

    /// Record a Comp Team recommendation for `id`.
    async fn seed_with_history(store: &InMemoryContextStore, id: &str) {
        let fields = CompleteFields {
            candidate_id: id.into(),
            job_title: "Software Engineer".into(),
            job_level: JobLevel::P3,
            location: Location::Sea,
            job_family: JobFamily::Engineering,
            interview_feedback: InterviewFeedback::Hire,
        };
        let input = EngineInput {
            fields: fields.clone(),
            additional: Default::default(),
            proficiency: None,
        };
        let lookup = CachedLookup {
            key: LookupKey::new("Software Engineer", Location::Sea),
            market: Some(MarketRow {
                job_title: "Software Engineer".into(),
                location: "SEA".into(),
                currency: "USD".into(),
                min: 120_000.0,
                max: 180_000.0,
            }),
            parity: Vec::new(),
            fetched_at: Utc::now(),
        };
        let recommendation = RecommendationEngine::new(Arc::new(InMemoryLookup::new()))
            .compute(&input, &lookup)
            .unwrap();
        let patch = ContextPatch {
            recommendation: Some(RecommendationSnapshot {
                timestamp: Utc::now(),
                created_by: "comp@example.com".into(),
                fields,
                additional_context: Default::default(),
                recommendation,
            }),
            ..Default::default()
        };
        store.apply(id, &patch, "comp@example.com").await.unwrap();
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(
            SlashCommand::parse("/switch cand-7").unwrap().unwrap(),
            SlashCommand::Switch("CAND-7".into())
        );
        assert_eq!(SlashCommand::parse("/close").unwrap().unwrap(), SlashCommand::Close(None));
        assert_eq!(SlashCommand::parse("/LIST").unwrap().unwrap(), SlashCommand::List);
        assert_eq!(SlashCommand::parse("/new").unwrap().unwrap(), SlashCommand::New(None));
        assert!(SlashCommand::parse("hello /switch").is_none());
    }

    #[test]
    fn malformed_commands_are_errors() {
        assert!(matches!(
            SlashCommand::parse("/switch").unwrap(),
            Err(TurnError::Command(_))
        ));
        assert!(matches!(
            SlashCommand::parse("/reopen bob").unwrap(),
            Err(TurnError::Command(_))
        ));
        assert!(matches!(
            SlashCommand::parse("/frobnicate").unwrap(),
            Err(TurnError::Command(_))
        ));
    }

    #[tokio::test]
    async fn reopen_missing_candidate_is_a_command_error() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        let err = SlashCommand::Reopen("CAND-404".into())
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Command(_)));
        assert!(store.get("CAND-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_then_reopen() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        let patch = ContextPatch {
            job_level: Some(JobLevel::P2),
            ..Default::default()
        };
        store.apply("CAND-1", &patch, "comp@example.com").await.unwrap();
        users.set_current("comp@example.com", Some("CAND-1".into())).await.unwrap();

        let out = SlashCommand::Close(None)
            .execute(&store, &users, &comp(), Some("CAND-1".into()))
            .await
            .unwrap();
        assert_eq!(out.candidate_id, None);
        assert_eq!(users.current("comp@example.com").await, None);
        assert!(store.list_active("comp@example.com").await.unwrap().is_empty());

        let err = SlashCommand::Switch("CAND-1".into())
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Command(_)));

        let out = SlashCommand::Reopen("CAND-1".into())
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap();
        assert_eq!(out.candidate_id.as_deref(), Some("CAND-1"));
        assert!(store.get("CAND-1").await.unwrap().unwrap().is_open());

        let err = SlashCommand::Reopen("CAND-1".into())
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Command(_)));
    }

    #[tokio::test]
    async fn close_without_selection_fails() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        let err = SlashCommand::Close(None)
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Command(_)));
    }

    #[tokio::test]
    async fn recruiter_cannot_switch_to_candidate_without_history() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        store
            .apply("CAND-2", &ContextPatch::default(), "comp@example.com")
            .await
            .unwrap();
        let err = SlashCommand::Switch("CAND-2".into())
            .execute(&store, &users, &User::recruiter("rec@example.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::NotPermitted(_)));
        assert_eq!(users.current("rec@example.com").await, None);
    }

    #[tokio::test]
    async fn list_marks_current_and_shows_closed() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        store.apply("CAND-1", &ContextPatch::default(), "a").await.unwrap();
        store
            .apply(
                "CAND-2",
                &ContextPatch {
                    status: Some(CandidateStatus::Closed),
                    ..Default::default()
                },
                "a",
            )
            .await
            .unwrap();

        let out = SlashCommand::List
            .execute(&store, &users, &comp(), Some("CAND-1".into()))
            .await
            .unwrap();
        assert!(out.content.contains("CAND-1 (current)"));
        assert!(out.content.contains("Closed candidates"));
        assert!(out.content.contains("CAND-2"));
    }

    #[tokio::test]
    async fn recruiter_list_only_shows_candidates_with_history() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        store.apply("CAND-1", &ContextPatch::default(), "comp@example.com").await.unwrap();
        seed_with_history(&store, "CAND-2").await;
        store
            .apply(
                "CAND-3",
                &ContextPatch {
                    status: Some(CandidateStatus::Closed),
                    ..Default::default()
                },
                "comp@example.com",
            )
            .await
            .unwrap();

        let out = SlashCommand::List
            .execute(&store, &users, &recruiter(), None)
            .await
            .unwrap();
        assert!(out.content.contains("CAND-2"));
        assert!(!out.content.contains("CAND-1"));
        assert!(!out.content.contains("CAND-3"));
        assert!(!out.content.contains("Closed candidates"));

        let out = SlashCommand::List
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap();
        assert!(out.content.contains("CAND-1"));
        assert!(out.content.contains("CAND-3"));
    }

    #[tokio::test]
    async fn recruiter_status_requires_history() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        store
            .apply(
                "CAND-1",
                &ContextPatch {
                    job_level: Some(JobLevel::P4),
                    ..Default::default()
                },
                "comp@example.com",
            )
            .await
            .unwrap();
        seed_with_history(&store, "CAND-2").await;

        let err = SlashCommand::Status
            .execute(&store, &users, &recruiter(), Some("CAND-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::NotPermitted(_)));

        let out = SlashCommand::Status
            .execute(&store, &users, &recruiter(), Some("CAND-2".into()))
            .await
            .unwrap();
        assert_eq!(out.candidate_id.as_deref(), Some("CAND-2"));

        let out = SlashCommand::Status
            .execute(&store, &users, &comp(), Some("CAND-1".into()))
            .await
            .unwrap();
        assert!(out.content.contains("P4"));
    }

    #[tokio::test]
    async fn new_with_existing_id_fails() {
        let store = InMemoryContextStore::default();
        let users = UserContextStore::new();
        store.apply("CAND-1", &ContextPatch::default(), "a").await.unwrap();
        let err = SlashCommand::New(Some("CAND-1".into()))
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Command(_)));

        let out = SlashCommand::New(Some("CAND-9".into()))
            .execute(&store, &users, &comp(), None)
            .await
            .unwrap();
        assert_eq!(out.candidate_id.as_deref(), Some("CAND-9"));
        assert!(store.get("CAND-9").await.unwrap().is_some());
        assert_eq!(users.current("comp@example.com").await.as_deref(), Some("CAND-9"));
    }
}
