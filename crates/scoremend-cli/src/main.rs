//! Scoremend - Scorecard Remediation CLI
//!
//! ## Commands
//!
//! - `view`: aggregate an entity's scorecards and evaluated scores
//! - `next-steps`: show the outstanding rules for one scorecard
//! - `remediate`: run a rule's remediation action and poll the
//!   re-evaluation to a terminal state
//! - `re-evaluate`: trigger a re-evaluation and refresh the score once

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use scoremend_core::{
    init_tracing, ActionRegistry, BranchProtectionAction, EntityRef, GithubConfig,
    HttpScoreClient, NextStepsView, PollPolicy, RemediationOrchestrator, ScoreApi, ScoreApiConfig,
};

#[derive(Parser)]
#[command(name = "scoremend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scorecard compliance remediation orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Scorecard API base URL
    #[arg(long, global = true, env = "SCOREMEND_API_BASE")]
    api_base: Option<String>,

    /// Scorecard API bearer token
    #[arg(long, global = true, env = "SCOREMEND_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate an entity's scorecards and evaluated scores
    View {
        /// Entity tag, e.g. service:payments-api
        #[arg(short, long)]
        entity: String,
    },

    /// Show the outstanding rules for one scorecard
    NextSteps {
        /// Entity tag
        #[arg(short, long)]
        entity: String,

        /// Scorecard tag
        #[arg(short, long)]
        scorecard: String,
    },

    /// Run a rule's remediation action, then poll the re-evaluation
    Remediate {
        /// Entity tag
        #[arg(short, long)]
        entity: String,

        /// Scorecard tag
        #[arg(short, long)]
        scorecard: String,

        /// Rule title to remediate
        #[arg(short, long)]
        rule: String,

        /// Repository for the branch-protection action, as owner/repo
        #[arg(long)]
        github_repo: Option<String>,

        /// Branch the protection policy applies to
        #[arg(long, default_value = "main")]
        github_branch: String,

        /// Manual remediation mapping, repeatable, as '<rule title>=<url>'
        #[arg(long = "manual", value_name = "TITLE=URL")]
        manual: Vec<String>,

        /// Maximum poll attempts before giving up
        #[arg(long, default_value_t = 10)]
        max_attempts: u32,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1500)]
        interval_ms: u64,
    },

    /// Trigger a re-evaluation and refresh the score once
    ReEvaluate {
        /// Entity tag
        #[arg(short, long)]
        entity: String,

        /// Scorecard tag
        #[arg(short, long)]
        scorecard: String,
    },
}

fn score_client(cli: &Cli) -> HttpScoreClient {
    let mut config = ScoreApiConfig::from_env();
    if let Some(base) = &cli.api_base {
        config.base_url = base.trim_end_matches('/').to_string();
    }
    if let Some(token) = &cli.api_token {
        config.token = Some(token.clone());
    }
    HttpScoreClient::new(config)
}

fn build_registry(
    scorecard: &str,
    rule: &str,
    github_repo: &Option<String>,
    github_branch: &str,
    manual: &[String],
) -> Result<ActionRegistry> {
    let mut registry = ActionRegistry::new();

    if let Some(repo) = github_repo {
        let (owner, name) = repo
            .split_once('/')
            .context("--github-repo must be in owner/repo form")?;
        registry.register_automated(
            scorecard,
            rule,
            Arc::new(BranchProtectionAction::new(GithubConfig::new(
                owner,
                name,
                github_branch,
            ))),
        );
    }

    for mapping in manual {
        let Some((title, url)) = mapping.split_once('=') else {
            bail!("--manual mapping '{mapping}' must be in '<rule title>=<url>' form");
        };
        registry.register_manual(scorecard, title, url, None);
    }

    Ok(registry)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match &cli.command {
        Commands::View { entity } => {
            let entity = EntityRef::new(entity.as_str())?;
            let api: Arc<dyn ScoreApi> = Arc::new(score_client(&cli));
            let orchestrator = RemediationOrchestrator::new(api, ActionRegistry::new());
            let view = orchestrator.compliance_view(&entity).await?;
            info!(
                "{} scorecard(s), {} scored, {} without a score",
                view.scorecards.len(),
                view.scores.len(),
                view.unscored.len()
            );
            print_json(&view)?;
        }

        Commands::NextSteps { entity, scorecard } => {
            let entity = EntityRef::new(entity.as_str())?;
            let client = score_client(&cli);
            let groups = client.fetch_next_steps(scorecard, &entity.tag).await?;
            let view = NextStepsView::from_groups(&groups);
            if view.completed() {
                info!("All levels of {} are complete for {}", scorecard, entity.tag);
            }
            print_json(&view)?;
        }

        Commands::Remediate {
            entity,
            scorecard,
            rule,
            github_repo,
            github_branch,
            manual,
            max_attempts,
            interval_ms,
        } => {
            let entity = EntityRef::new(entity.as_str())?;
            let registry = build_registry(scorecard, rule, github_repo, github_branch, manual)?;
            let api: Arc<dyn ScoreApi> = Arc::new(score_client(&cli));
            let orchestrator =
                RemediationOrchestrator::new(api, registry).with_policy(PollPolicy {
                    max_attempts: *max_attempts,
                    interval: Duration::from_millis(*interval_ms),
                });
            let outcome = orchestrator.remediate(rule, scorecard, &entity).await?;
            for notice in &outcome.notices {
                info!("{notice}");
            }
            print_json(&outcome)?;
        }

        Commands::ReEvaluate { entity, scorecard } => {
            let entity = EntityRef::new(entity.as_str())?;
            let api: Arc<dyn ScoreApi> = Arc::new(score_client(&cli));
            let orchestrator = RemediationOrchestrator::new(api, ActionRegistry::new());
            match orchestrator.re_evaluate(scorecard, &entity).await? {
                Some(score) => print_json(&score)?,
                None => info!("No score yet for {} on {}", entity.tag, scorecard),
            }
        }
    }

    Ok(())
}
