//! Registry maintenance CLI: schema, seeding, hidden skills, and limits.
//!
//! Reads configuration from the environment (and `.env`) and runs against
//! the Postgres store named by `DATABASE_URL`.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use skill_registry::builders::GovernorBuilder;
use skill_registry::config::RegistryConfig;
use skill_registry::core::{AppResult, HiddenSkillMaintenance, RegistryStore};
use skill_registry::infra::import::{read_skill_rows, read_student_rows, seed_skills, seed_students};
use skill_registry::infra::PostgresStore;
use skill_registry::runtime::TokioSpawner;
use skill_registry::util::init_tracing;

#[derive(Parser)]
#[command(name = "skill-admin")]
#[command(about = "Maintenance tasks for the skill registration database")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and indexes
    Migrate,
    /// Upsert skills from a CSV sheet
    SeedSkills {
        /// Path to the skill sheet
        csv: PathBuf,
        /// Capacity for every seeded skill
        #[arg(long)]
        max_selection: Option<u32>,
        /// Descriptions to seed as hidden
        #[arg(long = "hide")]
        hide: Vec<String>,
    },
    /// Upsert students from a CSV sheet
    SeedStudents {
        /// Path to the enrolment sheet
        csv: PathBuf,
    },
    /// Hide skills by exact description (case-insensitive)
    Hide {
        /// Descriptions to hide
        #[arg(required = true)]
        descriptions: Vec<String>,
    },
    /// Change every capacity equal to FROM into TO
    RaiseLimits {
        /// Current capacity
        #[arg(long)]
        from: u32,
        /// New capacity
        #[arg(long)]
        to: u32,
    },
    /// Report, notify, or release students holding hidden skills
    Hidden {
        /// What to do
        #[arg(value_enum)]
        action: HiddenAction,
        /// Show what would happen without mailing or writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete every student
    ClearStudents {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Delete every skill
    ClearSkills {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HiddenAction {
    /// Count holders and list them
    Count,
    /// Mail each holder a re-registration notice
    Notify,
    /// Remove hidden skills from holders and free their places
    Release,
    /// Count, notify, then release
    All,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing();
    let args = Args::parse();
    let config = RegistryConfig::from_env().map_err(anyhow::Error::msg)?;
    let url = config
        .database_url
        .clone()
        .context("DATABASE_URL is not set")?;
    let store = Arc::new(PostgresStore::connect(&url).await?);

    match args.command {
        Command::Migrate => store.migrate().await?,
        Command::SeedSkills {
            csv,
            max_selection,
            hide,
        } => {
            let file = File::open(&csv).with_context(|| format!("opening {}", csv.display()))?;
            let rows = read_skill_rows(file)?;
            let max = max_selection.unwrap_or(config.default_max_selection);
            let written = seed_skills(store.as_ref(), rows, max, &hide).await?;
            tracing::info!("seeded {} skill(s) with max selection {}", written, max);
        }
        Command::SeedStudents { csv } => {
            let file = File::open(&csv).with_context(|| format!("opening {}", csv.display()))?;
            let rows = read_student_rows(file)?;
            let written = seed_students(store.as_ref(), &rows).await?;
            tracing::info!("seeded {} of {} student(s)", written, rows.len());
        }
        Command::Hide { descriptions } => {
            let total = maintenance(&config, &store)?
                .hide_by_description(&descriptions)
                .await?;
            tracing::info!("{} skill(s) hidden", total);
        }
        Command::RaiseLimits { from, to } => {
            maintenance(&config, &store)?.raise_limits(from, to).await?;
        }
        Command::Hidden { action, dry_run } => {
            run_hidden(&config, &store, action, dry_run).await?;
        }
        Command::ClearStudents { yes } => {
            confirm(yes, "clear-students")?;
            tracing::warn!("deleted {} student(s)", store.clear_holders().await?);
        }
        Command::ClearSkills { yes } => {
            confirm(yes, "clear-skills")?;
            tracing::warn!("deleted {} skill(s)", store.clear_resources().await?);
        }
    }
    Ok(())
}

fn maintenance(
    config: &RegistryConfig,
    store: &Arc<PostgresStore>,
) -> AppResult<HiddenSkillMaintenance<PostgresStore>> {
    let governor = GovernorBuilder::new(config.clone())?.build(&TokioSpawner::current());
    Ok(HiddenSkillMaintenance::new(
        Arc::clone(store),
        governor,
        config.registration_url.clone(),
    ))
}

async fn run_hidden(
    config: &RegistryConfig,
    store: &Arc<PostgresStore>,
    action: HiddenAction,
    dry_run: bool,
) -> AppResult<()> {
    let maintenance = maintenance(config, store)?;
    let holders = maintenance.holders_with_hidden_skills().await?;
    tracing::info!("{} student(s) hold hidden skills", holders.len());
    for holder in &holders {
        let skills: Vec<&str> = holder.hidden_skills.iter().map(|(_, d)| d.as_str()).collect();
        tracing::info!(
            "{} ({}) <{}>: {}",
            holder.name,
            holder.matric_number,
            holder.email.as_deref().unwrap_or("no email"),
            skills.join(", ")
        );
    }

    if matches!(action, HiddenAction::Notify | HiddenAction::All) {
        maintenance.notify_holders(&holders, dry_run).await?;
    }
    if matches!(action, HiddenAction::Release | HiddenAction::All) {
        if dry_run {
            tracing::info!("[dry run] would release hidden skills from {} student(s)", holders.len());
        } else {
            let report = maintenance.release_hidden_skills().await?;
            tracing::info!(
                "released hidden skills from {} student(s): {:?}",
                report.holders_updated,
                report.decrements
            );
            if !report.failed.is_empty() {
                bail!(
                    "release failed for {} student(s): {}; run again to retry",
                    report.failed.len(),
                    report.failed.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn confirm(yes: bool, command: &str) -> AppResult<()> {
    if !yes {
        bail!("{command} deletes data; pass --yes to confirm");
    }
    Ok(())
}
