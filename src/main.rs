use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

use liftrs::config::AppConfig;
use liftrs::field_update::decode_payload;
use liftrs::logging::{init_logging, LogLevel};
use liftrs::models::{TrainingDay, User};
use liftrs::notify::LogNotifier;
use liftrs::service::{NewPlan, TrainingService};
use liftrs::store::{DocumentStore, SqliteStore};

/// liftrs - Strength Training Plan CLI
///
/// Manage periodized training plans, apply partial edits the way the editing
/// client sends them, and run week-over-week RPE progression.
#[derive(Parser)]
#[command(name = "liftrs")]
#[command(author = "liftrs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Strength Training Plan CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode field identifiers without touching any plan
    Decode {
        /// Week the payload is sent for (0-based)
        #[arg(short, long, default_value = "0")]
        week: usize,

        /// Identifiers, optionally with a value: day1_exercise1_weight=100
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Import a user document (JSON) into the database
    Import {
        /// Input file path
        #[arg(short = 'f', long)]
        user_file: PathBuf,
    },

    /// Export a user document as JSON
    Export {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored users
    Users,

    /// Create a plan for a user
    CreatePlan {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        title: String,

        /// Training days per week (1-9)
        #[arg(short, long, default_value = "3")]
        frequency: usize,

        /// Number of weeks
        #[arg(short, long, default_value = "4")]
        weeks: usize,

        /// Copy the structure of an existing plan
        #[arg(long)]
        template: Option<String>,
    },

    /// Apply a partial update to one training day
    Update {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        plan: String,

        /// Week index (0-based)
        #[arg(short, long)]
        week: usize,

        /// Day index (0-based)
        #[arg(short, long)]
        day: usize,

        /// Entries as FIELD=VALUE
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Display a plan's training days
    Show {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        plan: String,

        /// Only show this week (0-based)
        #[arg(short, long)]
        week: Option<usize>,
    },

    /// Run automatic RPE progression over a plan
    Progress {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        plan: String,

        /// RPE increase per week (config default if omitted)
        #[arg(short, long)]
        rpe_increase: Option<Decimal>,

        /// Turn the last week into a deload week
        #[arg(long)]
        deload: bool,
    },

    /// Configure application settings
    Config {
        /// Write a default config file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Tabled)]
struct ExerciseRow {
    #[tabled(rename = "Week")]
    week: usize,
    #[tabled(rename = "Day")]
    day: usize,
    #[tabled(rename = "#")]
    ordinal: usize,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Exercise")]
    name: String,
    #[tabled(rename = "Sets x Reps")]
    volume: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Target RPE")]
    target_rpe: String,
    #[tabled(rename = "Actual RPE")]
    actual_rpe: String,
}

/// Decode entries may omit the value; updates may not
fn parse_identifiers(fields: &[String]) -> HashMap<String, String> {
    fields
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((field, value)) => (field.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn parse_fields(fields: &[String]) -> Result<HashMap<String, String>> {
    fields
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((field, value)) => Ok((field.to_string(), value.to_string())),
            None => bail!("Expected FIELD=VALUE, got '{}'", entry),
        })
        .collect()
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };
    if let Some(database) = &cli.database {
        config.storage.database_path = database.clone();
    }
    if cli.verbose > 0 {
        config.logging.level = LogLevel::from_verbosity(cli.verbose);
    }
    Ok(config)
}

fn day_rows(week: usize, day_index: usize, day: &TrainingDay) -> Vec<ExerciseRow> {
    day.exercises
        .iter()
        .enumerate()
        .map(|(i, exercise)| ExerciseRow {
            week: week + 1,
            day: day_index + 1,
            ordinal: i + 1,
            category: exercise.category.to_string(),
            name: exercise.exercise_name.clone(),
            volume: format!("{} x {}", exercise.sets, exercise.reps),
            weight: exercise.weight.clone(),
            target_rpe: exercise
                .target_rpe
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            actual_rpe: exercise
                .actual_rpe
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
        .collect()
}

fn print_table(rows: Vec<ExerciseRow>) {
    if rows.is_empty() {
        println!("{}", "No exercises".dimmed());
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    if let Commands::Decode { week, fields } = &cli.command {
        let payload = parse_identifiers(fields);
        let updates = decode_payload(*week, &payload)?;
        println!("{}", "Decoded field updates (application order):".green().bold());
        for update in updates {
            println!(
                "  week {} day {} exercise {} {:<26} {:?}",
                update.id.week + 1,
                update.id.day + 1,
                update.id.exercise,
                update.id.attribute.suffix(),
                update.change
            );
        }
        return Ok(());
    }

    if let Commands::Config { init, show } = &cli.command {
        if *init {
            let mut config = AppConfig::default();
            config.save_default()?;
            println!(
                "{} {}",
                "✓ Wrote default config to".green(),
                AppConfig::default_config_path().display()
            );
        }
        if *show || !*init {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        return Ok(());
    }

    let sqlite = Arc::new(
        SqliteStore::open(&config.storage.database_path).with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.database_path.display()
            )
        })?,
    );
    let store: Arc<dyn DocumentStore> = sqlite.clone();
    let service = TrainingService::start(&config, Arc::clone(&store), Arc::new(LogNotifier));

    match cli.command {
        Commands::Import { user_file } => {
            let content = std::fs::read_to_string(&user_file)
                .with_context(|| format!("Failed to read {}", user_file.display()))?;
            let user: User = serde_json::from_str(&content)
                .with_context(|| format!("Invalid user document in {}", user_file.display()))?;
            store.update(&user).await?;
            println!(
                "{} {} ({} plans)",
                "✓ Imported user".green(),
                user.username.bold(),
                user.training_plans.len()
            );
        }

        Commands::Export { user, output } => {
            let user = store.find_user_by_id(&user).await?;
            let json = serde_json::to_string_pretty(&user)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} {}", "✓ Exported to".yellow(), path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Users => {
            for (id, username) in sqlite.list_users().await? {
                println!("{}  {}", id.dimmed(), username);
            }
        }

        Commands::CreatePlan {
            user,
            title,
            frequency,
            weeks,
            template,
        } => {
            let plan = service
                .create_plan(
                    &user,
                    NewPlan {
                        title,
                        training_frequency: frequency,
                        week_count: weeks,
                        template_plan_id: template,
                    },
                )
                .await?;
            println!("{} {} ({})", "✓ Created plan".green(), plan.title.bold(), plan.id);
        }

        Commands::Update {
            user,
            plan,
            week,
            day,
            fields,
        } => {
            let payload = parse_fields(&fields)?;
            let updated = match service
                .apply_partial_update(&user, &plan, week, day, &payload)
                .await
            {
                Ok(updated) => updated,
                Err(err) if err.is_client_error() => bail!(err.user_message()),
                Err(err) => return Err(err.into()),
            };
            print_table(day_rows(week, day, &updated));
            if updated.recording {
                println!(
                    "{}",
                    "Session recording started; it is tracked while this process runs.".cyan()
                );
            }
        }

        Commands::Show { user, plan, week } => {
            let user = store.find_user_by_id(&user).await?;
            let plan = user
                .plan(&plan)
                .with_context(|| format!("Plan {} not found", plan))?;
            println!("{}", plan.title.bold());

            let rows = plan
                .weeks
                .iter()
                .enumerate()
                .filter(|(w, _)| week.map_or(true, |only| only == *w))
                .flat_map(|(w, training_week)| {
                    training_week
                        .days
                        .iter()
                        .enumerate()
                        .flat_map(move |(d, day)| day_rows(w, d, day))
                })
                .collect();
            print_table(rows);
        }

        Commands::Progress {
            user,
            plan,
            rpe_increase,
            deload,
        } => {
            let options = config.progression.options(rpe_increase, deload);
            let report = service.run_auto_progression(&user, &plan, options).await?;
            println!("{}", "✓ Progression applied".blue().bold());
            println!("  Adjusted: {}", report.adjusted);
            println!("  Deloaded: {}", report.deloaded);
            println!(
                "  Skipped:  {} (different exercise), {} (unparsable), {} (no target)",
                report.skipped_mismatch, report.skipped_unparsable, report.skipped_empty
            );
        }

        Commands::Decode { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}
