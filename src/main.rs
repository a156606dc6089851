//! vitalsim command-line entry point.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitalsim::config;
use vitalsim::db::{count_eligible_subjects, eligible_subject_bounds, open_database, SubjectRange};
use vitalsim::simulation::{runner::default_now, seed_demo_cohort, SimulationConfig, SimulationRunner};

#[derive(Parser, Debug)]
#[command(name = "vitalsim", version, about = "Synthetic wearable vital-sign generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate readings for every eligible subject
    Generate(GenerateArgs),
    /// Delete generated readings
    Clear {
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Populate the cohort tables with synthetic subjects and devices
    SeedCohort {
        #[command(flatten)]
        database: DatabaseArgs,
        /// Number of subjects to create
        #[arg(long)]
        subjects: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct DatabaseArgs {
    /// SQLite database path (default: ~/Vitalsim/vitalsim.db)
    #[arg(long)]
    database: Option<PathBuf>,
}

impl DatabaseArgs {
    fn path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(config::default_database_path)
    }
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// First subject id (inclusive)
    #[arg(long, requires = "to_subject")]
    from_subject: Option<i64>,
    /// Last subject id (inclusive)
    #[arg(long, requires = "from_subject")]
    to_subject: Option<i64>,
}

impl RangeArgs {
    fn range(&self) -> Option<SubjectRange> {
        match (self.from_subject, self.to_subject) {
            (Some(from), Some(to)) => Some(SubjectRange { from, to }),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    #[command(flatten)]
    range: RangeArgs,
    /// JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Days of history to generate
    #[arg(long)]
    days: Option<u32>,
    /// Readings per committed batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Clear readings in scope before generating
    #[arg(long)]
    clear_first: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Generation threads
    #[arg(long)]
    workers: Option<usize>,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl GenerateArgs {
    fn simulation_config(&self) -> anyhow::Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_config_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(days) = self.days {
            config.history_days = days;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(range) = self.range.range() {
            config.subject_range = Some(range);
        }
        if self.clear_first {
            config.clear_first = true;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so --json output stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Generate(args) => generate(args).await,
        Commands::Clear { database, range } => {
            let path = database.path();
            let removed = tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
                let conn = open_database(&path)
                    .with_context(|| format!("opening {}", path.display()))?;
                let config = SimulationConfig { subject_range: range.range(), ..Default::default() };
                config.validate()?;
                Ok(SimulationRunner::sqlite(config).clear(&conn)?)
            })
            .await??;
            println!("Removed {removed} readings");
            Ok(())
        }
        Commands::SeedCohort { database, subjects, seed } => {
            let path = database.path();
            let (created, eligible, bounds) = tokio::task::spawn_blocking(
                move || -> anyhow::Result<(usize, i64, Option<SubjectRange>)> {
                    let conn = open_database(&path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    let mut rng = match seed {
                        Some(s) => StdRng::seed_from_u64(s),
                        None => StdRng::from_entropy(),
                    };
                    let ids = seed_demo_cohort(&conn, subjects, default_now(), &mut rng)?;
                    Ok((ids.len(), count_eligible_subjects(&conn)?, eligible_subject_bounds(&conn)?))
                },
            )
            .await??;
            match bounds {
                Some(ids) => println!(
                    "Created {created} subjects ({eligible} eligible in total, ids {}-{})",
                    ids.from, ids.to
                ),
                None => println!("Created {created} subjects ({eligible} eligible in total)"),
            }
            Ok(())
        }
    }
}

async fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let config = args.simulation_config()?;
    let path = args.database.path();
    let json = args.json;

    let mut runner = SimulationRunner::sqlite(config);
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let conn = open_database(&path).with_context(|| format!("opening {}", path.display()))?;
        if let Some(ids) = eligible_subject_bounds(&conn)? {
            tracing::info!(
                eligible = count_eligible_subjects(&conn)?,
                from = ids.from,
                to = ids.to,
                "Eligible subject ids"
            );
        }
        Ok(runner.run(&conn, None)?)
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
