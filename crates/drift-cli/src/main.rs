//! drift CLI
//!
//! Command-line front end for the snapshot diff engine: load two schema
//! snapshot JSON files, compute the migration plan, and print or write
//! the SQL.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drift_core::prelude::*;

/// Schema snapshot diffing and DDL generation.
#[derive(Parser)]
#[command(name = "drift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two snapshots and emit the migration SQL.
    Diff {
        /// Path to the previous snapshot JSON.
        #[arg(long, env = "DRIFT_PREV")]
        prev: PathBuf,

        /// Path to the current snapshot JSON.
        #[arg(long, env = "DRIFT_CURR")]
        curr: PathBuf,

        /// Whether the plan targets a migration file or a direct apply.
        #[arg(long, value_enum, default_value_t = Mode::Generate)]
        mode: Mode,

        /// Rename detection strategy.
        #[arg(long, value_enum, default_value_t = Strategy::Structural)]
        resolve: Strategy,

        /// Directory to write the migration file into (stdout if unset).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Validate a snapshot file.
    Check {
        /// Path to the snapshot JSON.
        file: PathBuf,
    },
}

/// How the generated plan will be consumed.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Generate a reviewable migration file.
    Generate,
    /// Apply directly; unsafe alterations are skipped.
    Push,
}

impl From<Mode> for ApplyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Generate => Self::Generate,
            Mode::Push => Self::Push,
        }
    }
}

/// Rename detection strategy.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Treat every ambiguity as an independent create + delete.
    None,
    /// Pair entities with identical structure as renames.
    Structural,
}

fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    Snapshot::from_json(&json)
        .with_context(|| format!("parsing snapshot {}", path.display()))
}

async fn plan_diff(
    prev: &Snapshot,
    curr: &Snapshot,
    strategy: Strategy,
    mode: ApplyMode,
) -> drift_core::error::Result<Plan> {
    match strategy {
        Strategy::None => diff_snapshots(prev, curr, &mut NoopResolver, mode).await,
        Strategy::Structural => diff_snapshots(prev, curr, &mut StructuralResolver, mode).await,
    }
}

fn write_migration(out_dir: &Path, sql: &[String]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let name = format!("{}_migration.sql", Utc::now().format("%Y%m%d%H%M%S"));
    let path = out_dir.join(name);
    let mut contents = sql.join("\n");
    contents.push('\n');
    std::fs::write(&path, contents)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diff {
            prev,
            curr,
            mode,
            resolve,
            out,
        } => {
            let prev = load_snapshot(&prev)?;
            let curr = load_snapshot(&curr)?;
            let plan = plan_diff(&prev, &curr, resolve, mode.into()).await?;

            if plan.is_empty() {
                info!("No schema changes detected");
                return Ok(());
            }
            info!(
                statements = plan.statements.len(),
                sql = plan.sql.len(),
                "plan computed"
            );
            match out {
                Some(dir) => {
                    let path = write_migration(&dir, &plan.sql)?;
                    info!("Wrote {}", path.display());
                }
                None => {
                    for statement in &plan.sql {
                        println!("{statement}");
                    }
                }
            }
        }
        Commands::Check { file } => {
            let snapshot = load_snapshot(&file)?;
            info!(
                dialect = %snapshot.dialect,
                tables = snapshot.tables.len(),
                "snapshot is valid"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dialect: Dialect) -> Snapshot {
        Snapshot::new(dialect).table(
            Table::new("users", if dialect == Dialect::Postgres { "public" } else { "" })
                .column(Column::new("id", "bigint").primary_key()),
        )
    }

    #[tokio::test]
    async fn plan_diff_with_both_strategies() {
        let prev = sample(Dialect::Postgres);
        let curr = Snapshot::new(Dialect::Postgres).table(
            Table::new("users", "public")
                .column(Column::new("id", "bigint").primary_key())
                .column(Column::new("email", "text")),
        );
        for strategy in [Strategy::None, Strategy::Structural] {
            let plan = plan_diff(&prev, &curr, strategy, ApplyMode::Generate)
                .await
                .unwrap();
            assert_eq!(plan.sql.len(), 1);
        }
    }

    #[test]
    fn load_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = sample(Dialect::Sqlite);
        std::fs::write(&path, snapshot.to_json().unwrap()).unwrap();
        assert_eq!(load_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn load_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{\"version\": 1}").unwrap();
        assert!(load_snapshot(&path).is_err());
    }

    #[test]
    fn write_migration_creates_a_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_migration(dir.path(), &["SELECT 1;".to_string()]).unwrap();
        assert!(path.extension().is_some_and(|e| e == "sql"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "SELECT 1;\n");
    }
}
