//! Command-line driver for the note graph index.
//!
//! # Responsibility
//! - `backfill`: rebuild every scope in a database (offline driver).
//! - `rebuild`: rebuild one scope or one note.
//! - `bench`: seed a synthetic scope and compare naive vs indexed reads.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use notegraph_core::db::{open_db, open_db_in_memory};
use notegraph_core::{
    backfill_all_scopes, default_log_level, init_logging, run_benchmark, seed_synthetic_scope,
    LinkMaterializer, MaterializeOptions, RebuildTarget, SeedPlan, SqliteLinkRepository,
    SqliteNoteRepository,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "notegraph", version, about = "Wikilink graph index tooling")]
struct Cli {
    /// Log level: trace|debug|info|warn|error.
    #[arg(
        long,
        env = "NOTEGRAPH_LOG_LEVEL",
        default_value_t = default_log_level().to_string(),
        global = true
    )]
    log_level: String,
    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, env = "NOTEGRAPH_LOG_DIR", global = true)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage info.
    Ping,
    /// Rebuild the materialized graph for every scope.
    Backfill {
        #[arg(long)]
        db: PathBuf,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Rebuild one scope or the outbound links of one note.
    Rebuild {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, conflicts_with = "note", required_unless_present = "note")]
        scope: Option<Uuid>,
        #[arg(long)]
        note: Option<Uuid>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Compare naive recomputation with indexed reads on a synthetic scope.
    Bench(BenchArgs),
}

#[derive(Args)]
struct WriteArgs {
    /// Edges written per insert transaction.
    #[arg(long, default_value_t = notegraph_core::service::materializer::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[derive(Args)]
struct BenchArgs {
    /// Database file; an in-memory database is used when omitted.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Benchmark an existing scope instead of seeding a new one.
    #[arg(long)]
    scope: Option<Uuid>,
    #[arg(long, default_value_t = 5_000)]
    notes: usize,
    #[arg(long, default_value_t = 10_000)]
    references: usize,
    /// Filler paragraphs per note, to inflate content volume.
    #[arg(long, default_value_t = 0)]
    filler: usize,
    #[arg(long, default_value_t = 1)]
    warmup: usize,
    #[arg(long, default_value = "bench@notegraph.local")]
    email: String,
    #[command(flatten)]
    write: WriteArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(log_dir) = cli.log_dir.as_deref() {
        init_logging(&cli.log_level, log_dir)
            .map_err(anyhow::Error::msg)
            .context("failed to initialize logging")?;
    }

    match cli.command {
        Commands::Ping => {
            println!("notegraph_core ping={}", notegraph_core::ping());
            println!("notegraph_core version={}", notegraph_core::core_version());
            Ok(())
        }
        Commands::Backfill { db, write } => backfill(&db, &write),
        Commands::Rebuild {
            db,
            scope,
            note,
            write,
        } => {
            let target = match (scope, note) {
                (Some(scope), None) => RebuildTarget::Scope(scope),
                (None, Some(note)) => RebuildTarget::Note(note),
                _ => bail!("exactly one of --scope or --note is required"),
            };
            rebuild(&db, target, &write)
        }
        Commands::Bench(args) => bench(&args),
    }
}

fn open(path: &Path) -> Result<Connection> {
    open_db(path).with_context(|| format!("failed to open database `{}`", path.display()))
}

fn materializer<'a>(
    conn: &'a Connection,
    write: &WriteArgs,
) -> Result<LinkMaterializer<SqliteNoteRepository<'a>, SqliteLinkRepository<'a>>> {
    Ok(LinkMaterializer::new(
        SqliteNoteRepository::try_new(conn)?,
        SqliteLinkRepository::try_new(conn)?,
    )
    .with_options(MaterializeOptions::with_chunk_size(write.chunk_size)))
}

fn backfill(db: &Path, write: &WriteArgs) -> Result<()> {
    let conn = open(db)?;
    let materializer = materializer(&conn, write)?;
    let summary = backfill_all_scopes(&materializer).context("failed to list scopes")?;

    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "[backfill] scope={} sources={} edges={} duration_ms={}",
                outcome.scope, report.sources, report.edges_inserted, report.duration_ms
            ),
            Err(err) => eprintln!("[backfill] scope={} error={err}", outcome.scope),
        }
    }
    println!(
        "[backfill] scopes={} succeeded={} failed={} edges={}",
        summary.outcomes.len(),
        summary.succeeded(),
        summary.failed(),
        summary.edges_inserted()
    );

    if summary.failed() > 0 {
        bail!(
            "{} scope(s) failed; re-run backfill to converge",
            summary.failed()
        );
    }
    Ok(())
}

fn rebuild(db: &Path, target: RebuildTarget, write: &WriteArgs) -> Result<()> {
    let conn = open(db)?;
    let report = materializer(&conn, write)?
        .rebuild(target)
        .context("rebuild failed; re-run to converge")?;
    println!(
        "[rebuild] scope={} sources={} deleted={} inserted={} chunks={} duration_ms={}",
        report.scope,
        report.sources,
        report.edges_deleted,
        report.edges_inserted,
        report.chunks,
        report.duration_ms
    );
    Ok(())
}

fn bench(args: &BenchArgs) -> Result<()> {
    let conn = match &args.db {
        Some(path) => open(path)?,
        None => open_db_in_memory().context("failed to open in-memory database")?,
    };

    let (scope, references) = match args.scope {
        Some(scope) => (scope, None),
        None => {
            eprintln!("Seeding dataset...");
            let plan = SeedPlan {
                email: args.email.clone(),
                notes: args.notes,
                references: args.references,
                filler_paragraphs: args.filler,
            };
            let seeded = seed_synthetic_scope(&conn, &plan)?;
            (seeded.scope, Some(seeded.references))
        }
    };

    eprintln!("Running timed benchmark...");
    let report = run_benchmark(
        &conn,
        scope,
        MaterializeOptions::with_chunk_size(args.write.chunk_size),
        args.warmup,
    )?;

    let output = json!({
        "scope": scope,
        "references": references,
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !report.edge_sets_match {
        bail!("naive and indexed edge sets differ; force a rebuild and investigate");
    }
    Ok(())
}
