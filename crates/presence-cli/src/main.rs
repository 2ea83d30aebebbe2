use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use presence_core::{EventType, Identity, Method, PresenceEvent, RosterProvider};
use presence_store::{AttendanceRecord, SqliteAttendanceStore, SqliteRoster};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    /// Database path (default: $PRESENCE_DB_PATH or ~/.local/share/presence/attendance.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show attendance for one day
    Report {
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Export all attendance records as JSON lines
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage registered identities
    Roster {
        #[command(subcommand)]
        command: RosterCommands,
    },
    /// Insert a sample attendance record to check the database
    Sample,
}

#[derive(Subcommand)]
enum RosterCommands {
    /// List registered identities
    List,
    /// Register a new identity
    Add {
        /// Full name
        #[arg(short, long)]
        name: String,
        /// Roll number
        #[arg(short, long)]
        roll: i64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .or_else(|| std::env::var("PRESENCE_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(presence_store::default_db_path);

    match cli.command {
        Commands::Report { date } => {
            let store = open_store(&db_path)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let records = store.records_on(date)?;
            if records.is_empty() {
                println!("No attendance recorded on {date}");
            } else {
                print_report(&records);
            }
        }
        Commands::Export { output } => {
            let store = open_store(&db_path)?;
            let count = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    store.export_json_lines(std::io::BufWriter::new(file))?
                }
                None => store.export_json_lines(std::io::stdout().lock())?,
            };
            tracing::info!(count, "exported attendance records");
        }
        Commands::Roster { command } => {
            let roster = SqliteRoster::open(&db_path)
                .with_context(|| format!("opening roster at {}", db_path.display()))?;
            match command {
                RosterCommands::List => {
                    let identities = roster.identities()?;
                    if identities.is_empty() {
                        println!("No identities registered");
                    }
                    for identity in identities {
                        println!("{:>10}  {}", identity.external_id, identity.name);
                    }
                }
                RosterCommands::Add { name, roll } => {
                    let identity = Identity::new(name, roll);
                    roster.register(&identity)?;
                    println!("Registered {} ({})", identity.name, identity.external_id);
                }
            }
        }
        Commands::Sample => {
            let store = open_store(&db_path)?;
            let event = PresenceEvent::new(
                Identity::new("Dev Mishra", 22053596),
                22053596,
                EventType::Entry,
                Method::ManualId,
                Local::now().timestamp_millis(),
            );
            store.record(&event)?;
            println!("Sample record inserted: {}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}

fn open_store(path: &std::path::Path) -> Result<SqliteAttendanceStore> {
    SqliteAttendanceStore::open(path)
        .with_context(|| format!("opening attendance store at {}", path.display()))
}

fn print_report(records: &[AttendanceRecord]) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{:<6} {:<24} {:>10}  {:<6} {}", "TIME", "NAME", "ROLL", "EVENT", "METHOD");
    for r in records {
        let _ = writeln!(
            out,
            "{:<6} {:<24} {:>10}  {:<6} {}",
            r.time, r.name, r.roll_number, r.event_type, r.method
        );
    }
}
