#![forbid(unsafe_code)]
//! Command-line front end for the AttendChain ledger.

use attendchain::blockchain::{AnchorMode, ValidationReport};
use attendchain::config::{load_config, load_config_from};
use attendchain::entity::{Entity, EntityKind};
use attendchain::payload::AttendanceStatus;
use attendchain::persistence::open_store;
use attendchain::registry::LedgerRegistry;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "attendchain", version, about = "Tamper-evident attendance ledger")]
struct Cli {
    /// Path to the TOML config file (defaults to ./attendchain.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage departments
    Dept {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Manage classes
    Class {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Manage students
    Student {
        #[command(subcommand)]
        action: StudentAction,
    },
    /// Record or inspect attendance
    Attend {
        #[command(subcommand)]
        action: AttendAction,
    },
    /// List entities of one kind
    List {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Print an entity's chain
    Show {
        #[arg(value_enum)]
        kind: KindArg,
        id: String,
    },
    /// Re-verify every chain and anchor
    Validate {
        /// Override the configured anchor mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Create; classes need --parent <department id>
    Add {
        name: String,
        #[arg(long)]
        parent: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum StudentAction {
    Add {
        name: String,
        #[arg(long)]
        roll: String,
        #[arg(long)]
        class: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        roll: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum AttendAction {
    Mark {
        student: String,
        #[arg(value_enum)]
        status: StatusArg,
        /// Day in YYYY-MM-DD form (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    History {
        student: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Dept,
    Class,
    Student,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Dept => EntityKind::Department,
            KindArg::Class => EntityKind::Class,
            KindArg::Student => EntityKind::Student,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Present,
    Absent,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Snapshot,
    LiveTip,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let registry = LedgerRegistry::new(open_store(&config.storage)?, &config.ledger);

    match cli.command {
        Command::Dept { action } => node_action(&registry, EntityKind::Department, action)?,
        Command::Class { action } => node_action(&registry, EntityKind::Class, action)?,
        Command::Student { action } => match action {
            StudentAction::Add { name, roll, class } => {
                print_created(&registry.create_student(&name, &roll, &class)?);
            }
            StudentAction::Update { id, name, roll } => {
                let student = registry.update_student(&id, name.as_deref(), roll.as_deref())?;
                print_appended(&student);
            }
            StudentAction::Delete { id } => print_appended(&registry.delete(EntityKind::Student, &id)?),
        },
        Command::Attend { action } => match action {
            AttendAction::Mark { student, status, date } => {
                let status = match status {
                    StatusArg::Present => AttendanceStatus::Present,
                    StatusArg::Absent => AttendanceStatus::Absent,
                };
                let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
                let block = registry.mark_attendance(&student, status, &date)?;
                println!("{} block #{} {}", "✅ Recorded".green().bold(), block.index, block.hash.dimmed());
            }
            AttendAction::History { student } => {
                let mut table = table(&["Date", "Status", "Roll", "Class"]);
                for record in registry.attendance_history(&student)? {
                    let color = match record.status {
                        AttendanceStatus::Present => TableColor::Green,
                        AttendanceStatus::Absent => TableColor::Red,
                    };
                    table.add_row(vec![
                        Cell::new(&record.date),
                        Cell::new(record.status).fg(color),
                        Cell::new(&record.roll_no),
                        Cell::new(&record.class_id),
                    ]);
                }
                println!("{table}");
            }
        },
        Command::List { kind } => {
            let mut table = table(&["Id", "Name", "Parent", "Blocks", "State"]);
            for entity in registry.list(kind.into())? {
                let state = if entity.deleted { Cell::new("deleted").fg(TableColor::Red) } else { Cell::new("live") };
                table.add_row(vec![
                    Cell::new(&entity.id),
                    Cell::new(&entity.name),
                    Cell::new(entity.parent_id.as_deref().unwrap_or("-")),
                    Cell::new(entity.chain.len()),
                    state,
                ]);
            }
            println!("{table}");
        }
        Command::Show { kind, id } => {
            let entity = registry.get(kind.into(), &id)?;
            let mut table = table(&["#", "Type", "Prev", "Hash", "Nonce"]);
            for block in entity.chain.blocks() {
                table.add_row(vec![
                    Cell::new(block.index),
                    Cell::new(block.payload_type().unwrap_or("?")),
                    Cell::new(short(&block.prev_hash)),
                    Cell::new(short(&block.hash)),
                    Cell::new(block.nonce),
                ]);
            }
            println!("{} {} ({})", "⛓️ ".bright_cyan(), entity.name.bold(), entity.id);
            println!("{table}");
        }
        Command::Validate { mode } => {
            let mode = mode.map(|m| match m {
                ModeArg::Snapshot => AnchorMode::Snapshot,
                ModeArg::LiveTip => AnchorMode::LiveTip,
            });
            let report = registry.validate_all_with(mode.unwrap_or(registry.anchor_mode()))?;
            print_report(&report);
            if !report.overall {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

fn node_action(registry: &LedgerRegistry, kind: EntityKind, action: NodeAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        NodeAction::Add { name, parent } => {
            let entity = match (kind, parent) {
                (EntityKind::Department, _) => registry.create_department(&name)?,
                (_, Some(parent)) => registry.create_class(&name, &parent)?,
                (_, None) => return Err("a class needs --parent <department id>".into()),
            };
            print_created(&entity);
        }
        NodeAction::Rename { id, name } => print_appended(&registry.rename(kind, &id, &name)?),
        NodeAction::Delete { id } => print_appended(&registry.delete(kind, &id)?),
    }
    Ok(())
}

fn print_created(entity: &Entity) {
    println!("{} {} {}", "✅ Created".green().bold(), entity.kind, entity.id.bright_white());
    println!("   genesis {}", entity.chain.genesis_block().hash.dimmed());
    println!("   anchor  {}", entity.chain.genesis_block().prev_hash.dimmed());
}

fn print_appended(entity: &Entity) {
    let tip = entity.chain.tip();
    println!("{} {} {} block #{} {}", "✅ Sealed".green().bold(), entity.kind, entity.id, tip.index, tip.hash.dimmed());
}

fn print_report(report: &ValidationReport) {
    let mut table = table(&["Kind", "Id", "Name", "Chain", "Anchor", "Fault"]);
    for row in &report.entities {
        let chain = if row.chain_valid { Cell::new("ok").fg(TableColor::Green) } else { Cell::new("FAIL").fg(TableColor::Red) };
        let anchor = match row.anchor_valid {
            None => Cell::new("root"),
            Some(true) => Cell::new("ok").fg(TableColor::Green),
            Some(false) => Cell::new("FAIL").fg(TableColor::Red),
        };
        table.add_row(vec![
            Cell::new(row.kind),
            Cell::new(&row.id),
            Cell::new(&row.name),
            chain,
            anchor,
            Cell::new(row.fault.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
    if report.overall {
        println!("{}", format!("🔒 Ledger intact ({:?} anchors)", report.mode).green().bold());
    } else {
        let failed = report.failures().count();
        println!("{}", format!("⚠️  {} entities failed integrity checks", failed).red().bold());
    }
}

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

/// Abbreviate a stored hash for display. Stored values are untrusted, so
/// this counts characters rather than slicing bytes.
fn short(hash: &str) -> String {
    if hash.chars().count() > 16 {
        format!("{}…", hash.chars().take(12).collect::<String>())
    } else {
        hash.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::short;

    #[test]
    fn short_abbreviates_hex_digests() {
        let hash = "0000abcdef0123456789abcdef0123456789abcdef0123456789abcdef012345";
        assert_eq!(short(hash), "0000abcdef01…");
        assert_eq!(short("0"), "0");
    }

    #[test]
    fn short_survives_multibyte_tampered_values() {
        let forged = "ééééééééééééééééééé";
        assert_eq!(short(forged), format!("{}…", "é".repeat(12)));
    }
}
