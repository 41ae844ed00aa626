//! codex-mem CLI
//!
//! Append memories and conversation turns, search them, and keep the
//! semantic index filled.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codex_mem::index::{backfill_memories, backfill_turns, open_index, sync_record, SemanticIndex};
use codex_mem::search::{MemoryKind, SearchConfig, SearchOrchestrator, TurnKind};
use codex_mem::storage::queries::{create_memory, create_turn, lenient_json_map, strict_json_map};
use codex_mem::storage::{open_store, RelationalStore};
use codex_mem::types::*;
use codex_mem::{MemError, Settings};

#[derive(Parser)]
#[command(name = "codex-mem")]
#[command(about = "Project-scoped memory and conversation store with hybrid search")]
#[command(version)]
struct Cli {
    /// Data directory (settings, SQLite database, vector index)
    #[arg(long, env = "CODEX_MEM_DATA_DIR", global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the relational schema
    Init,
    /// Record a memory
    Add {
        #[arg(long)]
        project: String,
        /// Summary text (read from stdin when omitted)
        #[arg(long)]
        summary: Option<String>,
        #[arg(long, default_value = "")]
        details: String,
        /// Category (defaults to "discovery")
        #[arg(long = "type")]
        memory_type: Option<String>,
        #[arg(long, default_value = "")]
        tags: String,
        /// Concept (repeatable)
        #[arg(long = "concept")]
        concepts: Vec<String>,
        /// File read (repeatable)
        #[arg(long = "file-read")]
        files_read: Vec<String>,
        /// File modified (repeatable)
        #[arg(long = "file-modified")]
        files_modified: Vec<String>,
        /// Metadata; non-object JSON is kept under "raw"
        #[arg(long, default_value = "")]
        meta: String,
    },
    /// Search memories
    Search {
        #[arg(long)]
        project: String,
        /// Free text query
        #[arg(long)]
        q: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// auto, relational (sqlite), semantic (chroma) or hybrid
        #[arg(long, default_value = "auto")]
        strategy: String,
        #[arg(long = "type")]
        memory_type: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        concept: Option<String>,
        #[arg(long)]
        file: Option<String>,
        /// Lower bound (epoch seconds or ISO-8601)
        #[arg(long)]
        since: Option<String>,
        /// Upper bound; a bare date covers the whole day
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Record a conversation turn
    TurnAdd {
        #[arg(long)]
        project: String,
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        role: Role,
        /// Turn content (read from stdin when omitted)
        #[arg(long)]
        content: Option<String>,
        /// JSON object
        #[arg(long, default_value = "")]
        context: String,
        /// JSON object
        #[arg(long, default_value = "")]
        meta: String,
    },
    /// Search conversation turns
    TurnSearch {
        #[arg(long)]
        project: String,
        #[arg(long)]
        q: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value = "auto")]
        strategy: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Re-index memories into the semantic index
    Backfill {
        #[arg(long)]
        project: Option<String>,
        /// Most recent N memories (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Re-index conversation turns into the semantic index
    TurnBackfill {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

/// JSON shape of search output
#[derive(Serialize)]
struct SearchOutput<'a, R> {
    strategy_used: SearchStrategy,
    used_semantic_index: bool,
    fell_back: bool,
    count: usize,
    records: &'a [R],
}

impl<'a, R> From<&'a SearchResult<R>> for SearchOutput<'a, R> {
    fn from(result: &'a SearchResult<R>) -> Self {
        Self {
            strategy_used: result.strategy_used,
            used_semantic_index: result.used_semantic_index,
            fell_back: result.fell_back,
            count: result.count(),
            records: &result.records,
        }
    }
}

struct App {
    store: Arc<dyn RelationalStore>,
    index: Arc<dyn SemanticIndex>,
    config: SearchConfig,
}

impl App {
    fn open(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings.database_url();
        let store = open_store(&url).with_context(|| "opening the relational store")?;
        let index = open_index(settings);
        tracing::debug!(store = %store.describe(), index = %index.describe(), "Opened stores");
        Ok(Self {
            store,
            index,
            config: SearchConfig::from_settings(settings),
        })
    }

    fn orchestrator(&self) -> SearchOrchestrator {
        SearchOrchestrator::new(self.store.clone(), self.index.clone(), self.config.clone())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.data_dir.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    // Logs go to stderr; stdout carries results
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false),
        )
        .with(filter)
        .init();

    match run(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e.downcast_ref::<MemError>().map_or(1, MemError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

fn load_settings(data_dir: Option<&str>) -> codex_mem::Result<Settings> {
    let settings = match data_dir {
        Some(dir) => {
            let dir = std::path::PathBuf::from(shellexpand::tilde(dir).to_string());
            Settings::load_from(&dir, |key| std::env::var(key).ok())?
        }
        None => Settings::load()?,
    };
    settings.validate()?;
    Ok(settings)
}

fn run(command: Commands, settings: &Settings) -> anyhow::Result<()> {
    let app = App::open(settings)?;

    match command {
        Commands::Init => {
            app.store.init_schema()?;
            tracing::info!("Schema ready at {}", app.store.describe());
            println!("Initialized {} schema", app.store.dialect());
        }

        Commands::Add {
            project,
            summary,
            details,
            memory_type,
            tags,
            concepts,
            files_read,
            files_modified,
            meta,
        } => {
            let summary = text_or_stdin(summary, "summary")?;
            let input = CreateMemoryInput {
                project,
                memory_type,
                tags,
                summary,
                details,
                concepts,
                files_read,
                files_modified,
                metadata: lenient_json_map(&meta),
                created_at: None,
            };
            let memory = create_memory(app.store.as_ref(), &input)?;
            let indexed = sync_record::<MemoryKind>(app.index.as_ref(), &app.config, &memory);
            println!("ok #{}{}", memory.id, if indexed { "" } else { " (not indexed)" });
        }

        Commands::Search {
            project,
            q,
            limit,
            strategy,
            memory_type,
            tags,
            concept,
            file,
            since,
            until,
            json,
        } => {
            let request = MemorySearchRequest {
                project,
                query: q,
                limit,
                strategy: SearchStrategy::parse_lenient(&strategy),
                filters: MemoryFilters {
                    memory_type,
                    tags,
                    concept,
                    file,
                },
                since,
                until,
            };
            let result = app.orchestrator().search_memories(&request)?;
            if json {
                print_json(&result)?;
            } else {
                print_memories(&result);
            }
        }

        Commands::TurnAdd {
            project,
            session_id,
            role,
            content,
            context,
            meta,
        } => {
            let content = text_or_stdin(content, "content")?;
            let input = CreateTurnInput {
                project,
                session_id,
                role,
                content,
                context: strict_json_map("--context", &context)?,
                metadata: strict_json_map("--meta", &meta)?,
                created_at: None,
            };
            let turn = create_turn(app.store.as_ref(), &input)?;
            let indexed = sync_record::<TurnKind>(app.index.as_ref(), &app.config, &turn);
            println!("ok #{}{}", turn.id, if indexed { "" } else { " (not indexed)" });
        }

        Commands::TurnSearch {
            project,
            q,
            limit,
            strategy,
            session_id,
            role,
            since,
            until,
            json,
        } => {
            let request = TurnSearchRequest {
                project,
                query: q,
                limit,
                strategy: SearchStrategy::parse_lenient(&strategy),
                filters: TurnFilters { session_id, role },
                since,
                until,
            };
            let result = app.orchestrator().search_turns(&request)?;
            if json {
                print_json(&result)?;
            } else {
                print_turns(&result);
            }
        }

        Commands::Backfill { project, limit } => {
            let report = backfill_memories(
                app.store.as_ref(),
                app.index.as_ref(),
                &app.config,
                project.as_deref().filter(|p| !p.is_empty()),
                (limit > 0).then_some(limit),
            )?;
            println!("synced {} of {} memories", report.synced, report.rows);
        }

        Commands::TurnBackfill {
            project,
            session_id,
            limit,
        } => {
            let report = backfill_turns(
                app.store.as_ref(),
                app.index.as_ref(),
                &app.config,
                project.as_deref().filter(|p| !p.is_empty()),
                session_id.as_deref().filter(|s| !s.is_empty()),
                (limit > 0).then_some(limit),
            )?;
            println!("synced {} of {} turns", report.synced, report.rows);
        }
    }

    Ok(())
}

/// Use the flag value, or read stdin when it is omitted and piped
fn text_or_stdin(value: Option<String>, field: &str) -> anyhow::Result<String> {
    if let Some(text) = value.filter(|t| !t.trim().is_empty()) {
        return Ok(text);
    }
    let mut buf = String::new();
    if !io::stdin().is_terminal() {
        io::stdin().read_to_string(&mut buf)?;
    }
    let text = buf.trim();
    if text.is_empty() {
        return Err(MemError::InvalidInput(format!(
            "{} required (use --{} or stdin)",
            field, field
        ))
        .into());
    }
    Ok(text.to_string())
}

fn print_json<R: Serialize>(result: &SearchResult<R>) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&SearchOutput::from(result))?
    );
    Ok(())
}

fn print_provenance<R>(result: &SearchResult<R>) {
    println!(
        "strategy={} semantic={} fell_back={} count={}",
        result.strategy_used,
        result.used_semantic_index,
        result.fell_back,
        result.count()
    );
}

fn print_memories(result: &SearchResult<Memory>) {
    print_provenance(result);
    if result.is_empty() {
        println!("no results");
        return;
    }
    for memory in &result.records {
        println!(
            "#{} {} [{}] <{}> ({})",
            memory.id,
            memory.created_at.format("%Y-%m-%d %H:%M:%S"),
            memory.project,
            memory.memory_type,
            memory.tags
        );
        println!("{}", memory.summary);
        if !memory.details.is_empty() {
            println!("{}", memory.details);
        }
        println!("-");
    }
}

fn print_turns(result: &SearchResult<ConversationTurn>) {
    print_provenance(result);
    if result.is_empty() {
        println!("no results");
        return;
    }
    for turn in &result.records {
        println!(
            "#{} {} [{}] session={} {}",
            turn.id,
            turn.created_at.format("%Y-%m-%d %H:%M:%S"),
            turn.project,
            turn.session_id,
            turn.role
        );
        println!("{}", turn.content);
        println!("-");
    }
}
