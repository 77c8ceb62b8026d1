use clap::Parser;
use memoria_core::config;
use memoria_core::store::{RetryConfig, RetryingStore};
use memoria_core::{
    DistanceMetric, HnswConfig, MemoryConfig, MemoryError, MemoryService, Recollection, SessionId,
    WalRecordStore,
};
use serde::Serialize;
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

mod command;
mod embed;

use command::Command;
use embed::HashingEmbedder;

type Store = RetryingStore<WalRecordStore>;

#[derive(Parser)]
#[command(name = "memoria", about = "Session-scoped semantic memory over stdin/stdout")]
struct Args {
    /// Data directory for the record store log
    #[arg(short, long, default_value = config::DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Embedding dimension
    #[arg(long, default_value_t = config::DEFAULT_DIMENSION)]
    dimension: usize,

    /// Distance metric (cosine or euclidean)
    #[arg(long, default_value = "cosine")]
    metric: DistanceMetric,

    /// Links per node on layers above 0 (layer 0 gets twice as many)
    #[arg(long, default_value_t = config::HNSW_DEFAULT_M)]
    m: usize,

    /// Candidate list size during insertion
    #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_CONSTRUCTION)]
    ef_construction: usize,

    /// Candidate list size during search
    #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_SEARCH)]
    ef_search: usize,

    /// Recall searches k * over_fetch candidates before session filtering
    #[arg(long, default_value_t = config::DEFAULT_OVER_FETCH_FACTOR)]
    over_fetch: usize,

    /// User that owns a newly started session
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Resume an existing session instead of starting a new one
    #[arg(short, long)]
    session: Option<SessionId>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl Args {
    fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            dimension: self.dimension,
            hnsw: HnswConfig {
                m: self.m,
                m_max0: self.m * 2,
                ef_construction: self.ef_construction,
                ef_search: self.ef_search,
                metric: self.metric,
                ..HnswConfig::default()
            },
            over_fetch_factor: self.over_fetch,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env()
        .add_directive(
            "memoria_cli=info"
                .parse()
                .expect("valid directive literal"),
        )
        .add_directive(
            "memoria_core=info"
                .parse()
                .expect("valid directive literal"),
        );
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Serialize)]
struct Hit<'a> {
    id: String,
    session_id: String,
    content: &'a str,
    distance: f32,
    created_at: String,
}

impl<'a> From<&'a Recollection> for Hit<'a> {
    fn from(r: &'a Recollection) -> Self {
        Self {
            id: r.record.id.to_string(),
            session_id: r.record.session_id.to_string(),
            content: &r.record.content,
            distance: r.distance,
            created_at: r.record.created_at.to_rfc3339(),
        }
    }
}

struct Driver {
    service: MemoryService<Store>,
    embedder: HashingEmbedder,
    session: SessionId,
}

impl Driver {
    fn execute(&self, command: Command) -> Result<serde_json::Value, MemoryError> {
        match command {
            Command::Remember(text) => {
                let id = self
                    .service
                    .remember_text(self.session, &text, &self.embedder)?;
                Ok(json!({ "remembered": id.to_string() }))
            }
            Command::Recall { k, text } => {
                let hits = self
                    .service
                    .recall_text(Some(self.session), &text, k, &self.embedder)?;
                Ok(recall_response(&hits))
            }
            Command::RecallAll { k, text } => {
                let hits = self.service.recall_text(None, &text, k, &self.embedder)?;
                Ok(recall_response(&hits))
            }
            Command::Forget(id) => {
                let record = self.service.forget(id)?;
                Ok(json!({ "forgotten": record.id.to_string(), "content": record.content }))
            }
            Command::History => {
                let records = self.service.session_records(self.session)?;
                let history: Vec<_> = records
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.id.to_string(),
                            "content": r.content,
                            "created_at": r.created_at.to_rfc3339(),
                            "indexed": !r.is_pending(),
                        })
                    })
                    .collect();
                Ok(json!({ "session": self.session.to_string(), "history": history }))
            }
            Command::Stats => {
                let index = self.service.index();
                let session = self.service.session(self.session)?;
                Ok(json!({
                    "session": self.session.to_string(),
                    "user": session.user_id,
                    "session_records": session.record_ids.len(),
                    "records": self.service.store().inner().record_count(),
                    "indexed": index.count(),
                    "allocated": index.allocated(),
                    "dimension": index.dimension(),
                    "metric": index.config().metric,
                    "rebuild": self.service.last_rebuild(),
                }))
            }
            Command::Compact => {
                let entries = self.service.store().inner().compact()?;
                Ok(json!({ "compacted": entries }))
            }
            Command::Quit => Ok(json!({ "bye": true })),
        }
    }

    /// Response to one input line, and whether the session should end.
    fn handle_line(&self, line: &str) -> (serde_json::Value, bool) {
        match command::parse(line) {
            Ok(cmd) => {
                let quit = cmd == Command::Quit;
                let response = self.execute(cmd).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Command failed");
                    json!({ "error": e.to_string() })
                });
                (response, quit)
            }
            Err(e) => (json!({ "error": e.to_string() }), false),
        }
    }
}

fn recall_response(hits: &[Recollection]) -> serde_json::Value {
    let hits: Vec<Hit<'_>> = hits.iter().map(Hit::from).collect();
    json!({ "results": hits })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let data_path = std::path::Path::new(&args.data_dir);
    if data_path.exists() && !data_path.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir
        );
        std::process::exit(1);
    }

    let memory_config = args.memory_config();
    memory_config.validate()?;

    let store = RetryingStore::new(WalRecordStore::open(&args.data_dir)?, RetryConfig::default());
    let service = MemoryService::open(store, memory_config)?;

    let session = match args.session {
        Some(id) => {
            service.session(id)?;
            tracing::info!(session_id = %id, "Session resumed");
            id
        }
        None => service.start_session(args.user.as_str())?,
    };

    let driver = Driver {
        service,
        embedder: HashingEmbedder::new(args.dimension),
        session,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "{}",
        json!({ "ready": true, "session": session.to_string(), "help": command::USAGE })
    )?;
    out.flush()?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (response, quit) = driver.handle_line(&line);
        writeln!(out, "{response}")?;
        out.flush()?;
        if quit {
            break;
        }
    }

    tracing::info!(session_id = %session, "Shutting down");
    Ok(())
}
