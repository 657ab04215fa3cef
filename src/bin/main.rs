//! Trellis CLI - build and query lineage/access graphs from warehouse feeds
//!
//! Usage:
//!   trellis ingest --history <file.jsonl> [--grants <file>] [--usage <file>]
//!   trellis lineage <name> [--direction <up|down>] [--depth <n>]
//!   trellis access <name> [--depth <n>]
//!   trellis path <source> <target> [--max-hops <n>]
//!
//! Examples:
//!   trellis ingest --history query_history.jsonl --manifest manifest.json
//!   trellis lineage analytics.marts.orders_fact.amount --direction up
//!   trellis access analyst --depth 4
//!   trellis search orders --types table,view

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use trellis::access::{access_graph, AccessGraphBuilder};
use trellis::config::Settings;
use trellis::extract::ObjectCatalog;
use trellis::feed::jsonl::{read_grants, read_usage};
use trellis::feed::JsonlFeed;
use trellis::graph::retention::{apply_retention, RetentionPolicy};
use trellis::graph::traverse::{shortest_path, Direction, Subgraph, Traversal};
use trellis::graph::{GraphStore, ObjectId, ObjectType};
use trellis::ingest::{processing_status, Pipeline};
use trellis::manifest::{import_manifest, Manifest, ManifestReport};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Trellis - column-level lineage and access graphs from warehouse query history")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to trellis.toml / TRELLIS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Graph database path (overrides the configured store location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest feeds into the graph store
    Ingest {
        /// Query-history JSONL export
        #[arg(long)]
        history: Option<PathBuf>,

        /// Grants JSONL export
        #[arg(long)]
        grants: Option<PathBuf>,

        /// Usage JSONL export
        #[arg(long)]
        usage: Option<PathBuf>,

        /// dbt manifest.json, imported before the history so declared
        /// columns inform wildcard expansion
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Rows per batch (overrides the configured batch size)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Walk column or object lineage from a node
    Lineage {
        /// Node name, e.g. db.schema.table or db.schema.table.column
        name: String,

        /// Which way to walk
        #[arg(short, long, default_value = "down")]
        direction: DirectionArg,

        /// Hop bound
        #[arg(long)]
        depth: Option<usize>,

        /// Admit edges below the confidence floor
        #[arg(long)]
        include_low_confidence: bool,
    },

    /// Walk the access graph from a role, user or object
    Access {
        /// Role, user or object name
        name: String,

        /// Hop bound
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Shortest lineage path between two nodes
    Path {
        source: String,
        target: String,

        /// Hop bound for the search
        #[arg(long, default_value_t = 10)]
        max_hops: usize,
    },

    /// Ingestion cursor position and recent failures
    Status,

    /// Node and edge counts
    Stats,

    /// Find nodes by name substring
    Search {
        pattern: String,

        /// Restrict to node types (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<TypeArg>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Import a dbt manifest as declared object lineage
    ImportManifest {
        /// Path to manifest.json
        file: PathBuf,
    },

    /// Delete edges past the retention window and nodes they orphan
    Prune {
        /// Retention window in days (overrides the configured value)
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Clone, ValueEnum)]
enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Up => Direction::Upstream,
            DirectionArg::Down => Direction::Downstream,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum TypeArg {
    Database,
    Schema,
    Table,
    View,
    MaterializedView,
    Column,
    Role,
    User,
}

impl From<TypeArg> for ObjectType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Database => ObjectType::Database,
            TypeArg::Schema => ObjectType::Schema,
            TypeArg::Table => ObjectType::Table,
            TypeArg::View => ObjectType::View,
            TypeArg::MaterializedView => ObjectType::MaterializedView,
            TypeArg::Column => ObjectType::Column,
            TypeArg::Role => ObjectType::Role,
            TypeArg::User => ObjectType::User,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = match open_store(cli.db.as_ref(), &settings) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Store error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Ingest {
            history,
            grants,
            usage,
            manifest,
            batch_size,
        } => cmd_ingest(&store, &settings, history, grants, usage, manifest, batch_size),
        Commands::Lineage {
            name,
            direction,
            depth,
            include_low_confidence,
        } => cmd_lineage(&store, &settings, name, direction, depth, include_low_confidence),
        Commands::Access { name, depth } => cmd_access(&store, &settings, name, depth),
        Commands::Path {
            source,
            target,
            max_hops,
        } => cmd_path(&store, source, target, max_hops),
        Commands::Status => cmd_status(&store),
        Commands::Stats => cmd_stats(&store),
        Commands::Search {
            pattern,
            types,
            limit,
        } => cmd_search(&store, pattern, types, limit),
        Commands::ImportManifest { file } => cmd_import_manifest(&store, file),
        Commands::Prune { days } => cmd_prune(&store, &settings, days),
    }
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings, String> {
    match config {
        Some(path) => Settings::from_file(path).map_err(|e| e.to_string()),
        None => Settings::load().map_err(|e| e.to_string()),
    }
}

fn open_store(db: Option<&PathBuf>, settings: &Settings) -> Result<GraphStore, String> {
    let path = match db {
        Some(path) => Some(path.clone()),
        None => settings.store.resolved_path().map_err(|e| e.to_string())?,
    };
    match path {
        Some(path) => GraphStore::open(path).map_err(|e| e.to_string()),
        None => GraphStore::open_default().map_err(|e| e.to_string()),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Summary of one `ingest` invocation, across every batch it ran.
#[derive(Debug, Default, serde::Serialize)]
struct IngestSummary {
    batches: usize,
    fetched: usize,
    processed: usize,
    failed: usize,
    skipped: usize,
    nodes_written: usize,
    edges_written: usize,
    watermark: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest: Option<ManifestReport>,
    grants_applied: usize,
    usage_applied: usize,
}

fn cmd_ingest(
    store: &GraphStore,
    settings: &Settings,
    history: Option<PathBuf>,
    grants: Option<PathBuf>,
    usage: Option<PathBuf>,
    manifest: Option<PathBuf>,
    batch_size: Option<usize>,
) -> ExitCode {
    if history.is_none() && grants.is_none() && usage.is_none() && manifest.is_none() {
        eprintln!("Nothing to ingest: pass --history, --grants, --usage or --manifest");
        return ExitCode::FAILURE;
    }

    let mut summary = IngestSummary::default();
    let mut catalog = ObjectCatalog::new();

    if let Some(path) = manifest {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error reading manifest '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        let parsed = match Manifest::from_json(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("Malformed manifest '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        match import_manifest(store, &mut catalog, &parsed, now_ms()) {
            Ok(report) => summary.manifest = Some(report),
            Err(e) => {
                eprintln!("Manifest import failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(path) = history {
        let feed = match JsonlFeed::open(&path) {
            Ok(feed) => feed,
            Err(e) => {
                eprintln!("Error reading history '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };

        let mut pipeline = Pipeline::new(store)
            .with_batch_size(batch_size.unwrap_or(settings.ingest.batch_size))
            .with_extractor_config(settings.extract.clone())
            .with_supporting_queries_cap(settings.ingest.supporting_queries_cap)
            .with_catalog(catalog);

        // Drain the feed: file exports are finite.
        loop {
            let report = match pipeline.process_batch(&feed) {
                Ok(report) => report,
                Err(e) => {
                    eprintln!("Ingestion failed: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            if report.fetched == 0 {
                summary.watermark = report.watermark;
                break;
            }
            summary.batches += 1;
            summary.fetched += report.fetched;
            summary.processed += report.processed;
            summary.failed += report.failed;
            summary.skipped += report.skipped;
            summary.nodes_written += report.nodes_written;
            summary.edges_written += report.edges_written;
            summary.watermark = report.watermark;
        }
    }

    if let Some(path) = grants {
        let rows = match read_grants(&path) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("Error reading grants '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        match AccessGraphBuilder::new(store).apply_grants(&rows) {
            Ok(count) => summary.grants_applied = count,
            Err(e) => {
                eprintln!("Applying grants failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(path) = usage {
        let rows = match read_usage(&path) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("Error reading usage '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        match AccessGraphBuilder::new(store).apply_usages(&rows) {
            Ok(count) => summary.usage_applied = count,
            Err(e) => {
                eprintln!("Applying usage failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    print_json(&summary)
}

fn cmd_lineage(
    store: &GraphStore,
    settings: &Settings,
    name: String,
    direction: DirectionArg,
    depth: Option<usize>,
    include_low_confidence: bool,
) -> ExitCode {
    let mut traversal = Traversal::new(ObjectId::new(name.to_lowercase()), direction.into())
        .with_max_depth(depth.unwrap_or(settings.traverse.max_depth))
        .with_confidence_floor(settings.traverse.confidence_floor);
    if include_low_confidence {
        traversal = traversal.include_low_confidence();
    }

    match traversal.run(store) {
        Ok(subgraph) => {
            warn_on_cycles(&subgraph);
            print_json(&subgraph)
        }
        Err(e) => {
            eprintln!("Traversal failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_access(
    store: &GraphStore,
    settings: &Settings,
    name: String,
    depth: Option<usize>,
) -> ExitCode {
    match access_graph(store, &name, depth.unwrap_or(settings.traverse.max_depth)) {
        Ok(subgraph) => print_json(&subgraph),
        Err(e) => {
            eprintln!("Access walk failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_path(store: &GraphStore, source: String, target: String, max_hops: usize) -> ExitCode {
    let source = ObjectId::new(source.to_lowercase());
    let target = ObjectId::new(target.to_lowercase());
    match shortest_path(store, &source, &target, max_hops) {
        Ok(Some(hops)) => print_json(&hops),
        Ok(None) => {
            eprintln!("No path from {} to {} within {} hops", source, target, max_hops);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Path search failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_status(store: &GraphStore) -> ExitCode {
    match processing_status(store, now_ms()) {
        Ok(status) => print_json(&status),
        Err(e) => {
            eprintln!("Status failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_stats(store: &GraphStore) -> ExitCode {
    match store.stats() {
        Ok(stats) => print_json(&stats),
        Err(e) => {
            eprintln!("Stats failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_search(store: &GraphStore, pattern: String, types: Vec<TypeArg>, limit: usize) -> ExitCode {
    let types: Vec<ObjectType> = types.into_iter().map(Into::into).collect();
    let filter = if types.is_empty() {
        None
    } else {
        Some(types.as_slice())
    };
    match store.search(&pattern, filter, limit) {
        Ok(nodes) => print_json(&nodes),
        Err(e) => {
            eprintln!("Search failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_import_manifest(store: &GraphStore, file: PathBuf) -> ExitCode {
    let text = match fs::read_to_string(&file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading manifest '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let manifest = match Manifest::from_json(&text) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("Malformed manifest '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let mut catalog = ObjectCatalog::new();
    match import_manifest(store, &mut catalog, &manifest, now_ms()) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Manifest import failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_prune(store: &GraphStore, settings: &Settings, days: Option<i64>) -> ExitCode {
    let policy = RetentionPolicy {
        edge_days: days.unwrap_or(settings.retention.edge_days),
    };
    match apply_retention(store, &policy, now_ms()) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Prune failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn warn_on_cycles(subgraph: &Subgraph) {
    let cycles = subgraph.cycles();
    if !cycles.is_empty() {
        eprintln!(
            "warning: {} dependency cycle(s) in the result, e.g. {}",
            cycles.len(),
            cycles[0]
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            ExitCode::FAILURE
        }
    }
}
