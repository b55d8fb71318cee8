// SimpleDBM administrative CLI

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use simpledbm::common::types::{Lsn, PageId, PAGE_HEADER_SIZE};
use simpledbm::index::btree::{BTreeIndex, Location, ROW_LOCATION_TYPE, INT_KEY_TYPE, STRING_KEY_TYPE};
use simpledbm::storage::buffer::FixHint;
use simpledbm::transaction::wal::LogRecordKind;
use simpledbm::{Database, DatabaseConfig, IsolationMode, LockMode};

/// Bytes per line of a hex dump
const DUMP_WIDTH: usize = 32;

/// Owner id used by the CLI when reading pages outside a transaction
const CLI_OWNER: u64 = 0;

#[derive(Parser)]
#[command(author, version, about = "SimpleDBM CLI - administer a SimpleDBM database")]
struct Cli {
    /// Database directory
    #[arg(short, long, default_value = "simpledbm")]
    dir: PathBuf,

    /// Buffer pool size (number of pages)
    #[arg(short, long, default_value_t = 1000)]
    buffer_size: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty database
    Create,

    /// Run restart recovery and report what it did
    Recover,

    /// Print the log records starting at an LSN
    DumpLog {
        /// Start LSN as `file:offset`; the oldest record when omitted
        #[arg(long)]
        from: Option<String>,

        /// Maximum number of records to print
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Print a page in hex
    DumpPage { container: i32, page: i32 },

    /// Print every statistic of the buffer, log, lock and transaction managers
    Stats,

    /// Work with B-tree indexes
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Create an index in a new container
    Create {
        container: i32,

        /// Reject duplicate keys
        #[arg(long)]
        unique: bool,

        /// Use signed integer keys instead of strings
        #[arg(long)]
        int_keys: bool,
    },

    /// Insert a key pointing at a row id
    Insert { container: i32, key: String, row: String },

    /// Delete the entry (key, row id)
    Delete { container: i32, key: String, row: String },

    /// List the entries from a start key onwards
    Scan {
        container: i32,

        #[arg(long)]
        from: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Check the tree and print its shape and nodes
    Dump { container: i32 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DatabaseConfig::in_dir(&cli.dir).with_buffer_pool_size(cli.buffer_size);
    match cli.command {
        Commands::Create => create(config),
        Commands::Recover => recover(config),
        Commands::DumpLog { from, limit } => with_database(config, |db| dump_log(db, from.as_deref(), limit)),
        Commands::DumpPage { container, page } => {
            with_database(config, |db| dump_page(db, PageId::new(container, page)))
        }
        Commands::Stats => with_database(config, |db| {
            for stat in db.statistics() {
                println!("{}", stat);
            }
            Ok(())
        }),
        Commands::Index { command } => with_database(config, |db| run_index_command(db, command)),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

/// Open the database, run `f` and shut down cleanly whether or not it failed
fn with_database<F>(config: DatabaseConfig, f: F) -> Result<()>
where
    F: FnOnce(&Database) -> Result<()>,
{
    if !config.data_dir.exists() {
        bail!("no database in {} (run `create` first)", config.data_dir.display());
    }
    let db = Database::open(config).context("failed to open database")?;
    let result = f(&db);
    db.shutdown().context("failed to shut down database")?;
    result
}

fn create(config: DatabaseConfig) -> Result<()> {
    if config.container_dir().exists() {
        bail!("a database already exists in {}", config.data_dir.display());
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let dir = config.data_dir.clone();
    let db = Database::open(config)?;
    db.shutdown()?;
    println!("Created database in {}", dir.display());
    Ok(())
}

fn recover(config: DatabaseConfig) -> Result<()> {
    with_database(config, |db| {
        let summary = db.restart_summary();
        println!("Analysis started at {}", summary.analysis_start);
        println!("Redo started at     {}", summary.redo_start);
        println!("End of log          {}", summary.end_of_log);
        println!("Records redone      {}", summary.records_redone);
        println!("Rolled back         {:?}", summary.losers);
        println!("In doubt            {:?}", summary.in_doubt);
        info!("Recovery finished");
        Ok(())
    })
}

fn parse_lsn(text: &str) -> Result<Lsn> {
    let (index, offset) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("LSN must look like file:offset, got {}", text))?;
    Ok(Lsn::new(index.parse()?, offset.parse()?))
}

fn dump_log(db: &Database, from: Option<&str>, limit: usize) -> Result<()> {
    let start = from.map(parse_lsn).transpose()?.unwrap_or(Lsn::NULL);
    for record in db.log().iter_from(start)?.take(limit) {
        let record = record?;
        let detail = match record.kind {
            LogRecordKind::Redo | LogRecordKind::Undoable | LogRecordKind::Compensation { .. } => format!(
                " module={} type={} page={} bytes={}",
                record.module_id,
                record.type_code,
                record.page_id.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                record.payload.len()
            ),
            _ => String::new(),
        };
        println!(
            "{} txn={} prev={} {:?}{}",
            record.lsn, record.txn_id, record.prev_lsn, record.kind, detail
        );
    }
    Ok(())
}

fn dump_page(db: &Database, page_id: PageId) -> Result<()> {
    let bab = db.buffers().fix_shared(CLI_OWNER, page_id, FixHint::Discard)?;
    let page = bab.page();
    let type_name = db.registry().page_type_name(page.page_type()).unwrap_or("unknown");
    println!(
        "page {} type={} ({}) lsn={} flags={:#06x}",
        page_id,
        page.page_type(),
        type_name,
        page.lsn(),
        page.flags()
    );
    for (line, chunk) in page.data[PAGE_HEADER_SIZE..].chunks(DUMP_WIDTH).enumerate() {
        if chunk.iter().all(|b| *b == 0) {
            continue;
        }
        println!("{:05x}: {}", PAGE_HEADER_SIZE + line * DUMP_WIDTH, hex::encode(chunk));
    }
    Ok(())
}

fn parse_entry(index: &BTreeIndex, key: &str, row: &str) -> Result<(Vec<u8>, Location)> {
    let cmp = index.comparator();
    let key = cmp
        .key_factory()
        .parse(key)
        .ok_or_else(|| anyhow!("invalid {} key: {}", cmp.key_factory().name(), key))?;
    let location = cmp
        .location_factory()
        .parse(row)
        .ok_or_else(|| anyhow!("invalid {} location: {}", cmp.location_factory().name(), row))?;
    Ok((key, Location(location)))
}

fn run_index_command(db: &Database, command: IndexCommands) -> Result<()> {
    match command {
        IndexCommands::Create {
            container,
            unique,
            int_keys,
        } => {
            let key_type = if int_keys { INT_KEY_TYPE } else { STRING_KEY_TYPE };
            let trx = db.begin(IsolationMode::default())?;
            match db.btree().create_index(&trx, container, key_type, ROW_LOCATION_TYPE, unique) {
                Ok(_) => trx.commit()?,
                Err(e) => {
                    trx.abort()?;
                    return Err(e.into());
                }
            }
            println!("Created index {}", container);
        }
        IndexCommands::Insert { container, key, row } => {
            let index = db.open_index(container)?;
            let (key, location) = parse_entry(&index, &key, &row)?;
            let trx = db.begin(IsolationMode::default())?;
            match index.insert(&trx, &key, &location) {
                Ok(()) => trx.commit()?,
                Err(e) => {
                    trx.abort()?;
                    return Err(e.into());
                }
            }
        }
        IndexCommands::Delete { container, key, row } => {
            let index = db.open_index(container)?;
            let (key, location) = parse_entry(&index, &key, &row)?;
            let trx = db.begin(IsolationMode::default())?;
            match index.delete(&trx, &key, &location) {
                Ok(()) => trx.commit()?,
                Err(e) => {
                    trx.abort()?;
                    return Err(e.into());
                }
            }
        }
        IndexCommands::Scan { container, from, limit } => {
            let index = db.open_index(container)?;
            let start = match from {
                Some(text) => Some(
                    index
                        .comparator()
                        .key_factory()
                        .parse(&text)
                        .ok_or_else(|| anyhow!("invalid start key: {}", text))?,
                ),
                None => None,
            };
            let trx = db.begin(IsolationMode::ReadCommitted)?;
            let mut scan = index.open_scan(start.as_deref(), None, LockMode::Shared);
            let mut count = 0;
            while count < limit && scan.fetch_next(&trx)? {
                let cmp = index.comparator();
                let key = scan.current_key().map(|k| cmp.key_factory().format(k)).unwrap_or_default();
                let row = scan
                    .current_location()
                    .map(|l| cmp.format_location(l))
                    .unwrap_or_default();
                println!("{}\t{}", key, row);
                count += 1;
            }
            scan.close(&trx)?;
            trx.commit()?;
        }
        IndexCommands::Dump { container } => {
            let index = db.open_index(container)?;
            let stats = index.verify(CLI_OWNER)?;
            println!(
                "height={} leaves={} branches={} keys={}",
                stats.height, stats.leaf_pages, stats.branch_pages, stats.keys
            );
            for line in index.dump(CLI_OWNER)? {
                println!("{}", line);
            }
        }
    }
    Ok(())
}
