//! pagestore CLI
//!
//! Command-line interface for inspecting and maintaining a page store.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pagestore::dump::{read_dump, write_dump};
use pagestore::store::human_readable;
use pagestore::{Column, Compression, Config, IndexValue, Series, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// pagestore CLI
#[derive(Parser, Debug)]
#[command(name = "pagestore-cli")]
#[command(about = "Inspect and maintain a page store")]
#[command(version)]
struct Args {
    /// Catalog database file
    #[arg(short, long, default_value = "./pagestore.db")]
    catalog: PathBuf,

    /// Page directory (defaults to the one recorded in the catalog)
    #[arg(short, long)]
    page_dir: Option<PathBuf>,

    /// Open a snapshot of the catalog and refuse writes
    #[arg(long)]
    read_only: bool,

    /// Soft-delete replaced pages instead of removing them
    #[arg(long)]
    keep_deleted: bool,

    /// Compression for pages written by this run (none, gzip)
    #[arg(long, default_value = "none")]
    compression: Compression,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show store or variable statistics
    Info {
        /// Restrict to one variable
        variable: Option<String>,
    },

    /// List variables matching a LIKE pattern
    Search {
        /// Pattern, `%` matches any run of characters
        #[arg(default_value = "%")]
        pattern: String,
    },

    /// Print a variable's records as `index<TAB>value`
    Get {
        variable: String,

        /// Lower index bound (inclusive)
        #[arg(long)]
        from: Option<IndexValue>,

        /// Upper index bound (inclusive)
        #[arg(long)]
        to: Option<IndexValue>,

        /// Verify page checksums while reading
        #[arg(long)]
        check: bool,
    },

    /// Count a variable's records
    Count {
        variable: String,

        #[arg(long)]
        from: Option<IndexValue>,

        #[arg(long)]
        to: Option<IndexValue>,
    },

    /// Merge runs of small pages
    Rebalance {
        #[arg(default_value = "%")]
        pattern: String,

        /// Target page size in bytes (defaults to the store's limit)
        #[arg(long)]
        max_size: Option<u64>,
    },

    /// Split pages larger than a size
    Split {
        variable: String,

        /// Maximum page size in bytes
        #[arg(long)]
        max_size: u64,
    },

    /// Remove soft-deleted pages
    Prune {
        /// Only pages deleted at least this many seconds ago
        #[arg(long)]
        older_than_secs: Option<u64>,
    },

    /// Check page checksums
    Verify {
        variable: Option<String>,
    },

    /// Print the settings log
    Conf,

    /// Store every series of a dump file
    Import {
        dump: PathBuf,
    },

    /// Write variables matching a pattern to a dump file
    Export {
        pattern: String,
        dump: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pagestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> pagestore::Result<()> {
    let mut builder = Config::builder()
        .catalog_path(&args.catalog)
        .read_only(args.read_only)
        .keep_deleted_pages(args.keep_deleted)
        .compression(args.compression);
    if let Some(dir) = &args.page_dir {
        builder = builder.page_dir(dir);
    }
    let store = Store::open(builder.build())?;

    match args.command {
        Commands::Info { variable } => {
            println!("{}", store.info(variable.as_deref())?);
        }
        Commands::Search { pattern } => {
            for name in store.search(&pattern)? {
                println!("{}", name);
            }
        }
        Commands::Get {
            variable,
            from,
            to,
            check,
        } => {
            let series = if check {
                store.get_checked(&variable, from, to)?
            } else {
                store.get(&variable, from, to)?
            };
            print_series(&series);
        }
        Commands::Count { variable, from, to } => {
            println!("{}", store.count(&variable, from, to)?);
        }
        Commands::Rebalance { pattern, max_size } => {
            let max_size = max_size.unwrap_or(store.max_page_size());
            store.rebalance(&pattern, max_size)?;
        }
        Commands::Split { variable, max_size } => {
            let split = store.split_pages(&variable, max_size)?;
            println!("{} pages split", split);
        }
        Commands::Prune { older_than_secs } => {
            let pruned = store.prune_deleted_pages(older_than_secs.map(Duration::from_secs))?;
            println!("{} pages pruned", pruned);
        }
        Commands::Verify { variable } => {
            let failed = store.verify(variable.as_deref())?;
            for id in &failed {
                println!("page {} failed", id);
            }
            if !failed.is_empty() {
                process::exit(2);
            }
        }
        Commands::Conf => {
            for entry in store.conf_entries()? {
                println!("{}\t{}\t{}", entry.timestamp, entry.variable, entry.value);
            }
        }
        Commands::Import { dump } => {
            let entries = read_dump(&dump)?;
            let records: usize = entries.values().map(Series::len).sum();
            store.store(&entries)?;
            println!(
                "imported {} variables, {} records",
                entries.len(),
                human_readable(records as f64)
            );
        }
        Commands::Export { pattern, dump } => {
            let entries = store.get_matching(&pattern, None, None)?;
            write_dump(&dump, &entries)?;
            println!("exported {} variables", entries.len());
        }
    }
    Ok(())
}

fn print_series(series: &Series) {
    for (i, row) in series.records.rows().enumerate() {
        let Some(key) = series.index.get(i) else {
            break;
        };
        println!("{}\t{}", key, format_row(&row));
    }
}

fn format_row(row: &Column) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
        if parts.len() == 1 {
            parts.join("")
        } else {
            format!("[{}]", parts.join(", "))
        }
    }
    match row {
        Column::Int32(v) => join(v),
        Column::Int64(v) => join(v),
        Column::Float32(v) => join(v),
        Column::Float64(v) => join(v),
        Column::UInt8(v) => join(v),
        Column::Text(v) => join(v),
    }
}
