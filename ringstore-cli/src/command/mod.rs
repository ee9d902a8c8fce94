use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use log::info;

use ringstore::route::{RouteDriver, RouteKind};
use ringstore::tablestore::Table;

/// Every operation `ringstorectl` exposes, one per route-driver verb. Ground:
/// `kvcli::command::Command`'s subcommand shape, re-themed around
/// `hol:`/`ts:`/`tab:`/`vs:` routes instead of npm registry actions.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that a route is reachable without opening it for writes.
    Access {
        url: String,
        #[clap(long)]
        password: Option<String>,
    },

    /// Open (creating if absent) a route and report whether it already existed.
    Open {
        url: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        password: Option<String>,
        /// Fail instead of creating if the target is missing.
        #[clap(long)]
        keep: bool,
    },

    /// Write one record. For `tab:` routes, `data` is a tab-separated row
    /// with a `_header_` line expected as the first `--row`; see `--row`.
    Put {
        url: String,
        /// Raw bytes for `hol:`/`ts:`/`vs:` routes, or "col1\tcol2" for the
        /// first `--row` of a `tab:` route.
        data: String,
        #[clap(long = "row", help = "additional tab-separated data row for tab: routes")]
        rows: Vec<String>,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        password: Option<String>,
    },

    /// Read up to `--count` records starting at `--seq` (defaults to the
    /// route's current cursor).
    Get {
        url: String,
        #[clap(long, default_value_t = 1)]
        count: usize,
        #[clap(long)]
        seq: Option<u64>,
        #[clap(long)]
        password: Option<String>,
    },

    /// Report the route's latest sequence, on-disk size, and mtime.
    Tell {
        url: String,
        #[clap(long)]
        password: Option<String>,
    },
}

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Access { url, password } => {
            info!("access {url}");
            RouteDriver::access(&url, password.as_deref())?;
            println!("{}", "reachable".green());
        }
        Command::Open { url, description, password, keep } => {
            info!("open {url} keep={keep}");
            let route = RouteDriver::open(&url, &description, password.as_deref(), keep)?;
            println!("opened {} route at {}", format!("{:?}", route.kind()).to_lowercase(), url);
            route.close()?;
        }
        Command::Put { url, data, rows, description, password } => {
            info!("put {url}");
            let mut route = RouteDriver::open(&url, &description, password.as_deref(), false)?;
            let seq = match route.kind() {
                RouteKind::Tab => {
                    let columns: Vec<String> = data.split('\t').map(String::from).collect();
                    let mut table = Table::new(columns);
                    for row in &rows {
                        table.push_row(row.split('\t').map(String::from).collect())?;
                    }
                    route.twrite(&table)?
                }
                _ => route.write(data.as_bytes())?,
            };
            route.close()?;
            println!("wrote record {seq}");
        }
        Command::Get { url, count, seq, password } => {
            info!("get {url} count={count}");
            let mut route = RouteDriver::open(&url, "", password.as_deref(), true)?;
            match route.kind() {
                RouteKind::Tab => {
                    let table = route.tread(seq, count)?;
                    println!("{}", table.columns.join("\t"));
                    for row in &table.rows {
                        println!("{}", row.join("\t"));
                    }
                }
                _ => {
                    for record in route.read(seq, count)? {
                        println!("{}", String::from_utf8_lossy(&record));
                    }
                }
            }
            route.close()?;
        }
        Command::Tell { url, password } => {
            info!("tell {url}");
            let route = RouteDriver::open(&url, "", password.as_deref(), true)?;
            let (latest, size, mtime) = route.tell()?;
            match latest {
                Some(seq) => println!("latest={seq} size={size} mtime={mtime}"),
                None => println!("latest=none size={size} mtime={mtime}"),
            }
            route.close()?;
        }
    }
    Ok(())
}
