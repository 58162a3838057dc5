use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use gridmapper_core::{
    derive_hash_hex, derive_positions, CancelToken, MineLayout, OsSeedSource, RngParams,
    SearchEngine, SearchEvent, SearchTarget, BOARD_SIDE, DEFAULT_YIELD_EVERY,
};
use gridmapper_shared::{load_rounds, RevealReport, SearchReport, SearchStatus, VerifyRow};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gridmapper",
    about = "Verify provably-fair mines rounds and search for the server seed behind them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the mine layout for a seed pair and nonce
    Derive {
        #[arg(long, env = "GRIDMAPPER_SERVER_SEED")]
        server_seed: String,
        #[arg(long, env = "GRIDMAPPER_CLIENT_SEED")]
        client_seed: String,
        #[arg(long, default_value_t = 1)]
        nonce: u64,
        #[arg(long, default_value_t = 3)]
        mines: usize,
        /// Comma-separated tiles the player picked; each is shown as a hit or a miss
        #[arg(long, value_delimiter = ',')]
        tiles: Option<Vec<u8>>,
        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search for a server seed that reproduces a layout or a file of saved rounds
    Search(SearchArgs),
    /// Re-derive every saved round and check it against the recorded tiles
    Verify {
        #[arg(long, env = "GRIDMAPPER_SERVER_SEED")]
        server_seed: String,
        #[arg(long, env = "GRIDMAPPER_CLIENT_SEED")]
        client_seed: String,
        /// JSON array of {"mines", "nonce", "selectedTiles"} records
        #[arg(long)]
        rounds: PathBuf,
        /// Also write the per-round results to this CSV path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print the SHA-256 commitment of a server seed
    Hash {
        #[arg(long, env = "GRIDMAPPER_SERVER_SEED")]
        server_seed: String,
    },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("single")
        .args(["nonce", "mines", "tiles"])
        .multiple(true)
        .conflicts_with("rounds")
))]
struct SearchArgs {
    #[arg(long, env = "GRIDMAPPER_CLIENT_SEED")]
    client_seed: String,
    #[arg(long, requires_all = ["mines", "tiles"])]
    nonce: Option<u64>,
    #[arg(long)]
    mines: Option<usize>,
    /// Comma-separated mine tiles, 0-24
    #[arg(long, value_delimiter = ',')]
    tiles: Option<Vec<u8>>,
    /// JSON array of saved rounds that must all match
    #[arg(long, required_unless_present = "nonce")]
    rounds: Option<PathBuf>,
    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Attempts between progress reports
    #[arg(long, env = "GRIDMAPPER_YIELD_EVERY", default_value_t = DEFAULT_YIELD_EVERY)]
    yield_every: u64,
    #[arg(long)]
    json: bool,
}

/// `*` mine, `.` safe; picked tiles show `X` on a mine (hit) and `o` on a safe tile (miss).
fn render_board(layout: &MineLayout, picks: Option<&MineLayout>) -> String {
    layout
        .grid()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, &mine)| {
                    let picked = picks.is_some_and(|p| p.contains((r * BOARD_SIDE + c) as u8));
                    match (mine, picked) {
                        (true, true) => "X",
                        (false, true) => "o",
                        (true, false) => "*",
                        (false, false) => ".",
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn search_target(args: &SearchArgs) -> anyhow::Result<SearchTarget> {
    if let Some(path) = &args.rounds {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let rounds = load_rounds(BufReader::new(file))?;
        info!(rounds = rounds.len(), "loaded saved rounds");
        return Ok(SearchTarget::rounds(rounds)?);
    }
    let (Some(nonce), Some(mines), Some(tiles)) = (args.nonce, args.mines, args.tiles.clone())
    else {
        bail!("either --rounds or --nonce, --mines and --tiles are required");
    };
    Ok(SearchTarget::single(nonce, mines, MineLayout::new(tiles)?)?)
}

async fn run_search(args: SearchArgs) -> anyhow::Result<()> {
    let target = search_target(&args)?;
    let cancel = CancelToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping search");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = args.timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(secs, "timeout reached, stopping search");
            cancel.cancel();
        });
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let SearchEvent::Progress { attempts } = event {
                info!(attempts, "searching");
            }
        }
    });

    let engine = SearchEngine::with_yield_every(args.yield_every);
    let outcome = engine
        .search(&args.client_seed, &target, &mut OsSeedSource, &cancel, Some(&tx))
        .await?;
    drop(tx);
    progress.await?;

    let report = SearchReport::from_outcome(&args.client_seed, &outcome, Utc::now());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match report.status {
        SearchStatus::Found => {
            println!(
                "found server_seed={} hash={} after {} attempts",
                report.server_seed.unwrap_or_default(),
                report.server_seed_hash.unwrap_or_default(),
                report.attempts
            );
        }
        SearchStatus::Cancelled => {
            println!("search stopped after {} attempts", report.attempts);
        }
    }
    Ok(())
}

fn verify_rounds(
    server_seed: &str,
    client_seed: &str,
    rounds: PathBuf,
    csv_path: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let file = File::open(&rounds).with_context(|| format!("opening {}", rounds.display()))?;
    let rounds = load_rounds(BufReader::new(file))?;

    let mut rows = Vec::with_capacity(rounds.len());
    for round in &rounds {
        let params = RngParams::new(server_seed, client_seed, round.nonce())?;
        let actual = derive_positions(&params, round.mine_count())?;
        let matched = actual == *round.selected_tiles();
        println!(
            "nonce={:>6} mines={:>2} expected={} actual={} {}",
            round.nonce(),
            round.mine_count(),
            round.selected_tiles(),
            actual,
            if matched { "ok" } else { "MISMATCH" }
        );
        rows.push(VerifyRow {
            nonce: round.nonce(),
            mines: round.mine_count(),
            expected: round.selected_tiles().to_string(),
            actual: actual.to_string(),
            matched,
        });
    }

    if let Some(path) = csv_path {
        let mut wtr = csv::Writer::from_path(&path)?;
        for row in &rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        println!("Exported {} rows to {}", rows.len(), path.display());
    }
    Ok(rows.iter().all(|r| r.matched))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Derive {
            server_seed,
            client_seed,
            nonce,
            mines,
            tiles,
            json,
        } => {
            let params = RngParams::new(server_seed, client_seed, nonce)?;
            let picks = tiles.map(MineLayout::new).transpose()?;
            let layout = derive_positions(&params, mines)?;
            if json {
                match &picks {
                    Some(picks) => {
                        let reveal = RevealReport::new(&layout, picks);
                        println!("{}", serde_json::to_string(&reveal)?);
                    }
                    None => println!("{}", serde_json::to_string(&layout)?),
                }
            } else {
                println!(
                    "server_seed_hash={} nonce={} mines={}",
                    params.server_seed_hash_hex(),
                    nonce,
                    layout
                );
                if let Some(picks) = &picks {
                    let reveal = RevealReport::new(&layout, picks);
                    println!("hits={:?} misses={:?}", reveal.hits, reveal.misses);
                }
                println!("{}", render_board(&layout, picks.as_ref()));
            }
        }
        Commands::Search(args) => run_search(args).await?,
        Commands::Verify {
            server_seed,
            client_seed,
            rounds,
            csv,
        } => {
            if !verify_rounds(&server_seed, &client_seed, rounds, csv)? {
                bail!("some rounds do not match the given seeds");
            }
        }
        Commands::Hash { server_seed } => {
            println!("{}", derive_hash_hex(server_seed.as_bytes()));
        }
    }

    Ok(())
}
