mod menu;
mod session;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledger_core::{constants::PROGRESS_INTERVAL, Miner, MinerConfig};
use ledger_storage::{open_store, StoreKind};
use session::{parse_difficulty, Session};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger")]
#[command(about = "Append text blocks to a proof-of-work chain")]
struct Cli {
    /// Directory holding the chain
    #[arg(long, global = true, default_value = "blocks")]
    blocks_dir: PathBuf,

    /// Storage backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Json)]
    store: Backend,

    /// Mining workers (defaults to the number of CPUs)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Attempts per worker between progress updates
    #[arg(long, global = true, default_value_t = PROGRESS_INTERVAL)]
    progress_interval: u64,

    /// Difficulty for the next block (defaults to the last block's)
    #[arg(long, global = true, value_parser = difficulty_arg)]
    difficulty: Option<u32>,

    /// Do not print the live nonce while mining
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block with the given data and append it
    Mine {
        /// Text payload of the block
        #[arg(long)]
        data: String,
    },
    /// Print every block
    List,
    /// Verify hashes, difficulty and links of the whole chain
    Validate,
    /// Interactive menu (default)
    Menu,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Json,
    Sled,
}

impl From<Backend> for StoreKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Json => StoreKind::Json,
            Backend::Sled => StoreKind::Sled,
        }
    }
}

fn difficulty_arg(s: &str) -> Result<u32, String> {
    parse_difficulty(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = MinerConfig::default().with_progress_interval(cli.progress_interval);
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    let store = open_store(cli.store.into(), &cli.blocks_dir)?;
    let mut session = Session::open(store, Miner::new(config), cli.difficulty)?.with_progress(!cli.quiet);
    let mut stdout = io::stdout().lock();

    match cli.cmd.unwrap_or(Command::Menu) {
        Command::Mine { data } => {
            if let Some(genesis) = session.ensure_genesis()? {
                menu::report_mined(&mut stdout, &genesis)?;
            }
            let mined = session.mine_block(&data)?;
            menu::report_mined(&mut stdout, &mined)?;
        }
        Command::List => writeln!(stdout, "{}", menu::render_chain(session.blocks()))?,
        Command::Validate => {
            let verdict = session.validate();
            writeln!(stdout, "{verdict}")?;
            if !verdict.is_valid() {
                bail!("chain in {} is invalid", cli.blocks_dir.display());
            }
        }
        Command::Menu => {
            if let Some(genesis) = session.ensure_genesis()? {
                menu::report_mined(&mut stdout, &genesis)?;
            } else {
                writeln!(
                    stdout,
                    "Loaded {} blocks. Current difficulty: {}",
                    session.blocks().len(),
                    session.difficulty()
                )?;
            }
            menu::run(&mut session, io::stdin().lock(), &mut stdout)?;
        }
    }
    Ok(())
}
