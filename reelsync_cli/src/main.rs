mod autoplay;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reelsync_core::{GameConfig, SeededRng};
use reelsync_shared::{GameState, SpinEvent};
use reelsync_store::Store;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reelsync-cli", about = "Control and display views for a shared reelsync machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Game configuration JSON; built-in defaults when omitted
    #[arg(long, value_parser, env = "REELSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Directory holding the shared state records
    #[arg(long, value_parser, env = "REELSYNC_DATA_DIR", default_value = "./reelsync-data")]
    data_dir: PathBuf,
    /// Server seed for replayable outcomes
    #[arg(long, env = "REELSYNC_SEED")]
    seed: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current state as JSON
    State,
    /// Set the bet per spin, e.g. `2.50` or `$2.50`
    Bet { amount: String },
    /// Set the whole-number bet multiplier
    Multiplier { value: String },
    /// Add credits
    Add { amount: String },
    /// Spin once and wait for the result
    Spin,
    /// Restore the machine defaults
    Reset,
    /// Keep spinning while auto-spin stays on
    Auto {
        /// Pause between spins in milliseconds
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many spins
        #[arg(long)]
        spins: Option<u32>,
    },
    /// Follow state changes and spins until Ctrl-C
    Watch,
}

fn open_store(cli: &Cli) -> anyhow::Result<Store> {
    let config = match &cli.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GameConfig::default(),
    };
    let mut builder = Store::builder(config).data_dir(&cli.data_dir);
    if let Some(seed) = &cli.seed {
        let rng = SeededRng::new(seed.as_str(), "reelsync-cli", 0);
        info!(seed_hash = %rng.seed_hash(), "using seeded outcomes");
        builder = builder.random_source(rng);
    }
    let store = builder
        .open()
        .with_context(|| format!("opening data dir {}", cli.data_dir.display()))?;
    Ok(store)
}

fn render(state: &GameState) -> String {
    format!(
        "[{}] balance ${:.2} | bet ${:.2} x{} | won ${:.2} total | {}{}",
        state.last_symbols.join(" "),
        state.balance,
        state.current_bet,
        state.bet_multiplier,
        state.total_winnings,
        state.last_message,
        if state.auto_spin { " (auto)" } else { "" }
    )
}

fn render_spin(event: &SpinEvent) -> String {
    match event {
        SpinEvent::Start { targets, spin_id } => {
            format!("spin {spin_id} -> {}", targets.join(" "))
        }
        SpinEvent::Settle {
            spin_id,
            payout,
            multiplier,
            ..
        } => format!("spin {spin_id} paid ${payout:.2} (x{multiplier})"),
    }
}

/// Prints the outcome of a mutation that may have been refused.
fn report(store: &Store, applied: bool) -> anyhow::Result<()> {
    let state = store.get_state();
    if !applied {
        bail!("{}", state.last_message);
    }
    println!("{}", render(&state));
    Ok(())
}

async fn spin(store: &Store) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let events = store.on_spin(move |event| {
        let _ = tx.send(event.clone());
    });
    let handle = match store.spin() {
        Ok(handle) => handle,
        Err(rejection) => bail!("{rejection}"),
    };
    println!("spinning: {}", handle.targets.join(" "));

    let settled = tokio::time::timeout(store.config().remote_settle_deadline(), async {
        while let Some(event) = rx.recv().await {
            if matches!(&event, SpinEvent::Settle { spin_id, .. } if *spin_id == handle.spin_id) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    events.unsubscribe();

    if !settled {
        bail!("spin {} was voided before it settled", handle.spin_id);
    }
    println!("{}", render(&store.get_state()));
    Ok(())
}

async fn watch(store: &Store) -> anyhow::Result<()> {
    let state = store.subscribe(|state| println!("{}", render(state)));
    let spins = store.on_spin(|event| println!("{}", render_spin(event)));
    tokio::signal::ctrl_c().await?;
    state.unsubscribe();
    spins.unsubscribe();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;

    let result = match &cli.command {
        Commands::State => {
            println!("{}", serde_json::to_string_pretty(&store.get_state())?);
            Ok(())
        }
        Commands::Bet { amount } => report(&store, store.set_bet(amount.as_str())),
        Commands::Multiplier { value } => report(&store, store.set_bet_multiplier(value.as_str())),
        Commands::Add { amount } => report(&store, store.add_balance(amount.as_str())),
        Commands::Reset => {
            store.reset();
            report(&store, true)
        }
        Commands::Spin => spin(&store).await,
        Commands::Auto { interval, spins } => {
            if let Some(interval) = interval {
                if !store.set_auto_spin_interval(*interval) {
                    bail!("{}", store.get_state().last_message);
                }
            }
            store.set_auto_spin(true);
            let reason = autoplay::run(&store, *spins).await?;
            println!("{}", render(&store.get_state()));
            println!("stopped: {reason:?}");
            Ok(())
        }
        Commands::Watch => watch(&store).await,
    };

    store.shutdown();
    result
}
