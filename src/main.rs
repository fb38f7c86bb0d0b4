// =============================================================================
// TradePulse Controller — Main Entry Point
// =============================================================================
//
// Long-running multi-bot HFT controller. This binary wires the supervisor to
// the in-process simulated terminal and starts one bot per configured symbol;
// the external API layer drives the same supervisor operations and subscribes
// to the same event channel in production.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod bot;
mod config;
mod errors;
mod events;
mod executor;
mod indicators;
mod market_access;
mod protection;
mod strategies;
mod supervisor;
mod tick_pipeline;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ControllerConfig;
use crate::events::EventRouter;
use crate::market_access::sim::SimTerminal;
use crate::market_access::SymbolInfo;
use crate::supervisor::Supervisor;

const CONFIG_PATH: &str = "controller_config.json";

/// Simulated-terminal metadata per instrument class.
fn sim_symbol_profile(symbol: &str) -> (SymbolInfo, f64, f64) {
    let five_digit = SymbolInfo {
        point_size: 0.00001,
        digits: 5,
        stop_level_points: 30,
        volume_step: 0.01,
    };
    let three_digit = SymbolInfo {
        point_size: 0.001,
        digits: 3,
        stop_level_points: 30,
        volume_step: 0.01,
    };
    let two_digit = SymbolInfo {
        point_size: 0.01,
        digits: 2,
        stop_level_points: 10,
        volume_step: 0.01,
    };

    match symbol {
        "EURUSD" => (five_digit, 1.0850, 10.0),
        "GBPUSD" => (five_digit, 1.2700, 15.0),
        "USDJPY" => (three_digit, 155.00, 12.0),
        "XAUUSD" => (two_digit, 2400.00, 30.0),
        "BTCUSD" => (two_digit, 65000.00, 120.0),
        "ETHUSD" => (two_digit, 4300.00, 50.0),
        _ => (two_digit, 100.00, 20.0),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("TradePulse controller starting up");

    let mut config = ControllerConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load controller config, using defaults");
        ControllerConfig::default()
    });

    // Override symbols from the environment if provided.
    if let Ok(symbols) = std::env::var("TRADEPULSE_SYMBOLS") {
        config.symbols = symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    info!(symbols = ?config.symbols, "configured instruments");

    // ── 2. Simulated terminal ────────────────────────────────────────────
    let terminal = Arc::new(SimTerminal::new());
    for symbol in &config.symbols {
        let (info, start_mid, spread_points) = sim_symbol_profile(symbol);
        terminal.add_symbol(symbol, info, start_mid, spread_points);
    }

    // ── 3. Supervisor & event channel ────────────────────────────────────
    let router = EventRouter::new();
    let supervisor = Arc::new(Supervisor::new(terminal, router.clone()));

    // Event logger: the stand-in for the console's push subscriber.
    let mut events = router.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => info!(target: "tradepulse::events", "{json}"),
                    Err(e) => warn!(error = %e, "failed to serialise event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── 4. Launch one bot per symbol ─────────────────────────────────────
    for symbol in config.symbols.clone() {
        let mut bot_config = config.default_bot.clone();
        bot_config.symbol = symbol.clone();

        match supervisor.start(bot_config).await {
            Ok(bot_id) => info!(bot_id, symbol = %symbol, "bot started"),
            Err(e) => error!(symbol = %symbol, error = %e, "failed to start bot"),
        }
    }

    info!("all subsystems running; press Ctrl+C to stop");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received; stopping bots");

    supervisor.stop_all();
    // Give the loops a moment to observe the stop flag and emit final events.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save controller config on shutdown");
    }

    info!("TradePulse controller shut down complete");
    Ok(())
}
