//! CLI for livedispatch
//!
//! Subcommands:
//! - `server`: run the WebSocket server
//! - `quote`: print the price of a delivery
//! - `token`: sign an access token for a participant (useful for smoke tests)

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use livedispatch::broker::ChannelBroker;
use livedispatch::config::{Settings, load_config};
use livedispatch::dispatch::DispatchEngine;
use livedispatch::location::LocationCache;
use livedispatch::model::Role;
use livedispatch::persistence::{DeliveryStore, SledStore};
use livedispatch::pricing::{self, PriceQuery};
use livedispatch::registry::ConnectionRegistry;
use livedispatch::transport::{RealtimeGateway, TokenAuthority, start_websocket_server};
use livedispatch::utils::logging;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "livedispatch")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Print the price of a delivery
    Quote {
        /// MOTO, VOITURE or CAMIONNETTE
        #[arg(long, default_value = "MOTO")]
        vehicle: String,
        /// Distance in kilometres
        #[arg(long)]
        distance: f64,
        /// Waiting time in minutes
        #[arg(long, default_value_t = 0)]
        waiting: i64,
        /// SIMPLE, EXPRESS, GROUPEE or DEMENAGEMENT
        #[arg(long = "type", default_value = "SIMPLE")]
        delivery_type: String,
        /// Promo code, looked up in the configured store
        #[arg(long)]
        promo: Option<String>,
    },
    /// Sign an access token for a participant
    Token {
        #[arg(long)]
        participant: String,
        /// client, driver or admin
        #[arg(long, default_value = "client")]
        role: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.server.log_level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::Quote {
            vehicle,
            distance,
            waiting,
            delivery_type,
            promo,
        } => run_quote(&config, &vehicle, distance, waiting, &delivery_type, promo).await,
        Command::Token {
            participant,
            role,
            hours,
        } => run_token(&config, &participant, &role, hours),
    };
    if let Err(e) = result {
        error!("livedispatch failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> CliResult {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let store = Arc::new(SledStore::open(&config.storage.path)?);
    let registry = ConnectionRegistry::from_settings(&config.realtime);
    let locations = LocationCache::new(chrono::Duration::seconds(config.location.staleness_secs));
    let engine = DispatchEngine::new(
        store.clone(),
        ChannelBroker::new(registry.clone()),
        locations.clone(),
        config.pricing.clone(),
    );
    let gateway = RealtimeGateway::new(registry.clone(), Arc::new(engine));
    let authority = TokenAuthority::new(&config.server.jwt_secret);

    let tick = Duration::from_secs(config.realtime.keepalive_secs.max(1));
    tokio::spawn(registry.start_keepalive_loop(tick));
    tokio::spawn(purge_loop(locations, tick));

    tokio::select! {
        res = start_websocket_server(&addr, gateway.clone(), authority) => {
            match res {
                Ok(()) => error!("WebSocket server exited unexpectedly."),
                Err(e) => error!("WebSocket server failed: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    gateway.shutdown();
    store.flush().await?;
    Ok(())
}

/// Drop stale driver positions on every tick.
async fn purge_loop(locations: LocationCache, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let purged = locations.purge_stale(Utc::now());
        if purged > 0 {
            debug!(purged, "stale locations purged");
        }
    }
}

async fn run_quote(
    config: &Settings,
    vehicle: &str,
    distance: f64,
    waiting: i64,
    delivery_type: &str,
    promo: Option<String>,
) -> CliResult {
    let query = PriceQuery::parse(vehicle, distance, waiting, delivery_type, promo)?;
    let promo = match query.promo_code.as_deref() {
        Some(code) => SledStore::open(&config.storage.path)?.load_promo(code).await?,
        None => None,
    };

    let quote = pricing::price(&config.pricing, &query, promo.as_ref(), Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&quote.calculation)?);
    if let Some(reason) = quote.promo_error {
        println!("promo not applied: {reason}");
    }
    Ok(())
}

fn run_token(config: &Settings, participant: &str, role: &str, hours: i64) -> CliResult {
    let role: Role = role.parse()?;
    let token = TokenAuthority::new(&config.server.jwt_secret).issue(
        participant,
        role,
        chrono::Duration::hours(hours),
    )?;
    println!("{token}");
    Ok(())
}
