mod collectors;
mod config;
mod format;
mod http;
mod metrics;
mod rate;
mod registry;
mod state;

use axum::serve;
use clap::Parser;
use collectors::{now_unix_ms, run_cycle};
use collectors::probe::{HttpTransport, Prober};
use collectors::system::HostCollector;
use config::Config;
use http::HttpAppState;
use metrics::Metrics;
use rate::RateSampler;
use registry::{AppRegistry, MemoryRegistry};
use state::State;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "zamosd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let transport = match HttpTransport::new(&cfg.probe) {
        Ok(t) => t,
        Err(err) => {
            error!(error = %err, "failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let prober = Arc::new(Prober::new(transport, cfg.probe.timeout()));

    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        probe_timeout_ms = prober.timeout().as_millis() as u64,
        apps = cfg.apps.len(),
        "starting zamosd"
    );

    let now_ms = now_unix_ms();
    let shared_state = Arc::new(RwLock::new(State::new(now_ms / 1000)));
    let registry: Arc<dyn AppRegistry> =
        Arc::new(MemoryRegistry::from_config(&cfg.apps, now_ms / 1000));
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let listen = cfg.listen.clone();
        let app_state = HttpAppState {
            metrics: metrics.clone(),
            state: shared_state.clone(),
            registry: registry.clone(),
            prober: prober.clone(),
        };
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(app_state);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to bind HTTP listener");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let collector_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let shared_state = shared_state.clone();
        let registry = registry.clone();
        let prober = prober.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut host = HostCollector::new(cfg.metrics.clone());
            let sampler = RateSampler::new();
            let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("shutdown signal received, stopping poll loop");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot = run_cycle(
                            host.collect(),
                            &sampler,
                            prober.as_ref(),
                            registry.as_ref(),
                            metrics.as_ref(),
                            shared_state.as_ref(),
                        )
                        .await;

                        debug!(
                            cycle = snapshot.collect_cycles,
                            apps_online = snapshot.apps.online_count(),
                            rx_bytes_per_sec = snapshot.network.rx_bytes_per_sec,
                            tx_bytes_per_sec = snapshot.network.tx_bytes_per_sec,
                            "poll cycle finished"
                        );
                    }
                }
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");

    let _ = shutdown_tx.send(true);

    let _ = collector_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
