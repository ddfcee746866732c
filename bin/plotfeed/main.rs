use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use plotfeed::{load_config_or_default, AppConfig, DataReceiver, ReceiverEvent, Sample};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textplots::{Chart, Plot, Shape};

/// How many of the most recent samples the terminal plot shows.
const PLOT_WINDOW: usize = 200;

/// Headless receiver for the plotfeed wire protocol
#[derive(Parser, Debug)]
#[command(name = "plotfeed")]
#[command(about = "Receive timestamped samples over TCP and plot them in the terminal", long_about = None)]
struct Args {
    /// Path to configuration file (optional, defaults to plotfeed.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen for an inbound sender
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Dial out to a sender
    Connect {
        /// Peer host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Peer port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .unwrap_or_else(|| config.logging.log_level.clone());
    env_logger::Builder::from_env(Env::default().default_filter_or(&log_level)).init();

    let mut receiver = build_receiver(&config)?;
    match &args.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.network.listen_port);
            receiver.start_server(port)?;
            info!("Serving on port {}", receiver.local_port().unwrap_or(port));
        }
        Command::Connect { host, port } => {
            let host = host.clone().unwrap_or(config.network.host.clone());
            let port = port.unwrap_or(config.network.connect_port);
            receiver.connect_to_host(&host, port)?;
        }
    }

    let shutdown = setup_shutdown_handler();
    run_plot_loop(&receiver, &shutdown);

    info!("Shutting down");
    receiver.disconnect();
    Ok(())
}

fn build_receiver(config: &AppConfig) -> Result<DataReceiver, plotfeed::IngestError> {
    DataReceiver::builder()
        .max_queue_capacity(config.ingest.max_queue_capacity)
        .tick_interval(Duration::from_millis(config.ingest.tick_interval_ms))
        .build()
}

fn setup_shutdown_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Failed to install Ctrl-C handler: {e}");
    }
    shutdown
}

/// Consumer side of the snapshot hand-off: wait for a new-data notification,
/// take a snapshot, clear, render.
fn run_plot_loop(receiver: &DataReceiver, shutdown: &AtomicBool) {
    let events = receiver.events();
    let mut window: VecDeque<Sample> = VecDeque::with_capacity(PLOT_WINDOW);

    while !shutdown.load(Ordering::Relaxed) {
        let event = match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match event {
            ReceiverEvent::NewDataAvailable => {
                let samples = receiver.snapshot();
                receiver.clear();
                for sample in samples {
                    if window.len() == PLOT_WINDOW {
                        window.pop_front();
                    }
                    window.push_back(sample);
                }
                render(&window);
            }
            ReceiverEvent::ConnectionStatusChanged(connected) => {
                if connected {
                    info!("Peer connected");
                } else {
                    info!("Peer disconnected");
                }
            }
            ReceiverEvent::Error(message) => error!("{message}"),
        }
    }
}

fn render(window: &VecDeque<Sample>) {
    if window.len() < 2 {
        return;
    }

    let points: Vec<(f32, f32)> = window
        .iter()
        .map(|s| (s.timestamp as f32, s.value))
        .collect();
    let x_min = points.first().map(|p| p.0).unwrap_or(0.0);
    let x_max = points.last().map(|p| p.0).unwrap_or(1.0);
    if x_max <= x_min {
        return;
    }

    // Clear screen and redraw in place.
    print!("\x1b[2J\x1b[H");
    println!(
        "plotfeed | {} samples in window | t = {:.3} .. {:.3}",
        window.len(),
        x_min,
        x_max
    );
    Chart::new(160, 60, x_min, x_max)
        .lineplot(&Shape::Lines(&points))
        .display();
}
