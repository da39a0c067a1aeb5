use std::time::Instant;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use padbridge::bridge::Bridge;
use padbridge::cli::Args;
use padbridge::config::BridgeConfig;
use padbridge::console::spawn_console_reader;
use padbridge::controller::event_collector::GilrsCollector;
use padbridge::controller::InputBackend;
use padbridge::serial::port_registry::PortRegistry;
use padbridge::serial::uart::SerialPortProvider;
use padbridge::session::SessionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.verbose)?;

    let mut config = BridgeConfig::load(args.config.as_deref())?;
    config.apply_args(&args);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    info!("Initializing controller subsystem");
    let mut collector = GilrsCollector::create()?;

    if args.list_controllers {
        list_controllers(&mut collector);
        return Ok(());
    }

    let policy = config.port_policy();
    let registry = PortRegistry::new(policy, config.explicit_mappings()?, config.ports.clone());
    info!(
        "Pairing: auto pairing {}, port discovery {}",
        if policy.auto_pairing { "on" } else { "off" },
        if policy.auto_discovery { "on" } else { "off" }
    );

    let manager = SessionManager::new(
        config.session_settings(),
        registry,
        config.layout_overrides(),
    );
    let bridge = Bridge::create(
        Box::new(collector),
        Box::new(SerialPortProvider),
        config.port_filter(),
        manager,
        config.scan_interval(),
    )
    .start(Instant::now());

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping"),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    let _console = spawn_console_reader(command_tx)
        .map_err(|e| eyre!("Failed to start console reader: {}", e))?;
    info!("Commands: z = zero sticks, x <instance> = toggle layout, s = status, q = quit");

    tokio::task::block_in_place(move || bridge.run(token, command_rx));

    info!("Bridge stopped");
    Ok(())
}

fn list_controllers(collector: &mut GilrsCollector) {
    let devices = collector.enumerate();
    if devices.is_empty() {
        println!("No controllers detected.");
        return;
    }
    println!("{:<6} {:<34} Name", "Index", "GUID");
    for device in devices {
        println!("{:<6} {:<34} {}", device.index, device.guid, device.name);
    }
}

fn setup(verbose: u8) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(verbose);
    Ok(())
}

fn setup_logging_env(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
