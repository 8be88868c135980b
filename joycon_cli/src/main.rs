use clap::{Args, Parser, Subcommand};
use joycon_core::controller::rumble::Rumble;
use joycon_core::controller::state::State;
use joycon_core::joycon::{JoyCon, JoyConConfig};
use joycon_core::registry::Registry;
use joycon_device::device::{DeviceDescriptor, Devices};
use joycon_device::transport::HidTransport;
use std::future::Future;
use std::time::Duration;
use tokio::{signal, sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List connected Joy-Cons
    List,
    /// Print firmware and address of connected Joy-Cons
    Info(Target),
    /// Initialize Joy-Cons and print their state until interrupted
    Run {
        #[command(flatten)]
        target: Target,
        /// Print interval in milliseconds
        #[arg(long, default_value_t = 200)]
        interval: u64,
        /// Player lights pattern (low nibble: solid, high nibble: flashing)
        #[arg(long, default_value_t = 0b0000_0001)]
        player_lights: u8,
    },
    /// Vibrate a Joy-Con
    Rumble {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value_t = 160.0)]
        low_freq: f32,
        #[arg(long, default_value_t = 320.0)]
        high_freq: f32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        /// Duration in milliseconds
        #[arg(long, default_value_t = 500)]
        duration: u64,
    },
}

#[derive(Args)]
struct Target {
    /// Only use the Joy-Con with this serial number
    #[arg(long)]
    serial: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let module_filter = tracing_subscriber::filter::Targets::new()
        .with_target("joycon_core", tracing::Level::DEBUG)
        .with_target("joycon_device", tracing::Level::DEBUG)
        .with_target("joycon_cli", tracing::Level::TRACE);
    // Conditionally sets event format between debug/release mode.
    #[cfg(debug_assertions)]
    let event_format = tracing_subscriber::fmt::format();
    #[cfg(not(debug_assertions))]
    let event_format = tracing_subscriber::fmt::format().json();
    let subscriber = tracing_subscriber::registry()
        .with(module_filter)
        .with(tracing_subscriber::fmt::Layer::default().event_format(event_format));
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Cli::parse();
    match args.command {
        Cmd::List => {
            let devices = Devices::new()?;
            for descriptor in devices.discover() {
                println!(
                    "{}\t{}\t{}",
                    descriptor.side.name(),
                    descriptor.serial_number.as_deref().unwrap_or("-"),
                    descriptor.path_lossy()
                );
            }
        }
        Cmd::Info(target) => {
            let devices = Devices::new()?;
            for descriptor in select(&devices, &target)? {
                let joycon = open(&devices, &descriptor, JoyConConfig::default()).await?;
                let info = joycon.device_info().await;
                joycon.dispose().await;
                let info = info?;
                println!(
                    "{}\tfirmware {}\t{}",
                    descriptor.side.name(),
                    info.firmware_version_string(),
                    info.mac_address
                );
            }
        }
        Cmd::Run {
            target,
            interval,
            player_lights,
        } => {
            let config = JoyConConfig {
                player_lights,
                ..Default::default()
            };
            run(
                signal::ctrl_c(),
                target,
                config,
                Duration::from_millis(interval.max(1)),
            )
            .await?
        }
        Cmd::Rumble {
            target,
            low_freq,
            high_freq,
            amplitude,
            duration,
        } => {
            let devices = Devices::new()?;
            let descriptor = select(&devices, &target)?
                .into_iter()
                .next()
                .ok_or(anyhow::anyhow!("no Joy-Con found"))?;
            let joycon = open(&devices, &descriptor, JoyConConfig::default()).await?;
            let rumble = Rumble::new(low_freq, high_freq, amplitude, amplitude);
            let res = async {
                joycon.rumble(rumble).await?;
                time::sleep(Duration::from_millis(duration)).await;
                joycon.stop_rumble().await
            }
            .await;
            joycon.dispose().await;
            res?;
        }
    }

    Ok(())
}

fn select(devices: &Devices, target: &Target) -> anyhow::Result<Vec<DeviceDescriptor>> {
    let descriptors: Vec<DeviceDescriptor> = devices
        .discover()
        .into_iter()
        .filter(|descriptor| match &target.serial {
            Some(serial) => descriptor.serial_number.as_ref() == Some(serial),
            None => true,
        })
        .collect();
    if descriptors.is_empty() {
        anyhow::bail!("no Joy-Con found");
    }
    Ok(descriptors)
}

async fn open(
    devices: &Devices,
    descriptor: &DeviceDescriptor,
    config: JoyConConfig,
) -> anyhow::Result<JoyCon<HidTransport>> {
    let transport = devices.open(descriptor)?;
    Ok(JoyCon::create(transport, descriptor.product_id, config).await?)
}

async fn run(
    shutdown: impl Future,
    target: Target,
    config: JoyConConfig,
    interval: Duration,
) -> anyhow::Result<()> {
    let shutdown_token = CancellationToken::new();
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

    tracing::info!("discovering Joy-Cons...");
    let devices = Devices::new()?;
    let mut registry = Registry::new();
    for descriptor in select(&devices, &target)? {
        let joycon = match open(&devices, &descriptor, config.clone()).await {
            Ok(joycon) => joycon,
            Err(err) => {
                tracing::error!("failed to initialize {}: {}", descriptor.path_lossy(), err);
                continue;
            }
        };
        // Relay controller events into the log until shutdown.
        let mut events = joycon.events().await?;
        tokio::spawn({
            let shutdown_token = shutdown_token.clone();
            let shutdown_complete_tx = shutdown_complete_tx.clone();
            let side = descriptor.side;
            async move {
                let _shutdown_complete_tx = shutdown_complete_tx;
                loop {
                    tokio::select! {
                        evt = events.recv() => match evt {
                            Some(evt) => tracing::info!("{}: {}", side.name(), evt),
                            None => break,
                        },
                        _ = shutdown_token.cancelled() => break,
                    }
                }
            }
        });
        if let Some(replaced) = registry.insert(descriptor.path_lossy(), joycon) {
            replaced.dispose().await;
        }
    }
    if registry.is_empty() {
        anyhow::bail!("no Joy-Con could be initialized");
    }

    tokio::pin!(shutdown);
    let mut ticker = time::interval(interval);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                for (path, joycon) in registry.iter() {
                    if let Some(state) = joycon.latest_state() {
                        println!("{} {}\t{}", joycon.side().name(), path, format_state(&state));
                    }
                }
            }
        }
    }
    tracing::info!("shutdown signal received, terminating...");

    shutdown_token.cancel();
    // Drop final `Sender` of `shutdown_complete_tx` so the `Receiver` below can complete.
    drop(shutdown_complete_tx);

    tracing::info!("disposing Joy-Cons...");
    registry.dispose_all().await;

    tracing::info!("waiting for the background tasks to finish processing...");
    let _ = shutdown_complete_rx.recv().await;

    tracing::info!("shutdown completed.");
    Ok(())
}

fn format_state(state: &State) -> String {
    let buttons: Vec<String> = state
        .buttons
        .pressed()
        .map(|button| button.to_string())
        .collect();
    let imu = state.latest_imu_sample();
    format!(
        "stick ({:+.2}, {:+.2})  accel ({:+.2}, {:+.2}, {:+.2})  gyro ({:+.1}, {:+.1}, {:+.1})  battery {}  [{}]",
        state.stick.x,
        state.stick.y,
        imu.acceleration.x,
        imu.acceleration.y,
        imu.acceleration.z,
        imu.angular_velocity.x,
        imu.angular_velocity.y,
        imu.angular_velocity.z,
        state.battery,
        buttons.join(" ")
    )
}
