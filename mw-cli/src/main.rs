//! mwctl: command line control for SMB100A / SMBV100A sources
//!
//! Subcommands:
//! - `idn`, `limits`, `status`: identification and read-only state
//! - `off`, `on`: output control
//! - `cw`, `sweep`, `reset-sweep`: frequency and power settings
//! - `trigger`: trigger edge, source and manual pulses
//! - `reference`: LFO-driven FM reference
//! - `ports`: serial ports usable with `ASRL` addresses
//! - `config`: show or write the settings file

mod settings;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mw_driver::{enumerate_ports, DriverConfig, ReferenceSettings, SourceDriver, SweepRequest};
use mw_protocol::{BandwidthMode, Mode, ModulationShape, TriggerEdge};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

/// Control an R&S SMB100A / SMBV100A microwave source
#[derive(Parser, Debug)]
#[command(name = "mwctl")]
#[command(version)]
struct Args {
    /// Session address (TCPIP0::host::port::SOCKET, ASRL/dev/ttyUSB0::INSTR, SIM::SMBV100A)
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Settings file (defaults to ~/.config/mwctl/settings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Send *CLS and *RST after connecting
    #[arg(long, global = true)]
    reset: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the device identification
    Idn,

    /// Show the operating limits in effect
    Limits,

    /// Show output state, frequency and power
    Status,

    /// Stop the output
    Off,

    /// Start the output in the given mode
    On {
        #[arg(value_enum)]
        mode: OutputMode,
    },

    /// Switch to CW and set frequency and/or power
    Cw {
        /// Frequency in Hz
        #[arg(short, long, allow_negative_numbers = true)]
        frequency: Option<f64>,

        /// Power in dBm
        #[arg(short, long, allow_negative_numbers = true)]
        power: Option<f64>,
    },

    /// Program a stepped sweep
    Sweep {
        /// First frequency in Hz
        #[arg(long, requires_all = ["stop", "step"], allow_negative_numbers = true)]
        start: Option<f64>,

        /// Last frequency in Hz
        #[arg(long, requires_all = ["start", "step"], allow_negative_numbers = true)]
        stop: Option<f64>,

        /// Step in Hz
        #[arg(long, requires_all = ["start", "stop"], allow_negative_numbers = true)]
        step: Option<f64>,

        /// Power in dBm
        #[arg(short, long, allow_negative_numbers = true)]
        power: Option<f64>,
    },

    /// Rearm the sweep at its start
    ResetSweep,

    /// Trigger configuration and manual triggers
    Trigger {
        #[command(subcommand)]
        action: TriggerAction,
    },

    /// FM reference modulation
    Reference {
        #[command(subcommand)]
        action: ReferenceAction,
    },

    /// List serial ports
    Ports,

    /// Show the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TriggerAction {
    /// Trigger sweep steps from the external input
    External {
        #[arg(value_enum)]
        edge: Edge,
    },
    /// Trigger sweep steps with `trigger fire`
    Internal,
    /// Send one manual trigger
    Fire,
}

#[derive(Subcommand, Debug)]
enum ReferenceAction {
    /// Change reference settings (switches the reference off)
    Set {
        #[arg(long, value_enum)]
        shape: Option<Shape>,

        /// LFO frequency in Hz
        #[arg(long, allow_negative_numbers = true)]
        frequency: Option<f64>,

        #[arg(long, value_enum)]
        mode: Option<Bandwidth>,

        /// FM deviation in Hz
        #[arg(long, allow_negative_numbers = true)]
        deviation: Option<f64>,
    },
    /// Switch the LFO and FM paths on
    On,
    /// Switch the LFO and FM paths off
    Off,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OutputMode {
    Cw,
    Sweep,
}

impl From<OutputMode> for Mode {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Cw => Mode::ContinuousWave,
            OutputMode::Sweep => Mode::Sweep,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Edge {
    Rising,
    Falling,
}

impl From<Edge> for TriggerEdge {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Rising => TriggerEdge::Rising,
            Edge::Falling => TriggerEdge::Falling,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Shape {
    Sine,
    Square,
    Pulse,
    Triangle,
    Trapezoid,
}

impl From<Shape> for ModulationShape {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Sine => ModulationShape::Sine,
            Shape::Square => ModulationShape::Square,
            Shape::Pulse => ModulationShape::Pulse,
            Shape::Triangle => ModulationShape::Triangle,
            Shape::Trapezoid => ModulationShape::Trapezoid,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Bandwidth {
    /// High modulation bandwidth
    High,
    /// Low phase noise
    LowNoise,
}

impl From<Bandwidth> for BandwidthMode {
    fn from(mode: Bandwidth) -> Self {
        match mode {
            Bandwidth::High => BandwidthMode::HighBandwidth,
            Bandwidth::LowNoise => BandwidthMode::LowNoise,
        }
    }
}

/// Driver settings for one run; the device keeps its state unless `reset`
fn driver_config(settings: &Settings, reset: bool) -> DriverConfig {
    DriverConfig {
        reset_on_connect: reset,
        ..settings.driver.clone()
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mwctl=info,mw_driver=info,mw_protocol=info,mw_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref());
    if let Some(address) = args.address {
        settings.driver.address = address;
    }

    match args.command {
        Command::Ports => {
            for port in enumerate_ports()? {
                println!("{}  {}", port.address(), port.description());
            }
            Ok(())
        }
        Command::Config { write } => {
            if write {
                let path = match args.config.or_else(Settings::default_path) {
                    Some(path) => path,
                    None => bail!("Could not determine settings path"),
                };
                settings.save(&path)?;
                info!("Settings written to {}", path.display());
            }
            print_json(&settings)
        }
        command => run_device_command(command, &driver_config(&settings, args.reset)).await,
    }
}

async fn run_device_command(command: Command, config: &DriverConfig) -> Result<()> {
    let mut driver = SourceDriver::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.address))?;

    let cancel = driver.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let result = execute(&mut driver, command).await;
    driver.disconnect().await?;
    result
}

async fn execute(driver: &mut SourceDriver, command: Command) -> Result<()> {
    match command {
        Command::Idn => print_json(driver.identity()),
        Command::Limits => print_json(driver.limits()),
        Command::Status => {
            let status = driver.status().await?;
            let readback = driver.reader().readback().await?;
            print_json(&serde_json::json!({
                "status": status,
                "effective_mode": status.effective_mode(),
                "readback": readback,
            }))
        }
        Command::Off => Ok(driver.off().await?),
        Command::On { mode } => print_json(&driver.turn_on(mode.into()).await?),
        Command::Cw { frequency, power } => {
            if frequency.is_none() && power.is_none() {
                bail!("Nothing to set: give --frequency and/or --power");
            }
            print_json(&driver.set_cw(frequency, power).await?)
        }
        Command::Sweep {
            start,
            stop,
            step,
            power,
        } => {
            let request = SweepRequest {
                start,
                stop,
                step,
                power,
            };
            print_json(&driver.set_sweep(request).await?)
        }
        Command::ResetSweep => Ok(driver.reset_sweep_position().await?),
        Command::Trigger { action } => match action {
            TriggerAction::External { edge } => {
                print_json(&driver.set_external_trigger(edge.into()).await?)
            }
            TriggerAction::Internal => Ok(driver.set_internal_trigger().await?),
            TriggerAction::Fire => Ok(driver.fire_trigger().await?),
        },
        Command::Reference { action } => match action {
            ReferenceAction::Set {
                shape,
                frequency,
                mode,
                deviation,
            } => {
                let settings = ReferenceSettings {
                    shape: shape.map(Into::into),
                    center_frequency: frequency,
                    bandwidth_mode: mode.map(Into::into),
                    deviation,
                };
                print_json(&driver.set_reference(settings).await?)
            }
            ReferenceAction::On => Ok(driver.enable_reference().await?),
            ReferenceAction::Off => Ok(driver.disable_reference().await?),
        },
        other => bail!("{:?} does not talk to a device", other),
    }
}
