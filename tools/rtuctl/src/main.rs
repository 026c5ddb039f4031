//! rtuctl - Modbus RTU line tool
//!
//! Runs JSON request files against a slave, probes a bus for responders,
//! measures line throughput and dumps raw line traffic.

mod bandwidth;
mod config;
mod exec;
mod monitor;
mod probe;
mod records;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::config_loader::get_config_value;
use common::logging::{self, LogConfig};
use voltage_rtu::{Addr, BaudRate, Parity};

use crate::config::RtuctlConfig;

#[derive(Parser)]
#[command(name = "rtuctl")]
#[command(about = "Modbus RTU master line tool")]
#[command(long_about = "Modbus RTU master line tool

Commands:
  exec        Run a JSON request array and print the results
  probe       Look for slaves answering on the bus
  bandwidth   Loop a request array and report line throughput
  monitor     Dump raw line traffic
  set-slave   Rewrite the slave id of JSON requests (stdin -> stdout)
  tlog-dump   Print the value bytes of JSON records as text
  config      Show the effective configuration

Examples:
  rtuctl exec -d /dev/ttyUSB0 -i requests.json
  rtuctl probe -d /dev/ttyUSB0 -s 17
  rtuctl set-slave -s 3 < requests.json > requests-3.json")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (default: ./rtuctl.yaml if present)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON request array and print the results
    Exec {
        /// Serial device
        #[arg(short, long)]
        device: Option<String>,

        /// Input JSON file, `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Output JSON file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Baud rate
        #[arg(short = 'r', long = "rate")]
        rate: Option<BaudRate>,

        /// Parity: N, O or E
        #[arg(short, long)]
        parity: Option<Parity>,
    },

    /// Read holding register 0 of one slave, or of every slave
    Probe {
        /// Serial device
        #[arg(short, long)]
        device: Option<String>,

        /// Only probe this slave
        #[arg(short, long)]
        slave: Option<Addr>,
    },

    /// Loop a request array and report rx/tx throughput
    Bandwidth {
        /// Serial device
        #[arg(short, long)]
        device: Option<String>,

        /// Input JSON file, `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Report window in seconds
        #[arg(short = 't', long = "window", default_value_t = 1)]
        window: u64,
    },

    /// Print everything received on the line
    Monitor {
        /// Serial device
        #[arg(short, long)]
        device: Option<String>,

        /// Raw text instead of a hex table
        #[arg(short, long)]
        text: bool,
    },

    /// Rewrite every `slave` field of the JSON document on stdin
    SetSlave {
        /// New slave id
        #[arg(short, long)]
        slave: Addr,
    },

    /// Print the `value` bytes of JSON records on stdin as characters
    TlogDump,

    /// Show the effective configuration as YAML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = RtuctlConfig::load(cli.config.as_deref())?;

    let level = get_config_value(cli.log_level.clone(), "RTUCTL_LOG", config.log_level.clone());
    logging::init_with_config(LogConfig {
        console_level: level.parse().unwrap_or(tracing::Level::INFO),
        ansi: !cli.no_color,
        ..Default::default()
    })
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    tracing::debug!("log filter: {}", logging::get_log_level());

    if let Err(e) = run(cli.command, &config) {
        eprintln!("{} {:#}", "ERROR".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(command: Commands, config: &RtuctlConfig) -> Result<()> {
    match command {
        Commands::Exec {
            device,
            input,
            output,
            rate,
            parity,
        } => {
            let mut serial = config.serial;
            if let Some(rate) = rate {
                serial.baud_rate = rate;
            }
            if let Some(parity) = parity {
                serial.parity = parity;
            }
            exec::run(
                config.device(device.as_deref())?,
                serial,
                &input,
                output.as_deref(),
            )
        },
        Commands::Probe { device, slave } => probe::run(
            config.device(device.as_deref())?,
            config.serial,
            slave,
            config.probe_timeout_ms,
        ),
        Commands::Bandwidth {
            device,
            input,
            window,
        } => bandwidth::run(
            config.device(device.as_deref())?,
            config.serial,
            &input,
            window,
        ),
        Commands::Monitor { device, text } => {
            monitor::run(config.device(device.as_deref())?, config.serial, text)
        },
        Commands::SetSlave { slave } => records::set_slave(slave),
        Commands::TlogDump => records::tlog_dump(),
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        },
    }
}
