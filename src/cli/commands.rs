use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::hal::{DigitalInput, MonotonicClock};
use crate::modbus::{ModbusClient, ModbusClientTrait};
use crate::output::{create_formatter, DataFormatter};
use crate::services::station_service::register_map_for;
use crate::services::{open_rain_input, open_run_led, StationService};
use crate::slave::start_slave_server;

pub fn build_cli() -> Command {
    Command::new("meteo_bridge")
        .version(crate::VERSION)
        .about("Weather station Modbus RTU master and Modbus TCP slave")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to the station configuration file")
                .default_value("station.toml")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("DEVICE")
                .help("Serial port of the field bus (overrides config)")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("Field bus baud rate (overrides config)")
                .value_parser(clap::value_parser!(u32))
                .global(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Output format of snapshots and the register map")
                .value_parser(["console", "json", "csv"])
                .default_value("console")
                .global(true),
        )
        .subcommand(Command::new("run").about("Run the control loop and the Modbus TCP slave (default)"))
        .subcommand(
            Command::new("init-config")
                .about("Write a default configuration file")
                .arg(Arg::new("path").value_name("PATH").required(true))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Overwrite an existing file")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("poll-once").about("Poll every enabled device once and print the result"))
        .subcommand(Command::new("show-map").about("Print the register map served to the supervisory network"))
}

/// Reads the configuration file, falling back to defaults when it does not
/// exist, then applies the command line overrides.
pub fn load_config(matches: &ArgMatches) -> Result<Config> {
    let path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("station.toml");

    let mut config = if Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("Failed to load {}", path))?
    } else {
        warn!("⚠️  Configuration file {} not found, using defaults", path);
        Config::default()
    };

    if let Some(port) = matches.get_one::<String>("port") {
        info!("🔧 Serial port override: {}", port);
        config.serial.port = port.clone();
    }
    if let Some(baud) = matches.get_one::<u32>("baud") {
        info!("🔧 Baud rate override: {}", baud);
        config.serial.baud_rate = *baud;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn formatter_from(matches: &ArgMatches) -> Result<Box<dyn DataFormatter>> {
    let name = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("console");
    Ok(create_formatter(name)?)
}

/// Handles the one-shot subcommands. Returns `false` when the control loop
/// should run.
pub async fn handle_subcommands(matches: &ArgMatches) -> Result<bool> {
    if let Some(sub) = matches.subcommand_matches("init-config") {
        let path = sub
            .get_one::<String>("path")
            .context("init-config needs a path")?;
        if Path::new(path).exists() && !sub.get_flag("force") {
            bail!("{} already exists, use --force to overwrite it", path);
        }

        Config::default().save_to_file(path)?;
        println!("✅ Default configuration written to {}", path);
        return Ok(true);
    }

    if matches.subcommand_matches("show-map").is_some() {
        let config = load_config(matches)?;
        let formatter = formatter_from(matches)?;
        println!("{}", formatter.format_layout(register_map_for(&config).layout()));
        return Ok(true);
    }

    if matches.subcommand_matches("poll-once").is_some() {
        info!("🔍 Executing poll-once command...");
        let config = load_config(matches)?;
        let formatter = formatter_from(matches)?;

        let client: Arc<dyn ModbusClientTrait> = Arc::new(ModbusClient::new(&config.serial)?);
        let rain_input = if config.rain_gauge.enabled {
            match open_rain_input(&config.rain_gauge.input) {
                Ok(input) => Some(input),
                Err(e) => {
                    warn!("⚠️  Rain gauge skipped: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut station = StationService::new(config, client, Arc::new(MonotonicClock::new()), rain_input)?;
        station.poll_all().await?;
        println!("{}", formatter.format_snapshot(&station.registers().snapshot()?));
        return Ok(true);
    }

    Ok(false)
}

/// Runs the station until Ctrl-C: control loop on this task, slave server
/// on its own.
pub async fn run_station(config: Config, formatter: Box<dyn DataFormatter>) -> Result<()> {
    let client: Arc<dyn ModbusClientTrait> = Arc::new(ModbusClient::new(&config.serial)?);

    let rain_input: Option<Box<dyn DigitalInput>> = if config.rain_gauge.enabled {
        Some(open_rain_input(&config.rain_gauge.input)?)
    } else {
        None
    };

    let run_led = if config.run_led.enabled {
        match open_run_led(&config.run_led.output) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("⚠️  Run LED skipped: {}", e);
                None
            }
        }
    } else {
        None
    };

    let slave_config = config.slave_server.clone();
    let mut station = StationService::new(config, client, Arc::new(MonotonicClock::new()), rain_input)?;
    if let Some(output) = run_led {
        station = station.with_run_led(output);
    }

    let server = if slave_config.enabled {
        let (_, handle) = start_slave_server(slave_config.socket_addr()?, station.registers()).await?;
        Some(handle)
    } else {
        info!("⏸️  Modbus TCP slave disabled");
        None
    };

    station
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("❌ Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    if let Some(handle) = server {
        handle.abort();
    }

    println!("{}", formatter.format_snapshot(&station.registers().snapshot()?));
    info!("👋 Station stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let matches = build_cli().get_matches_from(vec![
            "meteo_bridge",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "/dev/ttyS3",
            "--baud",
            "19200",
            "show-map",
        ]);

        let config = load_config(&matches).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyS3");
        assert_eq!(config.serial.baud_rate, 19200);
    }

    #[tokio::test]
    async fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        let path = path.to_str().unwrap();

        let matches = build_cli().get_matches_from(vec!["meteo_bridge", "init-config", path]);
        assert!(handle_subcommands(&matches).await.unwrap());
        assert!(Config::from_file(path).is_ok());

        assert!(handle_subcommands(&matches).await.is_err());

        let forced = build_cli().get_matches_from(vec!["meteo_bridge", "init-config", path, "--force"]);
        assert!(handle_subcommands(&forced).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_is_not_a_one_shot_command() {
        let matches = build_cli().get_matches_from(vec!["meteo_bridge", "run"]);
        assert!(!handle_subcommands(&matches).await.unwrap());
    }
}
