use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabled::{Table, Tabled};

use sensonet::config::{self, Config, QuickModeConfig};
use sensonet::types::{DeviceFilter, EnergyQuery, Resolution, SystemStatus};
use sensonet::{
    Controller, HeatingParams, HotwaterParams, Param, RefreshingTokenSource, SensonetClient,
    Strategy, StrategyOutcome, TokenRefreshCallback, TokenSet,
};

#[derive(Parser)]
#[command(name = "sensonet")]
#[command(about = "A CLI for controlling Vaillant heat pumps through myVAILLANT")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a refresh token for later commands
    Login {
        /// Keycloak realm of the account
        #[arg(long, env = "SENSONET_REALM", default_value = "vaillant-germany-b2c")]
        realm: String,
        /// Refresh token; prompted for when omitted
        #[arg(long, env = "SENSONET_REFRESH_TOKEN")]
        refresh_token: Option<String>,
    },
    /// Remove stored credentials
    Logout,
    /// List the homes of the account
    Homes,
    /// Show hot water and zone state of a system
    Status {
        /// System ID (optional if only one home)
        #[arg(long)]
        system: Option<String>,
    },
    /// List the heat generators of a system
    Devices {
        #[arg(long)]
        system: Option<String>,
        /// all, primary, secondary or backup
        #[arg(long, default_value = "all")]
        filter: DeviceFilter,
    },
    /// Query energy buckets of one device
    Energy {
        #[arg(long)]
        system: Option<String>,
        /// Device UUID (defaults to the primary heat generator)
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value = "DOMESTIC_HOT_WATER")]
        operation_mode: String,
        #[arg(long, default_value = "CONSUMED_ELECTRICAL_ENERGY")]
        energy_type: String,
        /// HOUR, DAY or MONTH
        #[arg(long, default_value = "DAY")]
        resolution: Resolution,
        /// RFC 3339 timestamp, e.g. 2024-03-01T00:00:00+01:00
        #[arg(long, value_parser = parse_timestamp)]
        start: DateTime<FixedOffset>,
        #[arg(long, value_parser = parse_timestamp)]
        end: DateTime<FixedOffset>,
    },
    /// Show the current electrical power draw
    Power {
        #[arg(long)]
        system: Option<String>,
    },
    /// Hot water boost
    Boost {
        #[command(subcommand)]
        action: BoostAction,
    },
    /// Zone quick veto
    Veto {
        #[command(subcommand)]
        action: VetoAction,
    },
    /// Start or stop the override preferred by a strategy
    QuickMode {
        #[command(subcommand)]
        action: QuickModeAction,
    },
}

#[derive(Subcommand)]
enum BoostAction {
    Start {
        #[arg(long)]
        system: Option<String>,
        /// Hot water circuit index
        #[arg(long)]
        index: Option<u32>,
    },
    Stop {
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        index: Option<u32>,
    },
}

#[derive(Subcommand)]
enum VetoAction {
    Start {
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        zone: Option<u32>,
        /// Desired room temperature
        #[arg(long)]
        setpoint: Option<f64>,
        /// Hours
        #[arg(long)]
        duration: Option<f64>,
    },
    Stop {
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        zone: Option<u32>,
    },
}

#[derive(Subcommand)]
enum QuickModeAction {
    Start {
        #[arg(long)]
        system: Option<String>,
        /// hotwater, heating or hotwater-then-heating (overrides the config file)
        #[arg(long)]
        strategy: Option<Strategy>,
    },
    Stop {
        #[arg(long)]
        system: Option<String>,
    },
}

#[derive(Tabled)]
struct HomeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "System ID")]
    system_id: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct CircuitRow {
    #[tabled(rename = "Circuit")]
    circuit: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Temperature")]
    temperature: String,
    #[tabled(rename = "Setpoint")]
    setpoint: String,
    #[tabled(rename = "Special function")]
    special_function: String,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Device UUID")]
    uuid: String,
    #[tabled(rename = "Serial")]
    serial: String,
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Value (Wh)")]
    value: String,
}

/// Writes refreshed tokens back to the config file.
struct PersistTokens {
    path: PathBuf,
    config: Mutex<Config>,
}

impl TokenRefreshCallback for PersistTokens {
    fn on_tokens_refreshed(&self, tokens: &TokenSet) {
        let Ok(mut config) = self.config.lock() else {
            warn!("Config lock poisoned, refreshed tokens not saved");
            return;
        };
        config.set_tokens(tokens);
        if let Err(e) = config::save_config_to(&self.path, &config) {
            warn!("Failed to save refreshed tokens: {}", e);
        } else {
            debug!("Saved refreshed tokens");
        }
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

fn controller_for(path: PathBuf, config: Config) -> Result<Controller> {
    let tokens = config.tokens();
    let realm = config.realm.clone();
    let persist: Arc<dyn TokenRefreshCallback> = Arc::new(PersistTokens {
        path,
        config: Mutex::new(config),
    });
    let token_source = RefreshingTokenSource::new(tokens, &realm, Some(persist));
    let client = SensonetClient::new(Arc::new(token_source))?;
    Ok(Controller::new(client))
}

async fn resolve_system(controller: &Controller, system: Option<String>) -> Result<String> {
    if let Some(system) = system {
        return Ok(system);
    }
    let homes = controller.get_homes().await?;
    if homes.len() > 1 {
        return Err(anyhow::anyhow!(
            "Multiple homes found. Please specify --system."
        ));
    }
    Ok(homes[0].system_id.clone())
}

fn fmt_temp(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}°C", v))
        .unwrap_or_else(|| "-".to_string())
}

fn circuit_rows(status: &SystemStatus) -> Vec<CircuitRow> {
    let mut rows = Vec::new();
    for dhw in &status.state.dhw {
        let configuration = status.configuration.dhw.iter().find(|c| c.index == dhw.index);
        rows.push(CircuitRow {
            circuit: format!("Hot water {}", dhw.index),
            mode: configuration
                .map(|c| c.operation_mode_dhw.clone())
                .unwrap_or_default(),
            temperature: fmt_temp(Some(dhw.current_dhw_temperature)),
            setpoint: fmt_temp(configuration.map(|c| c.tapping_setpoint)),
            special_function: dhw.current_special_function.clone(),
        });
    }
    for hot_water in &status.state.domestic_hot_water {
        let configuration = status
            .configuration
            .domestic_hot_water
            .iter()
            .find(|c| c.index == hot_water.index);
        rows.push(CircuitRow {
            circuit: format!("Hot water {}", hot_water.index),
            mode: configuration
                .map(|c| c.operation_mode_domestic_hot_water.clone())
                .unwrap_or_default(),
            temperature: fmt_temp(Some(hot_water.current_domestic_hot_water_temperature)),
            setpoint: fmt_temp(configuration.map(|c| c.tapping_setpoint)),
            special_function: hot_water.current_special_function.clone(),
        });
    }
    for zone in &status.state.zones {
        let configuration = status.configuration.zones.iter().find(|c| c.index == zone.index);
        rows.push(CircuitRow {
            circuit: status.zone_name(zone.index),
            mode: configuration
                .map(|c| c.heating.operation_mode_heating.clone())
                .unwrap_or_default(),
            temperature: fmt_temp(zone.current_room_temperature),
            setpoint: fmt_temp(Some(zone.desired_room_temperature_setpoint)),
            special_function: zone.current_special_function.clone(),
        });
    }
    rows
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = config::get_config_path()?;

    match cli.command {
        Commands::Login {
            realm,
            refresh_token,
        } => {
            let refresh_token = match refresh_token {
                Some(token) => token,
                None => rpassword::prompt_password("Refresh token: ")
                    .context("Failed to read refresh token")?,
            };
            // Quick mode defaults survive a re-login.
            let quick_mode = config::load_config_from(&config_path)
                .ok()
                .and_then(|previous| previous.quick_mode);
            let config = Config {
                realm,
                access_token: String::new(),
                refresh_token,
                quick_mode,
            };
            // The first request exchanges the refresh token; the refresh
            // callback then writes the config file.
            let controller = controller_for(config_path, config)?;

            info!("Verifying credentials...");
            let homes = controller.get_homes().await?;
            println!("Logged in. {} home(s) found.", homes.len());
        }
        Commands::Logout => {
            config::clear_config_at(&config_path)?;
            println!("Logged out.");
        }
        command => {
            let config = config::load_config_from(&config_path)?;
            let quick_mode = config.quick_mode.clone().unwrap_or_default();
            let controller = controller_for(config_path, config)?;
            run(&controller, command, &quick_mode).await?;
        }
    }

    Ok(())
}

async fn run(controller: &Controller, command: Commands, quick_mode: &QuickModeConfig) -> Result<()> {
    match command {
        Commands::Login { .. } | Commands::Logout => {
            return Err(anyhow::anyhow!("login and logout run without a session"))
        }
        Commands::Homes => {
            let homes = controller.get_homes().await?;
            let rows: Vec<HomeRow> = homes
                .iter()
                .map(|home| HomeRow {
                    name: home.home_name.clone(),
                    system_id: home.system_id.clone(),
                    product: home.product_information.clone(),
                    firmware: home.firmware.version.clone(),
                    state: home.online_state.clone(),
                })
                .collect();
            println!("{}", Table::new(&rows));
        }
        Commands::Status { system } => {
            let system_id = resolve_system(controller, system).await?;
            let status = controller.get_system(&system_id).await?;
            let system = &status.state.system;
            println!(
                "Outdoor {:.1}°C, flow {:.1}°C, pressure {:.1} bar",
                system.outdoor_temperature, system.system_flow_temperature, system.system_water_pressure
            );
            println!("{}", Table::new(&circuit_rows(&status)));
            println!(
                "Quick mode: {}",
                controller.current_quick_mode(&system_id).await
            );
        }
        Commands::Devices { system, filter } => {
            let system_id = resolve_system(controller, system).await?;
            let devices = controller.get_device_data(&system_id, filter).await?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }
            let rows: Vec<DeviceRow> = devices
                .iter()
                .map(|d| DeviceRow {
                    role: d.role.as_str().to_string(),
                    product: d.device.product_name.clone(),
                    uuid: d.device.device_uuid.clone(),
                    serial: d.device.device_serial_number.clone(),
                })
                .collect();
            println!("{}", Table::new(&rows));
        }
        Commands::Energy {
            system,
            device,
            operation_mode,
            energy_type,
            resolution,
            start,
            end,
        } => {
            let system_id = resolve_system(controller, system).await?;
            let device_uuid = match device {
                Some(uuid) => uuid,
                None => controller
                    .get_device_data(&system_id, DeviceFilter::Primary)
                    .await?
                    .first()
                    .map(|d| d.device.device_uuid.clone())
                    .context("No primary heat generator found. Please specify --device.")?,
            };
            let query = EnergyQuery {
                system_id,
                device_uuid,
                operation_mode,
                energy_type,
                resolution,
                start,
                end,
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{spinner:.green} {msg}")?,
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message("Fetching energy data...");
            let result = controller.get_energy_data(&query).await;
            spinner.finish_and_clear();
            let energy = result?;

            let rows: Vec<BucketRow> = energy
                .data
                .iter()
                .map(|b| BucketRow {
                    start: b.start_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    end: b.end_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    value: format!("{:.1}", b.value),
                })
                .collect();
            println!("{}", Table::new(&rows));
            println!("Total: {:.1} Wh", energy.total_consumption);
        }
        Commands::Power { system } => {
            let system_id = resolve_system(controller, system).await?;
            let mpc = controller.get_mpc_data(&system_id).await?;
            for device in &mpc.devices {
                println!("{}: {:.0} W", device.device_id, device.current_power);
            }
            println!("Total: {:.0} W", mpc.total_power());
        }
        Commands::Boost { action } => match action {
            BoostAction::Start { system, index } => {
                let system_id = resolve_system(controller, system).await?;
                controller
                    .start_hot_water_boost(&system_id, Param::from(index))
                    .await?;
                println!("Hot water boost started.");
            }
            BoostAction::Stop { system, index } => {
                let system_id = resolve_system(controller, system).await?;
                controller
                    .stop_hot_water_boost(&system_id, Param::from(index))
                    .await?;
                println!("Hot water boost stopped.");
            }
        },
        Commands::Veto { action } => match action {
            VetoAction::Start {
                system,
                zone,
                setpoint,
                duration,
            } => {
                let system_id = resolve_system(controller, system).await?;
                controller
                    .start_zone_quick_veto(
                        &system_id,
                        Param::from(zone),
                        Param::from(setpoint),
                        Param::from(duration),
                    )
                    .await?;
                println!("Quick veto started.");
            }
            VetoAction::Stop { system, zone } => {
                let system_id = resolve_system(controller, system).await?;
                controller
                    .stop_zone_quick_veto(&system_id, Param::from(zone))
                    .await?;
                println!("Quick veto stopped.");
            }
        },
        Commands::QuickMode { action } => {
            let heating: HeatingParams = quick_mode.heating_params();
            let hotwater: HotwaterParams = quick_mode.hotwater_params();
            match action {
                QuickModeAction::Start { system, strategy } => {
                    let system_id = resolve_system(controller, system).await?;
                    let strategy = strategy.unwrap_or(quick_mode.strategy);
                    match controller
                        .start_strategy_based(&system_id, strategy, &heating, &hotwater)
                        .await?
                    {
                        StrategyOutcome::AlreadyActive(mode) => {
                            println!("Quick mode \"{}\" is already active.", mode)
                        }
                        StrategyOutcome::Active(mode) => println!("Quick mode: {}", mode),
                    }
                }
                QuickModeAction::Stop { system } => {
                    let system_id = resolve_system(controller, system).await?;
                    let stopped = controller
                        .stop_strategy_based(&system_id, &heating, &hotwater)
                        .await?;
                    println!("Stopped quick mode \"{}\".", stopped);
                }
            }
        }
    }

    Ok(())
}
