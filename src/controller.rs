use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::Cache;
use crate::client::SensonetClient;
use crate::error::{Error, Result};
use crate::quickmode::{QuickMode, QuickModeTracker};
use crate::strategy::{which_override, HeatingParams, HotwaterParams, Override, Strategy};
use crate::types::{
    DeviceAndInfo, DeviceFilter, EnergyData, EnergyQuery, Home, MpcData, Param,
    SystemAndDevices, SystemAndMpcData, SystemAndStatus, SystemStatus,
};

/// Freshness windows and quick mode hysteresis.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub homes_ttl: Duration,
    pub systems_ttl: Duration,
    pub devices_ttl: Duration,
    pub mpc_ttl: Duration,
    /// How long remote observations are ignored after a local start or
    /// stop. `None` uses `systems_ttl`.
    pub quick_mode_debounce: Option<Duration>,
    /// How long an `Idle` quick mode outlives a remote "nothing active".
    pub idle_grace: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            homes_ttl: Duration::from_secs(30 * 60),
            systems_ttl: Duration::from_secs(90),
            devices_ttl: Duration::from_secs(30 * 60),
            mpc_ttl: Duration::from_secs(90),
            quick_mode_debounce: None,
            idle_grace: Duration::from_secs(10 * 60),
        }
    }
}

/// Result of a strategy-based start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// A quick mode was already tracked; nothing was sent.
    AlreadyActive(QuickMode),
    /// The mode now tracked; `Idle` when no override was eligible.
    Active(QuickMode),
}

impl StrategyOutcome {
    pub fn mode(&self) -> QuickMode {
        match self {
            StrategyOutcome::AlreadyActive(mode) | StrategyOutcome::Active(mode) => *mode,
        }
    }
}

/// One quick mode tracker per system ID, created on first use.
#[derive(Debug)]
struct QuickModes {
    debounce: Duration,
    idle_grace: Duration,
    trackers: HashMap<String, QuickModeTracker>,
}

impl QuickModes {
    fn new(debounce: Duration, idle_grace: Duration) -> Self {
        Self {
            debounce,
            idle_grace,
            trackers: HashMap::new(),
        }
    }

    fn tracker(&mut self, system_id: &str) -> &mut QuickModeTracker {
        let (debounce, idle_grace) = (self.debounce, self.idle_grace);
        self.trackers
            .entry(system_id.to_string())
            .or_insert_with(|| QuickModeTracker::new(debounce, idle_grace))
    }

    fn current(&self, system_id: &str) -> QuickMode {
        self.trackers
            .get(system_id)
            .map(QuickModeTracker::current)
            .unwrap_or_default()
    }
}

/// Cached, quick-mode aware access to one account.
///
/// Reads go through per-entity caches. Commands go straight to the API and
/// update the tracked quick mode of their system when they succeed. Each
/// system is tracked on its own. Strategy-based calls assume a single
/// logical caller per system; concurrent starts from separate controllers
/// may race.
pub struct Controller {
    client: Arc<SensonetClient>,
    homes: Arc<Cache<Vec<Home>>>,
    systems: Cache<Vec<SystemAndStatus>>,
    devices: Cache<Vec<SystemAndDevices>>,
    mpc: Cache<Vec<SystemAndMpcData>>,
    quick_modes: Arc<Mutex<QuickModes>>,
}

impl Controller {
    pub fn new(client: SensonetClient) -> Self {
        Self::with_options(client, ControllerOptions::default())
    }

    pub fn with_options(client: SensonetClient, options: ControllerOptions) -> Self {
        let client = Arc::new(client);
        let debounce = options.quick_mode_debounce.unwrap_or(options.systems_ttl);
        let quick_modes = Arc::new(Mutex::new(QuickModes::new(debounce, options.idle_grace)));

        let homes = {
            let client = Arc::clone(&client);
            Arc::new(Cache::new("homes", options.homes_ttl, move || {
                let client = Arc::clone(&client);
                async move { client.get_homes().await }
            }))
        };

        let systems = {
            let client = Arc::clone(&client);
            let homes = Arc::clone(&homes);
            let quick_modes = Arc::clone(&quick_modes);
            Cache::new("systems", options.systems_ttl, move || {
                let client = Arc::clone(&client);
                let homes = Arc::clone(&homes);
                let quick_modes = Arc::clone(&quick_modes);
                async move {
                    let homes = homes.get().await?;
                    let mut systems = Vec::with_capacity(homes.len());
                    for home in &homes {
                        let status = client.get_system(&home.system_id).await?;
                        quick_modes
                            .lock()
                            .await
                            .tracker(&home.system_id)
                            .reconcile(&status, Instant::now());
                        systems.push(SystemAndStatus {
                            system_id: home.system_id.clone(),
                            status,
                        });
                    }
                    Ok(systems)
                }
            })
        };

        let devices = {
            let client = Arc::clone(&client);
            let homes = Arc::clone(&homes);
            Cache::new("devices", options.devices_ttl, move || {
                let client = Arc::clone(&client);
                let homes = Arc::clone(&homes);
                async move {
                    let mut all = Vec::new();
                    for home in homes.get().await?.iter() {
                        all.push(SystemAndDevices {
                            system_id: home.system_id.clone(),
                            devices: client.get_system_devices(&home.system_id).await?,
                        });
                    }
                    Ok(all)
                }
            })
        };

        let mpc = {
            let client = Arc::clone(&client);
            let homes = Arc::clone(&homes);
            Cache::new("mpc", options.mpc_ttl, move || {
                let client = Arc::clone(&client);
                let homes = Arc::clone(&homes);
                async move {
                    let mut all = Vec::new();
                    for home in homes.get().await?.iter() {
                        all.push(SystemAndMpcData {
                            system_id: home.system_id.clone(),
                            mpc: client.get_mpc_data(&home.system_id).await?,
                        });
                    }
                    Ok(all)
                }
            })
        };

        Self {
            client,
            homes,
            systems,
            devices,
            mpc,
            quick_modes,
        }
    }

    pub fn client(&self) -> &SensonetClient {
        &self.client
    }

    pub async fn get_homes(&self) -> Result<Vec<Home>> {
        let homes = self.homes.get().await?;
        if homes.is_empty() {
            return Err(Error::EmptyResult("no homes found".to_string()));
        }
        Ok(homes)
    }

    /// Cached status of one system. An account without systems is an
    /// `EmptyResult`, an unknown ID among existing systems is `NotFound`.
    pub async fn get_system(&self, system_id: &str) -> Result<SystemStatus> {
        let systems = self.systems.get().await?;
        if systems.is_empty() {
            return Err(Error::EmptyResult("no systems found".to_string()));
        }
        systems
            .into_iter()
            .find(|s| s.system_id == system_id)
            .map(|s| s.status)
            .ok_or_else(|| Error::NotFound(format!("system {}", system_id)))
    }

    pub async fn get_device_data(
        &self,
        system_id: &str,
        filter: DeviceFilter,
    ) -> Result<Vec<DeviceAndInfo>> {
        let devices = self.devices.get().await?;
        if devices.is_empty() {
            return Err(Error::EmptyResult("no systems found".to_string()));
        }
        devices
            .iter()
            .find(|s| s.system_id == system_id)
            .map(|s| s.devices.classify(filter))
            .ok_or_else(|| Error::NotFound(format!("devices of system {}", system_id)))
    }

    /// Energy buckets are not cached.
    pub async fn get_energy_data(&self, query: &EnergyQuery) -> Result<EnergyData> {
        self.client.get_energy_data(query).await
    }

    pub async fn get_mpc_data(&self, system_id: &str) -> Result<MpcData> {
        let mpc = self.mpc.get().await?;
        if mpc.is_empty() {
            return Err(Error::EmptyResult("no systems found".to_string()));
        }
        mpc.into_iter()
            .find(|s| s.system_id == system_id)
            .map(|s| s.mpc)
            .ok_or_else(|| Error::NotFound(format!("power data of system {}", system_id)))
    }

    /// Quick mode tracked for `system_id`; `None` for a system never seen.
    pub async fn current_quick_mode(&self, system_id: &str) -> QuickMode {
        self.quick_modes.lock().await.current(system_id)
    }

    /// Drops every cached value.
    pub async fn invalidate(&self) {
        self.homes.reset().await;
        self.systems.reset().await;
        self.devices.reset().await;
        self.mpc.reset().await;
    }

    pub async fn start_hot_water_boost(&self, system_id: &str, index: Param<u32>) -> Result<()> {
        self.client.start_hot_water_boost(system_id, index).await?;
        self.quick_modes
            .lock()
            .await
            .tracker(system_id)
            .mark_started(QuickMode::Hotwater, Instant::now());
        Ok(())
    }

    pub async fn stop_hot_water_boost(&self, system_id: &str, index: Param<u32>) -> Result<()> {
        self.client.stop_hot_water_boost(system_id, index).await?;
        self.clear_unless(system_id, QuickMode::Heating).await;
        Ok(())
    }

    pub async fn start_zone_quick_veto(
        &self,
        system_id: &str,
        zone: Param<u32>,
        setpoint: Param<f64>,
        duration: Param<f64>,
    ) -> Result<()> {
        self.client
            .start_zone_quick_veto(system_id, zone, setpoint, duration)
            .await?;
        let mut quick_modes = self.quick_modes.lock().await;
        let tracker = quick_modes.tracker(system_id);
        if tracker.current() != QuickMode::Hotwater {
            tracker.mark_started(QuickMode::Heating, Instant::now());
        }
        Ok(())
    }

    pub async fn stop_zone_quick_veto(&self, system_id: &str, zone: Param<u32>) -> Result<()> {
        self.client.stop_zone_quick_veto(system_id, zone).await?;
        self.clear_unless(system_id, QuickMode::Hotwater).await;
        Ok(())
    }

    /// Clears the tracked mode after a successful stop, unless the other
    /// override is the one being tracked.
    async fn clear_unless(&self, system_id: &str, other: QuickMode) {
        {
            let mut quick_modes = self.quick_modes.lock().await;
            let tracker = quick_modes.tracker(system_id);
            if tracker.current() == other {
                debug!("Keeping tracked quick mode \"{}\"", other);
                return;
            }
            tracker.mark_stopped(Instant::now());
        }
        self.systems.reset().await;
    }

    /// Starts the override `strategy` prefers, unless one is already
    /// tracked for this client.
    pub async fn start_strategy_based(
        &self,
        system_id: &str,
        strategy: Strategy,
        heating: &HeatingParams,
        hotwater: &HotwaterParams,
    ) -> Result<StrategyOutcome> {
        self.systems.reset().await;
        let outcome = self
            .apply_strategy(system_id, strategy, heating, hotwater)
            .await;
        self.systems.reset().await;
        outcome
    }

    async fn apply_strategy(
        &self,
        system_id: &str,
        strategy: Strategy,
        heating: &HeatingParams,
        hotwater: &HotwaterParams,
    ) -> Result<StrategyOutcome> {
        let status = self.get_system(system_id).await?;

        let mut quick_modes = self.quick_modes.lock().await;
        let tracker = quick_modes.tracker(system_id);
        tracker.reconcile(&status, Instant::now());
        let current = tracker.current();
        if current.is_active() {
            info!("Quick mode \"{}\" already active, not starting another", current);
            return Ok(StrategyOutcome::AlreadyActive(current));
        }

        let dhw = status.dhw_data(hotwater.index);
        let zone = status.zone_data(heating.zone_index);
        let mode = match which_override(dhw.as_ref(), zone.as_ref(), strategy) {
            Override::Hotwater => {
                self.client
                    .start_hot_water_boost(system_id, hotwater.index)
                    .await?;
                QuickMode::Hotwater
            }
            Override::Heating => {
                self.client
                    .start_zone_quick_veto(
                        system_id,
                        heating.zone_index,
                        heating.veto_setpoint,
                        heating.veto_duration,
                    )
                    .await?;
                QuickMode::Heating
            }
            Override::None => {
                info!("No override eligible for strategy \"{}\"", strategy);
                QuickMode::Idle
            }
        };
        tracker.mark_started(mode, Instant::now());
        Ok(StrategyOutcome::Active(mode))
    }

    /// Stops whatever quick mode is tracked and returns it.
    pub async fn stop_strategy_based(
        &self,
        system_id: &str,
        heating: &HeatingParams,
        hotwater: &HotwaterParams,
    ) -> Result<QuickMode> {
        self.systems.reset().await;
        let stopped = self.stop_tracked(system_id, heating, hotwater).await;
        self.systems.reset().await;
        stopped
    }

    async fn stop_tracked(
        &self,
        system_id: &str,
        heating: &HeatingParams,
        hotwater: &HotwaterParams,
    ) -> Result<QuickMode> {
        let status = self.get_system(system_id).await?;

        let mut quick_modes = self.quick_modes.lock().await;
        let tracker = quick_modes.tracker(system_id);
        tracker.reconcile(&status, Instant::now());
        let mode = tracker.current();
        match mode {
            QuickMode::Hotwater => {
                self.client
                    .stop_hot_water_boost(system_id, hotwater.index)
                    .await?
            }
            QuickMode::Heating => {
                self.client
                    .stop_zone_quick_veto(system_id, heating.zone_index)
                    .await?
            }
            QuickMode::Idle => debug!("Leaving idle quick mode, nothing to stop remotely"),
            QuickMode::None => warn!("No quick mode tracked for system {}", system_id),
        }
        tracker.mark_stopped(Instant::now());
        Ok(mode)
    }
}
