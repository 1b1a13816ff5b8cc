use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

pub const API_URL_BASE: &str =
    "https://api.vaillant-group.com/service-connected-control/end-user-app-api/v1";

/// Hot water circuit addressed when the caller does not pick one.
pub const HOTWATER_INDEX_DEFAULT: u32 = 255;
pub const ZONE_INDEX_DEFAULT: u32 = 0;
pub const VETO_SETPOINT_DEFAULT: f64 = 20.0;
/// Hours.
pub const VETO_DURATION_DEFAULT: f64 = 0.5;

pub const OPERATION_MODE_TIME_CONTROLLED: &str = "TIME_CONTROLLED";
pub const SPECIAL_FUNCTION_CYLINDER_BOOST: &str = "CYLINDER_BOOST";
pub const SPECIAL_FUNCTION_QUICK_VETO: &str = "QUICK_VETO";

/// A parameter the caller may leave to the API default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Param<T> {
    Specified(T),
    #[default]
    UseDefault,
}

impl<T> Param<T> {
    pub fn or(self, default: T) -> T {
        match self {
            Param::Specified(value) => value,
            Param::UseDefault => default,
        }
    }
}

impl<T> From<Option<T>> for Param<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Param::Specified(v),
            None => Param::UseDefault,
        }
    }
}

impl Param<u32> {
    /// Maps the legacy "negative means default" convention.
    pub fn from_signed(value: i64) -> Self {
        u32::try_from(value)
            .map(Param::Specified)
            .unwrap_or(Param::UseDefault)
    }
}

impl Param<f64> {
    /// Maps the legacy "negative means default" convention.
    pub fn from_signed(value: f64) -> Self {
        if value < 0.0 || value.is_nan() {
            Param::UseDefault
        } else {
            Param::Specified(value)
        }
    }
}

// ---------------------------------------------------------------------------
// Homes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Home {
    pub home_name: String,
    pub address: Address,
    pub serial_number: String,
    pub system_id: String,
    pub product_metadata: ProductMetadata,
    pub state: String,
    pub migration_state: String,
    pub migration_finished_at: Option<DateTime<Utc>>,
    pub online_state: String,
    pub firmware: Firmware,
    pub nomenclature: String,
    pub cag: bool,
    pub country_code: String,
    pub product_information: String,
    pub firmware_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub extension: Option<serde_json::Value>,
    pub city: String,
    pub postal_code: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductMetadata {
    pub product_type: String,
    pub production_year: String,
    pub production_week: String,
    pub article_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Firmware {
    pub version: String,
    pub update_enabled: bool,
    pub update_required: bool,
}

// ---------------------------------------------------------------------------
// System status: state / properties / configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    pub state: SystemState,
    pub properties: SystemProperties,
    pub configuration: SystemConfiguration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemState {
    pub system: StateSystem,
    pub zones: Vec<StateZone>,
    pub circuits: Vec<StateCircuit>,
    pub dhw: Vec<StateDhw>,
    pub domestic_hot_water: Vec<StateDomesticHotWater>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSystem {
    pub outdoor_temperature: f64,
    #[serde(rename = "outdoorTemperatureAverage24h")]
    pub outdoor_temperature_average_24h: f64,
    pub system_flow_temperature: f64,
    pub system_water_pressure: f64,
    pub energy_manager_state: String,
    pub system_off: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateZone {
    pub index: u32,
    pub desired_room_temperature_setpoint_heating: f64,
    pub desired_room_temperature_setpoint: f64,
    pub current_room_temperature: Option<f64>,
    pub current_room_humidity: Option<f64>,
    pub current_special_function: String,
    pub heating_state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateCircuit {
    pub index: u32,
    pub circuit_state: String,
    pub current_circuit_flow_temperature: Option<f64>,
    pub heating_circuit_flow_setpoint: f64,
    pub calculated_energy_manager_state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDhw {
    pub index: u32,
    pub current_special_function: String,
    pub current_dhw_temperature: f64,
}

/// Hot water circuit as reported by newer controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDomesticHotWater {
    pub index: u32,
    pub current_special_function: String,
    pub current_domestic_hot_water_temperature: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemProperties {
    pub system: PropertiesSystem,
    pub zones: Vec<PropertiesZone>,
    pub circuits: Vec<PropertiesCircuit>,
    pub dhw: Vec<PropertiesDhw>,
    /// Same shape as `dhw`.
    pub domestic_hot_water: Vec<PropertiesDhw>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertiesSystem {
    pub controller_type: String,
    pub system_scheme: i32,
    pub backup_heater_type: String,
    pub backup_heater_allowed_for: String,
    #[serde(rename = "moduleConfigurationVR71")]
    pub module_configuration_vr71: i32,
    pub energy_provide_power_cut_behavior: String,
    pub smart_photovoltaic_buffer_offset: f64,
    pub external_energy_management_activation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertiesZone {
    pub index: u32,
    pub is_active: bool,
    pub zone_binding: String,
    pub is_cooling_allowed: bool,
    pub associated_circuit_index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertiesCircuit {
    pub index: u32,
    pub mixer_circuit_type_external: String,
    pub heating_circuit_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertiesDhw {
    pub index: u32,
    pub min_setpoint: f64,
    pub max_setpoint: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemConfiguration {
    pub system: ConfigurationSystem,
    pub zones: Vec<ConfigurationZone>,
    pub circuits: Vec<ConfigurationCircuit>,
    pub dhw: Vec<ConfigurationDhw>,
    pub domestic_hot_water: Vec<ConfigurationDomesticHotWater>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationSystem {
    pub continuous_heating_start_setpoint: f64,
    pub alternative_point: f64,
    pub heating_circuit_bivalence_point: f64,
    pub dhw_bivalence_point: f64,
    pub adaptive_heating_curve: bool,
    pub dhw_maximum_loading_time: i32,
    pub dhw_hysteresis: f64,
    pub dhw_flow_setpoint_offset: f64,
    pub continuous_heating_room_setpoint: f64,
    pub hybrid_control_strategy: String,
    pub max_flow_setpoint_hp_error: f64,
    pub dhw_maximum_temperature: f64,
    pub maximum_preheating_time: i32,
    pub paralell_tank_loading_allowed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationZone {
    pub index: u32,
    pub general: ZoneGeneral,
    pub heating: ZoneHeating,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneGeneral {
    pub name: String,
    pub holiday_start_date_time: Option<DateTime<Utc>>,
    pub holiday_end_date_time: Option<DateTime<Utc>>,
    pub holiday_setpoint: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneHeating {
    pub operation_mode_heating: String,
    pub set_back_temperature: f64,
    pub manual_mode_setpoint_heating: f64,
    pub time_program_heating: Option<TimeProgram>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationCircuit {
    pub index: u32,
    pub heating_curve: f64,
    pub heating_flow_temperature_minimum_setpoint: f64,
    pub heating_flow_temperature_maximum_setpoint: f64,
    pub heat_demand_limited_by_outside_temperature: f64,
    pub heating_circuit_flow_setpoint_excess_offset: f64,
    pub set_back_mode_enabled: bool,
    pub room_temperature_control_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationDhw {
    pub index: u32,
    pub operation_mode_dhw: String,
    pub tapping_setpoint: f64,
    pub holiday_start_date_time: Option<DateTime<Utc>>,
    pub holiday_end_date_time: Option<DateTime<Utc>>,
    pub time_program_dhw: Option<TimeProgram>,
    pub time_program_circulation_pump: Option<TimeProgram>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigurationDomesticHotWater {
    pub index: u32,
    pub operation_mode_domestic_hot_water: String,
    pub tapping_setpoint: f64,
    pub holiday_start_date_time: Option<DateTime<Utc>>,
    pub holiday_end_date_time: Option<DateTime<Utc>>,
    pub time_program_domestic_hot_water: Option<TimeProgram>,
    pub time_program_circulation_pump: Option<TimeProgram>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeProgram {
    pub meta_info: Option<TimeProgramMetaInfo>,
    pub monday: Vec<TimeSlot>,
    pub tuesday: Vec<TimeSlot>,
    pub wednesday: Vec<TimeSlot>,
    pub thursday: Vec<TimeSlot>,
    pub friday: Vec<TimeSlot>,
    pub saturday: Vec<TimeSlot>,
    pub sunday: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeProgramMetaInfo {
    pub min_slots_per_day: u32,
    pub max_slots_per_day: u32,
    pub setpoint_required_per_slot: bool,
}

/// Minutes since midnight; `setpoint` only present for heating programs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeSlot {
    pub start_time: u32,
    pub end_time: u32,
    pub setpoint: Option<f64>,
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// State, properties and configuration of one hot water circuit.
#[derive(Debug, Clone, Default)]
pub struct DhwData {
    pub state: StateDhw,
    pub properties: PropertiesDhw,
    pub configuration: ConfigurationDhw,
}

/// Same join as [`DhwData`] over the `domesticHotWater` entries.
#[derive(Debug, Clone, Default)]
pub struct DomesticHotWaterData {
    pub state: StateDomesticHotWater,
    pub properties: PropertiesDhw,
    pub configuration: ConfigurationDomesticHotWater,
}

/// State, properties and configuration of one heating zone.
#[derive(Debug, Clone, Default)]
pub struct ZoneData {
    pub state: StateZone,
    pub properties: PropertiesZone,
    pub configuration: ConfigurationZone,
}

impl SystemStatus {
    /// Joins the hot water entries sharing `index`. `None` when the state
    /// layer has no such circuit.
    pub fn dhw_data(&self, index: Param<u32>) -> Option<DhwData> {
        let index = index.or(HOTWATER_INDEX_DEFAULT);
        let state = self.state.dhw.iter().find(|d| d.index == index)?;
        Some(DhwData {
            state: state.clone(),
            properties: self
                .properties
                .dhw
                .iter()
                .find(|d| d.index == index)
                .cloned()
                .unwrap_or_default(),
            configuration: self
                .configuration
                .dhw
                .iter()
                .find(|d| d.index == index)
                .cloned()
                .unwrap_or_default(),
        })
    }

    pub fn domestic_hot_water_data(&self, index: Param<u32>) -> Option<DomesticHotWaterData> {
        let index = index.or(HOTWATER_INDEX_DEFAULT);
        let state = self
            .state
            .domestic_hot_water
            .iter()
            .find(|d| d.index == index)?;
        Some(DomesticHotWaterData {
            state: state.clone(),
            properties: self
                .properties
                .domestic_hot_water
                .iter()
                .find(|d| d.index == index)
                .cloned()
                .unwrap_or_default(),
            configuration: self
                .configuration
                .domestic_hot_water
                .iter()
                .find(|d| d.index == index)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Joins the zone entries sharing `index`. `None` when the state layer
    /// has no such zone.
    pub fn zone_data(&self, index: Param<u32>) -> Option<ZoneData> {
        let index = index.or(ZONE_INDEX_DEFAULT);
        let state = self.state.zones.iter().find(|z| z.index == index)?;
        Some(ZoneData {
            state: state.clone(),
            properties: self
                .properties
                .zones
                .iter()
                .find(|z| z.index == index)
                .cloned()
                .unwrap_or_default(),
            configuration: self
                .configuration
                .zones
                .iter()
                .find(|z| z.index == index)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Display name of a zone, falling back to its index.
    pub fn zone_name(&self, index: u32) -> String {
        self.configuration
            .zones
            .iter()
            .find(|z| z.index == index && !z.general.name.is_empty())
            .map(|z| z.general.name.clone())
            .unwrap_or_else(|| format!("Zone {}", index))
    }
}

/// Status of one system as cached by the controller.
#[derive(Debug, Clone)]
pub struct SystemAndStatus {
    pub system_id: String,
    pub status: SystemStatus,
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub device_uuid: String,
    pub ebus_id: String,
    pub spn: i32,
    pub bus_coupler_address: i32,
    pub article_number: String,
    #[serde(rename = "emfValid")]
    pub emf_valid: bool,
    pub device_serial_number: String,
    pub device_type: String,
    pub first_data: Option<DateTime<Utc>>,
    pub last_data: Option<DateTime<Utc>>,
    pub data: Vec<DeviceDataRange>,
    pub product_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDataRange {
    pub operation_mode: String,
    pub value_type: String,
    pub calculated: bool,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemDevices {
    pub system_type: String,
    pub has_emf_capable_devices: bool,
    pub primary_heat_generator: Device,
    pub secondary_heat_generators: Vec<Device>,
    pub electric_backup_heater: Device,
}

#[derive(Debug, Clone)]
pub struct SystemAndDevices {
    pub system_id: String,
    pub devices: SystemDevices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    PrimaryHeatGenerator,
    SecondaryHeatGenerator,
    ElectricBackupHeater,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::PrimaryHeatGenerator => "primary_heat_generator",
            DeviceRole::SecondaryHeatGenerator => "secondary_heat_generator",
            DeviceRole::ElectricBackupHeater => "electric_backup_heater",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceFilter {
    #[default]
    All,
    Primary,
    Secondary,
    Backup,
}

impl std::str::FromStr for DeviceFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DeviceFilter::All),
            "primary" => Ok(DeviceFilter::Primary),
            "secondary" => Ok(DeviceFilter::Secondary),
            "backup" => Ok(DeviceFilter::Backup),
            other => Err(format!(
                "unknown device filter '{}', expected all, primary, secondary or backup",
                other
            )),
        }
    }
}

/// A device tagged with the role it plays in the system.
#[derive(Debug, Clone)]
pub struct DeviceAndInfo {
    pub device: Device,
    pub role: DeviceRole,
}

impl SystemDevices {
    pub fn classify(&self, filter: DeviceFilter) -> Vec<DeviceAndInfo> {
        let wants = |role: DeviceFilter| filter == DeviceFilter::All || filter == role;
        let mut devices = Vec::new();

        if wants(DeviceFilter::Primary) && !self.primary_heat_generator.device_uuid.is_empty() {
            devices.push(DeviceAndInfo {
                device: self.primary_heat_generator.clone(),
                role: DeviceRole::PrimaryHeatGenerator,
            });
        }
        if wants(DeviceFilter::Secondary) {
            devices.extend(self.secondary_heat_generators.iter().map(|d| DeviceAndInfo {
                device: d.clone(),
                role: DeviceRole::SecondaryHeatGenerator,
            }));
        }
        if wants(DeviceFilter::Backup) && !self.electric_backup_heater.device_uuid.is_empty() {
            devices.push(DeviceAndInfo {
                device: self.electric_backup_heater.clone(),
                role: DeviceRole::ElectricBackupHeater,
            });
        }
        devices
    }
}

// ---------------------------------------------------------------------------
// Energy and power
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Hour,
    Day,
    Month,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hour => "HOUR",
            Resolution::Day => "DAY",
            Resolution::Month => "MONTH",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOUR" => Ok(Resolution::Hour),
            "DAY" => Ok(Resolution::Day),
            "MONTH" => Ok(Resolution::Month),
            other => Err(format!(
                "unknown resolution '{}', expected HOUR, DAY or MONTH",
                other
            )),
        }
    }
}

/// Parameters of an energy time-series query. `start` and `end` are
/// inclusive and keep their UTC offset on the wire.
#[derive(Debug, Clone)]
pub struct EnergyQuery {
    pub system_id: String,
    pub device_uuid: String,
    /// e.g. `DOMESTIC_HOT_WATER`, `HEATING`
    pub operation_mode: String,
    /// e.g. `CONSUMED_ELECTRICAL_ENERGY`, `ENVIRONMENTAL_YIELD`
    pub energy_type: String,
    pub resolution: Resolution,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// Wire format of `startDate` / `endDate`.
pub fn format_energy_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnergyData {
    #[serde(rename = "extra_fields")]
    pub extra_fields: ExtraFields,
    pub operation_mode: String,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
    pub resolution: String,
    pub energy_type: String,
    pub total_consumption: f64,
    pub data: Vec<EnergyBucket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraFields {
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnergyBucket {
    #[serde(rename = "extra_fields")]
    pub extra_fields: ExtraFields,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
    pub value: f64,
}

/// Current electrical power draw per device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcData {
    pub devices: Vec<MpcDevice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MpcDevice {
    pub device_id: String,
    /// Watts.
    pub current_power: f64,
}

impl MpcData {
    pub fn total_power(&self) -> f64 {
        self.devices.iter().map(|d| d.current_power).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SystemAndMpcData {
    pub system_id: String,
    pub mpc: MpcData,
}
