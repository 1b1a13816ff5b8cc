use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{DhwData, Param, ZoneData, OPERATION_MODE_TIME_CONTROLLED};

/// Which override a strategy-based start prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    HotwaterOnly,
    HeatingOnly,
    #[default]
    HotwaterThenHeating,
}

impl Strategy {
    /// Degrees added to the tapping setpoint before comparing it with the
    /// current hot water temperature.
    fn hotwater_offset(&self) -> f64 {
        match self {
            Strategy::HotwaterOnly => 0.0,
            _ => -5.0,
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "hotwater" | "hotwater_only" => Ok(Strategy::HotwaterOnly),
            "heating" | "heating_only" => Ok(Strategy::HeatingOnly),
            "hotwater_then_heating" => Ok(Strategy::HotwaterThenHeating),
            other => Err(format!(
                "unknown strategy '{}', expected hotwater, heating or hotwater-then-heating",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::HotwaterOnly => "hotwater",
            Strategy::HeatingOnly => "heating",
            Strategy::HotwaterThenHeating => "hotwater-then-heating",
        };
        f.write_str(s)
    }
}

/// Quick veto parameters for strategy-based starts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeatingParams {
    pub zone_index: Param<u32>,
    pub veto_setpoint: Param<f64>,
    /// Hours.
    pub veto_duration: Param<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HotwaterParams {
    pub index: Param<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    None,
    Hotwater,
    Heating,
}

fn hotwater_eligible(dhw: Option<&DhwData>, strategy: Strategy) -> bool {
    dhw.is_some_and(|dhw| {
        dhw.configuration.operation_mode_dhw == OPERATION_MODE_TIME_CONTROLLED
            && dhw.state.current_dhw_temperature
                < dhw.configuration.tapping_setpoint + strategy.hotwater_offset()
    })
}

fn heating_eligible(zone: Option<&ZoneData>) -> bool {
    zone.is_some_and(|zone| {
        zone.configuration.heating.operation_mode_heating == OPERATION_MODE_TIME_CONTROLLED
    })
}

/// Picks the override to start for the given circuit state. A missing
/// circuit is never eligible.
pub fn which_override(dhw: Option<&DhwData>, zone: Option<&ZoneData>, strategy: Strategy) -> Override {
    match strategy {
        Strategy::HotwaterOnly if hotwater_eligible(dhw, strategy) => Override::Hotwater,
        Strategy::HeatingOnly if heating_eligible(zone) => Override::Heating,
        Strategy::HotwaterThenHeating if hotwater_eligible(dhw, strategy) => Override::Hotwater,
        Strategy::HotwaterThenHeating if heating_eligible(zone) => Override::Heating,
        _ => Override::None,
    }
}
