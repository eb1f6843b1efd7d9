//! Display units
//!
//! Everything stored or calculated is in kilograms. Pounds only exist at the
//! edges: parsing what the user typed and printing what they asked to see.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const KG_PER_LB: f64 = 0.45359237;

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([+-]?(?:\d+\.?\d*|\.\d+))\s*(kgs?|kilos?|kilograms?|lbs?|pounds?)?\s*$")
        .expect("quantity pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown mass unit: {0} (expected kg or lb)")]
    UnknownUnit(String),

    #[error("Cannot read a quantity from '{0}' (try \"12.5\", \"10kg\" or \"22 lb\")")]
    BadQuantity(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum MassUnit {
    #[default]
    #[value(name = "kg")]
    #[serde(rename = "kg")]
    Kilograms,
    #[value(name = "lb")]
    #[serde(rename = "lb")]
    Pounds,
}

impl MassUnit {
    fn kg_per_unit(self) -> f64 {
        match self {
            MassUnit::Kilograms => 1.0,
            MassUnit::Pounds => KG_PER_LB,
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MassUnit::Kilograms => write!(f, "kg"),
            MassUnit::Pounds => write!(f, "lb"),
        }
    }
}

impl FromStr for MassUnit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kg" | "kgs" | "kilo" | "kilos" | "kilogram" | "kilograms" => Ok(MassUnit::Kilograms),
            "lb" | "lbs" | "pound" | "pounds" => Ok(MassUnit::Pounds),
            other => Err(UnitError::UnknownUnit(other.to_string())),
        }
    }
}

pub fn to_kg(value: f64, unit: MassUnit) -> f64 {
    value * unit.kg_per_unit()
}

pub fn from_kg(kg: f64, unit: MassUnit) -> f64 {
    kg / unit.kg_per_unit()
}

/// Currency per `unit` to currency per kilogram
pub fn cost_to_per_kg(cost_per_unit: f64, unit: MassUnit) -> f64 {
    cost_per_unit / unit.kg_per_unit()
}

/// Currency per kilogram to currency per `unit`
pub fn cost_from_per_kg(cost_per_kg: f64, unit: MassUnit) -> f64 {
    cost_per_kg * unit.kg_per_unit()
}

/// A mass typed on the command line, with an optional explicit unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Option<MassUnit>,
}

impl Quantity {
    /// Kilograms, reading a bare number in `default_unit`
    pub fn kg(&self, default_unit: MassUnit) -> f64 {
        to_kg(self.value, self.unit.unwrap_or(default_unit))
    }
}

/// Parse `"12.5"`, `"10kg"` or `"22 lb"` into a value and optional unit
pub fn parse_mass(s: &str) -> Result<(f64, Option<MassUnit>), UnitError> {
    let caps = QUANTITY_RE
        .captures(s)
        .ok_or_else(|| UnitError::BadQuantity(s.to_string()))?;
    let value = caps[1]
        .parse::<f64>()
        .map_err(|_| UnitError::BadQuantity(s.to_string()))?;
    if !value.is_finite() {
        return Err(UnitError::BadQuantity(s.to_string()));
    }
    let unit = caps.get(2).map(|m| m.as_str().parse()).transpose()?;
    Ok((value, unit))
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = parse_mass(s)?;
        Ok(Quantity { value, unit })
    }
}
