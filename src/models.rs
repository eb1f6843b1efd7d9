//! Data models for green inventory, roasts, blends and settings
//!
//! Quantities are kilograms and costs are per kilogram, whatever unit the
//! user looks at them in.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::units::MassUnit;

#[derive(Debug, Clone, Serialize)]
pub struct GreenLot {
    pub id: i64,
    pub name: String,
    pub origin: Option<String>,
    pub quantity_kg: f64,
    pub cost_per_kg: f64,
}

/// A committed roast. Written once, never updated.
#[derive(Debug, Clone, Serialize)]
pub struct RoastLog {
    pub id: i64,
    pub lot_id: i64,
    pub green_kg: f64,
    pub roasted_kg: f64,
    pub shrinkage_percent: f64,
    pub operational_cost: f64,
    pub total_cost: f64,
    pub cost_per_roasted_kg: f64,
    pub roasted_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlendLine {
    pub lot_id: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Blend {
    pub id: i64,
    pub name: String,
    pub components: Vec<BlendLine>,
}

/// Business settings handed to the calculator as plain parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub labor_rate_per_hour: f64,
    pub gas_rate_per_hour: f64,
    pub utility_rate_per_hour: f64,
    pub default_margin_percent: f64,
    /// Green charge that blend overhead is spread over
    pub reference_batch_kg: f64,
    pub display_unit: MassUnit,
    pub currency: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            labor_rate_per_hour: 0.0,
            gas_rate_per_hour: 0.0,
            utility_rate_per_hour: 0.0,
            default_margin_percent: 40.0,
            reference_batch_kg: 10.0,
            display_unit: MassUnit::Kilograms,
            currency: "$".to_string(),
        }
    }
}
