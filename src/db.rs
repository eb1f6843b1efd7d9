//! Database schema and operations

use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::economics::{self, BlendComponent, EconomicsResult};
use crate::models::{Blend, BlendLine, GreenLot, RoastLog, Settings};

/// Stock left over after a roast that is this close to zero counts as zero
const STOCK_EPSILON_KG: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Green lot {0} not found")]
    LotNotFound(i64),

    #[error("Blend '{0}' not found")]
    BlendNotFound(String),

    #[error("Not enough green coffee in lot {lot_id}: {available_kg:.3} kg available, {requested_kg:.3} kg requested")]
    InsufficientStock {
        lot_id: i64,
        available_kg: f64,
        requested_kg: f64,
    },

    #[error("Lot {lot_id} appears more than once in blend '{blend}'")]
    DuplicateBlendLot { blend: String, lot_id: i64 },

    #[error("Unknown setting '{0}' (known: labor_rate, gas_rate, utility_rate, default_margin, reference_batch_kg, display_unit, currency)")]
    UnknownSetting(String),

    #[error("Invalid value '{value}' for setting '{key}': {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
}

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Green coffee on hand
        CREATE TABLE IF NOT EXISTS green_lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            origin TEXT,
            quantity_kg REAL NOT NULL CHECK (quantity_kg >= 0),
            cost_per_kg REAL NOT NULL CHECK (cost_per_kg >= 0)
        );

        -- Committed roasts, append only
        CREATE TABLE IF NOT EXISTS roast_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_id INTEGER NOT NULL REFERENCES green_lots(id),
            green_kg REAL NOT NULL,
            roasted_kg REAL NOT NULL,
            shrinkage_percent REAL NOT NULL,
            operational_cost REAL NOT NULL,
            total_cost REAL NOT NULL,
            cost_per_roasted_kg REAL NOT NULL,
            roasted_at TEXT NOT NULL,
            notes TEXT
        );

        CREATE TABLE IF NOT EXISTS blends (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS blend_lines (
            blend_id INTEGER NOT NULL REFERENCES blends(id),
            lot_id INTEGER NOT NULL REFERENCES green_lots(id),
            percentage REAL NOT NULL,
            PRIMARY KEY (blend_id, lot_id)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_roast_log_lot ON roast_log(lot_id);
        "#,
    )?;
    Ok(())
}

/// Add a green lot and return its id
pub fn insert_lot(
    conn: &Connection,
    name: &str,
    origin: Option<&str>,
    quantity_kg: f64,
    cost_per_kg: f64,
) -> Result<i64> {
    if !(quantity_kg >= 0.0 && quantity_kg.is_finite()) {
        bail!("Lot quantity must be a finite, non-negative weight (got {} kg)", quantity_kg);
    }
    if !(cost_per_kg >= 0.0 && cost_per_kg.is_finite()) {
        bail!("Lot cost must be a finite, non-negative amount (got {} per kg)", cost_per_kg);
    }

    conn.execute(
        "INSERT INTO green_lots (name, origin, quantity_kg, cost_per_kg)
         VALUES (?1, ?2, ?3, ?4)",
        (name, origin, quantity_kg, cost_per_kg),
    )?;
    let id = conn.last_insert_rowid();
    info!(lot_id = id, name, quantity_kg, cost_per_kg, "added green lot");
    Ok(id)
}

pub fn get_lot(conn: &Connection, lot_id: i64) -> Result<GreenLot> {
    let lot = conn
        .query_row(
            "SELECT id, name, origin, quantity_kg, cost_per_kg FROM green_lots WHERE id = ?1",
            [lot_id],
            |row| {
                Ok(GreenLot {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    origin: row.get(2)?,
                    quantity_kg: row.get(3)?,
                    cost_per_kg: row.get(4)?,
                })
            },
        )
        .optional()?;

    match lot {
        Some(lot) => Ok(lot),
        None => Err(StoreError::LotNotFound(lot_id).into()),
    }
}

/// List all green lots
pub fn list_lots(conn: &Connection) -> Result<Vec<GreenLot>> {
    let mut stmt =
        conn.prepare("SELECT id, name, origin, quantity_kg, cost_per_kg FROM green_lots ORDER BY id")?;

    let rows = stmt.query_map([], |row| {
        Ok(GreenLot {
            id: row.get(0)?,
            name: row.get(1)?,
            origin: row.get(2)?,
            quantity_kg: row.get(3)?,
            cost_per_kg: row.get(4)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Add (or with a negative delta, remove) stock. Returns the new quantity.
pub fn adjust_lot_quantity(conn: &mut Connection, lot_id: i64, delta_kg: f64) -> Result<f64> {
    if !delta_kg.is_finite() {
        bail!("Stock adjustment must be finite (got {} kg)", delta_kg);
    }

    let tx = conn.transaction()?;
    let lot = get_lot(&tx, lot_id)?;
    let remaining = checked_remaining(&lot, -delta_kg)?;

    tx.execute(
        "UPDATE green_lots SET quantity_kg = ?1 WHERE id = ?2",
        (remaining, lot_id),
    )?;
    tx.commit()?;

    info!(lot_id, delta_kg, remaining, "adjusted green stock");
    Ok(remaining)
}

fn checked_remaining(lot: &GreenLot, requested_kg: f64) -> Result<f64> {
    let remaining = lot.quantity_kg - requested_kg;
    if !(remaining >= -STOCK_EPSILON_KG) {
        return Err(StoreError::InsufficientStock {
            lot_id: lot.id,
            available_kg: lot.quantity_kg,
            requested_kg,
        }
        .into());
    }
    Ok(remaining.max(0.0))
}

fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let number = || match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(invalid("not a finite number")),
    };

    match key {
        "labor_rate" | "gas_rate" | "utility_rate" => {
            let rate = number()?;
            if !(rate >= 0.0) {
                return Err(invalid("rate cannot be negative"));
            }
            match key {
                "labor_rate" => settings.labor_rate_per_hour = rate,
                "gas_rate" => settings.gas_rate_per_hour = rate,
                _ => settings.utility_rate_per_hour = rate,
            }
        }
        "default_margin" => {
            let margin = number()?;
            if !(0.0..100.0).contains(&margin) {
                return Err(invalid("margin must be between 0 and 100%"));
            }
            settings.default_margin_percent = margin;
        }
        "reference_batch_kg" => {
            let batch = number()?;
            if !(batch > 0.0) {
                return Err(invalid("batch size must be positive"));
            }
            settings.reference_batch_kg = batch;
        }
        "display_unit" => {
            settings.display_unit = value.parse().map_err(|_| invalid("expected kg or lb"))?;
        }
        "currency" => {
            if value.trim().is_empty() {
                return Err(invalid("currency symbol cannot be empty"));
            }
            settings.currency = value.trim().to_string();
        }
        other => return Err(StoreError::UnknownSetting(other.to_string())),
    }
    Ok(())
}

/// Load settings, falling back to defaults for anything never set
pub fn load_settings(conn: &Connection) -> Result<Settings> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut settings = Settings::default();
    for row in rows {
        let (key, value) = row?;
        match apply_setting(&mut settings, &key, &value) {
            Ok(()) => {}
            Err(StoreError::UnknownSetting(key)) => warn!(key = %key, "ignoring unknown setting"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(settings)
}

/// Validate and store a single setting
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let mut scratch = load_settings(conn)?;
    apply_setting(&mut scratch, key, value)?;

    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        (key, value.trim()),
    )?;
    info!(key, value, "updated setting");
    Ok(())
}

/// Save a blend, replacing any existing blend with the same name.
///
/// Refuses to save unless every lot exists and the shares total 100%.
pub fn save_blend(conn: &mut Connection, name: &str, lines: &[BlendLine]) -> Result<i64> {
    for (i, line) in lines.iter().enumerate() {
        if lines[..i].iter().any(|earlier| earlier.lot_id == line.lot_id) {
            return Err(StoreError::DuplicateBlendLot {
                blend: name.to_string(),
                lot_id: line.lot_id,
            }
            .into());
        }
    }

    let tx = conn.transaction()?;

    let components = lines
        .iter()
        .map(|line| component_for(&tx, line))
        .collect::<Result<Vec<_>>>()?;
    economics::validate_blend(&components)?;

    let existing: Option<i64> = tx
        .query_row("SELECT id FROM blends WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        tx.execute("DELETE FROM blend_lines WHERE blend_id = ?1", [id])?;
        tx.execute("DELETE FROM blends WHERE id = ?1", [id])?;
        debug!(blend_id = id, name, "replacing blend");
    }

    tx.execute("INSERT INTO blends (name) VALUES (?1)", [name])?;
    let blend_id = tx.last_insert_rowid();
    for line in lines {
        tx.execute(
            "INSERT INTO blend_lines (blend_id, lot_id, percentage) VALUES (?1, ?2, ?3)",
            (blend_id, line.lot_id, line.percentage),
        )?;
    }
    tx.commit()?;

    info!(blend_id, name, components = lines.len(), "saved blend");
    Ok(blend_id)
}

pub fn get_blend(conn: &Connection, name: &str) -> Result<Blend> {
    let id: Option<i64> = conn
        .query_row("SELECT id FROM blends WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    let Some(id) = id else {
        return Err(StoreError::BlendNotFound(name.to_string()).into());
    };

    Ok(Blend {
        id,
        name: name.to_string(),
        components: blend_lines(conn, id)?,
    })
}

/// List all blends with their components
pub fn list_blends(conn: &Connection) -> Result<Vec<Blend>> {
    let mut stmt = conn.prepare("SELECT id, name FROM blends ORDER BY name")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        let (id, name) = row?;
        results.push(Blend {
            id,
            name,
            components: blend_lines(conn, id)?,
        });
    }
    Ok(results)
}

fn blend_lines(conn: &Connection, blend_id: i64) -> Result<Vec<BlendLine>> {
    let mut stmt = conn.prepare(
        "SELECT lot_id, percentage FROM blend_lines WHERE blend_id = ?1 ORDER BY percentage DESC, lot_id",
    )?;
    let rows = stmt.query_map([blend_id], |row| {
        Ok(BlendLine {
            lot_id: row.get(0)?,
            percentage: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Pair each blend line with its lot's current green cost
pub fn blend_components(conn: &Connection, blend: &Blend) -> Result<Vec<BlendComponent>> {
    blend
        .components
        .iter()
        .map(|line| component_for(conn, line))
        .collect()
}

fn component_for(conn: &Connection, line: &BlendLine) -> Result<BlendComponent> {
    let lot = get_lot(conn, line.lot_id)?;
    Ok(BlendComponent {
        cost_per_kg: lot.cost_per_kg,
        percentage: line.percentage,
    })
}

/// Record a roast and take its green weight out of the lot.
///
/// Both happen in one transaction: if the lot does not hold enough green
/// coffee nothing is written.
pub fn commit_roast(
    conn: &mut Connection,
    lot_id: i64,
    result: &EconomicsResult,
    notes: Option<&str>,
) -> Result<RoastLog> {
    let tx = conn.transaction()?;

    let lot = get_lot(&tx, lot_id)?;
    let remaining = checked_remaining(&lot, result.green_kg)?;
    tx.execute(
        "UPDATE green_lots SET quantity_kg = ?1 WHERE id = ?2",
        (remaining, lot_id),
    )?;

    let roasted_at = Utc::now();
    tx.execute(
        "INSERT INTO roast_log (lot_id, green_kg, roasted_kg, shrinkage_percent, operational_cost,
                                total_cost, cost_per_roasted_kg, roasted_at, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            lot_id,
            result.green_kg,
            result.roasted_kg,
            result.shrinkage_percent,
            result.operational_cost,
            result.total_cost,
            result.cost_per_roasted_kg,
            roasted_at,
            notes,
        ),
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    info!(
        roast_id = id,
        lot_id,
        green_kg = result.green_kg,
        roasted_kg = result.roasted_kg,
        remaining_kg = remaining,
        "committed roast"
    );

    Ok(RoastLog {
        id,
        lot_id,
        green_kg: result.green_kg,
        roasted_kg: result.roasted_kg,
        shrinkage_percent: result.shrinkage_percent,
        operational_cost: result.operational_cost,
        total_cost: result.total_cost,
        cost_per_roasted_kg: result.cost_per_roasted_kg,
        roasted_at,
        notes: notes.map(str::to_string),
    })
}

/// Most recent roasts first, optionally for a single lot
pub fn list_roasts(conn: &Connection, lot_id: Option<i64>, limit: usize) -> Result<Vec<RoastLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, lot_id, green_kg, roasted_kg, shrinkage_percent, operational_cost,
                total_cost, cost_per_roasted_kg, roasted_at, notes
         FROM roast_log
         WHERE ?1 IS NULL OR lot_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map((lot_id, limit as i64), |row| {
        Ok(RoastLog {
            id: row.get(0)?,
            lot_id: row.get(1)?,
            green_kg: row.get(2)?,
            roasted_kg: row.get(3)?,
            shrinkage_percent: row.get(4)?,
            operational_cost: row.get(5)?,
            total_cost: row.get(6)?,
            cost_per_roasted_kg: row.get(7)?,
            roasted_at: row.get(8)?,
            notes: row.get(9)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
