//! Human-readable rendering of calculation results
//!
//! Results arrive in kilograms and are converted to the display unit here,
//! once, right before printing.

use std::fmt;

use crate::economics::{BlendResult, EconomicsResult};
use crate::models::{Blend, GreenLot, RoastLog};
use crate::units::{cost_from_per_kg, from_kg, MassUnit};

/// How to present weights and money
#[derive(Debug, Clone)]
pub struct Presentation {
    pub unit: MassUnit,
    pub currency: String,
}

impl Presentation {
    fn mass(&self, kg: f64) -> String {
        format!("{:.3} {}", from_kg(kg, self.unit), self.unit)
    }

    fn money(&self, amount: f64) -> String {
        format!("{}{:.2}", self.currency, amount)
    }

    fn per_mass(&self, per_kg: f64) -> String {
        format!("{}{:.3}/{}", self.currency, cost_from_per_kg(per_kg, self.unit), self.unit)
    }
}

pub struct EconomicsReport<'a> {
    pub result: &'a EconomicsResult,
    pub presentation: &'a Presentation,
    /// Extra (margin, price per kg) line, usually the default margin
    pub extra_price: Option<(f64, f64)>,
}

impl fmt::Display for EconomicsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.presentation;
        let r = self.result;

        writeln!(f, "=== Roast Economics ===")?;
        writeln!(f, "Green in:     {}", p.mass(r.green_kg))?;
        writeln!(f, "Roasted out:  {}", p.mass(r.roasted_kg))?;
        writeln!(
            f,
            "Shrinkage:    {} ({:.2}%)",
            p.mass(r.shrinkage_loss_kg),
            r.shrinkage_percent
        )?;
        writeln!(f)?;

        writeln!(f, "Costs:")?;
        writeln!(f, "  Green coffee: {}", p.money(r.green_cost))?;
        writeln!(f, "  Operational:  {}", p.money(r.operational_cost))?;
        writeln!(f, "  Total:        {}", p.money(r.total_cost))?;
        writeln!(f, "  True cost:    {}", p.per_mass(r.cost_per_roasted_kg))?;
        writeln!(f)?;

        write_prices(f, p, r.price_at_30, r.price_at_50, self.extra_price)
    }
}

pub struct BlendReport<'a> {
    pub name: &'a str,
    pub result: &'a BlendResult,
    pub presentation: &'a Presentation,
    pub extra_price: Option<(f64, f64)>,
}

impl fmt::Display for BlendReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.presentation;
        let r = self.result;

        writeln!(f, "=== Blend Economics: {} ===", self.name)?;
        writeln!(
            f,
            "Shares total {:.2}%, target shrinkage {:.2}%",
            r.total_share, r.target_shrinkage_percent
        )?;
        writeln!(f)?;

        writeln!(f, "Costs per roasted {}:", p.unit)?;
        writeln!(f, "  Weighted green (per green {}): {}", p.unit, p.per_mass(r.weighted_green_cost))?;
        writeln!(f, "  Green after shrinkage: {}", p.per_mass(r.green_cost_per_roasted))?;
        writeln!(f, "  Operational:           {}", p.per_mass(r.operational_cost_per_roasted))?;
        writeln!(f, "  True cost:             {}", p.per_mass(r.total_cost_per_roasted))?;
        writeln!(f)?;

        write_prices(f, p, r.price_at_30, r.price_at_50, self.extra_price)
    }
}

fn write_prices(
    f: &mut fmt::Formatter<'_>,
    p: &Presentation,
    at_30: f64,
    at_50: f64,
    extra: Option<(f64, f64)>,
) -> fmt::Result {
    writeln!(f, "Suggested prices:")?;
    writeln!(f, "  30% margin: {}", p.per_mass(at_30))?;
    writeln!(f, "  50% margin: {}", p.per_mass(at_50))?;
    if let Some((margin, price)) = extra {
        if margin != 30.0 && margin != 50.0 {
            writeln!(f, "  {}% margin: {}", margin, p.per_mass(price))?;
        }
    }
    Ok(())
}

pub fn format_lots(lots: &[GreenLot], p: &Presentation) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:>4}  {:<28} {:<14} {:>14} {:>14}\n",
        "ID", "Lot", "Origin", "On hand", "Cost"
    ));
    output.push_str(&format!("{}\n", "-".repeat(78)));
    for lot in lots {
        output.push_str(&format!(
            "{:>4}  {:<28} {:<14} {:>14} {:>14}\n",
            lot.id,
            lot.name,
            lot.origin.as_deref().unwrap_or("-"),
            p.mass(lot.quantity_kg),
            p.per_mass(lot.cost_per_kg),
        ));
    }
    output
}

pub fn format_blend(blend: &Blend, lots: &[GreenLot]) -> String {
    let mut output = format!("{}\n", blend.name);
    for line in &blend.components {
        let name = lots
            .iter()
            .find(|lot| lot.id == line.lot_id)
            .map(|lot| lot.name.as_str())
            .unwrap_or("(missing lot)");
        output.push_str(&format!("  {:>6.2}%  #{} {}\n", line.percentage, line.lot_id, name));
    }
    output
}

pub fn format_roasts(roasts: &[RoastLog], p: &Presentation) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:>4}  {:<17} {:>5} {:>14} {:>14} {:>7} {:>16}\n",
        "ID", "When", "Lot", "Green", "Roasted", "Loss", "True cost"
    ));
    output.push_str(&format!("{}\n", "-".repeat(84)));
    for roast in roasts {
        output.push_str(&format!(
            "{:>4}  {:<17} {:>5} {:>14} {:>14} {:>6.2}% {:>16}\n",
            roast.id,
            roast.roasted_at.format("%Y-%m-%d %H:%M"),
            roast.lot_id,
            p.mass(roast.green_kg),
            p.mass(roast.roasted_kg),
            roast.shrinkage_percent,
            p.per_mass(roast.cost_per_roasted_kg),
        ));
        if let Some(notes) = &roast.notes {
            output.push_str(&format!("      {}\n", notes));
        }
    }
    output
}
