//! Roastery Calculator
//!
//! Green inventory, roast logging and roast/blend costing for a coffee roastery.

mod db;
mod economics;
mod models;
mod report;
mod units;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::economics::{LaborCost, OverheadOptions};
use crate::models::{BlendLine, Settings};
use crate::report::{BlendReport, EconomicsReport, Presentation};
use crate::units::{cost_to_per_kg, from_kg, MassUnit, Quantity};

#[derive(Parser)]
#[command(name = "roastery-calculator")]
#[command(about = "Roast economics and blend costing for a coffee roastery")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "ROASTERY_DB", default_value = "roastery.db")]
    database: PathBuf,

    /// Unit for weights and per-weight costs (defaults to the display_unit setting)
    #[arg(short, long, value_enum, global = true)]
    unit: Option<MassUnit>,

    /// Print results as JSON (weights in kg, costs per kg)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overhead for one batch. Hourly rates come from settings.
#[derive(Args, Debug, Default)]
struct OverheadArgs {
    /// Roast duration in minutes (charges labor, gas and utility at their hourly rates)
    #[arg(long)]
    minutes: Option<f64>,

    /// Flat gas cost, instead of the hourly gas rate
    #[arg(long)]
    gas: Option<f64>,

    /// Flat utility cost, instead of the hourly utility rate
    #[arg(long)]
    utility: Option<f64>,

    /// Any other flat overhead for the batch
    #[arg(long)]
    other: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Add a green coffee lot to inventory
    LotAdd {
        name: String,

        /// Quantity on hand (e.g. "60", "60kg", "132 lb")
        #[arg(short, long)]
        quantity: Quantity,

        /// Cost per display unit
        #[arg(short, long)]
        cost: f64,

        #[arg(short, long)]
        origin: Option<String>,
    },

    /// List green inventory
    Lots,

    /// Add stock to a lot, or remove it with a negative quantity
    Adjust {
        lot: i64,

        #[arg(allow_hyphen_values = true)]
        quantity: Quantity,
    },

    /// What-if economics for a single-origin roast
    Calc {
        #[arg(short, long)]
        green: Quantity,

        #[arg(short, long)]
        roasted: Quantity,

        /// Green cost per display unit
        #[arg(short, long, conflicts_with = "lot", required_unless_present = "lot")]
        cost: Option<f64>,

        /// Take the green cost from this lot
        #[arg(short, long)]
        lot: Option<i64>,

        #[command(flatten)]
        overhead: OverheadArgs,

        /// Also show the price at this margin (defaults to the default_margin setting)
        #[arg(short, long)]
        margin: Option<f64>,
    },

    /// Price that earns the given margin on price
    Price {
        /// Breakeven cost
        breakeven: f64,

        /// Margin in percent (defaults to the default_margin setting)
        margin: Option<f64>,
    },

    /// Green coffee needed for a target roasted weight
    Plan {
        target: Quantity,

        /// Expected shrinkage in percent
        #[arg(short, long)]
        shrinkage: f64,

        /// Check the requirement against this lot's stock
        #[arg(short, long)]
        lot: Option<i64>,
    },

    /// Save a blend recipe, e.g. `blend-save House 1=60 2=40`
    BlendSave {
        name: String,

        /// Components as LOT_ID=PERCENT
        #[arg(required = true, value_parser = parse_blend_line)]
        components: Vec<BlendLine>,
    },

    /// List saved blends
    Blends,

    /// Per-roasted-weight economics for a saved blend
    BlendCalc {
        name: String,

        /// Target shrinkage in percent
        #[arg(short, long)]
        shrinkage: f64,

        #[command(flatten)]
        overhead: OverheadArgs,

        #[arg(short, long)]
        margin: Option<f64>,
    },

    /// Compute a roast and commit it: log it and take the green weight out of stock
    Roast {
        #[arg(short, long)]
        lot: i64,

        #[arg(short, long)]
        green: Quantity,

        #[arg(short, long)]
        roasted: Quantity,

        #[command(flatten)]
        overhead: OverheadArgs,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Show roast history, newest first
    Roasts {
        #[arg(short, long)]
        lot: Option<i64>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show current settings
    Settings,

    /// Change a setting (labor_rate, gas_rate, utility_rate, default_margin,
    /// reference_batch_kg, display_unit, currency)
    Set { key: String, value: String },
}

fn parse_blend_line(s: &str) -> Result<BlendLine, String> {
    let (lot, pct) = s
        .split_once('=')
        .ok_or_else(|| format!("expected LOT_ID=PERCENT, got '{}'", s))?;
    Ok(BlendLine {
        lot_id: lot.trim().parse().map_err(|_| format!("bad lot id '{}'", lot))?,
        percentage: pct
            .trim()
            .trim_end_matches('%')
            .parse()
            .map_err(|_| format!("bad percentage '{}'", pct))?,
    })
}

/// Turn overhead arguments plus settings into calculator input
fn overhead_options(args: &OverheadArgs, settings: &Settings) -> Option<OverheadOptions> {
    let hours = args.minutes.map(|m| m / 60.0);
    let options = OverheadOptions {
        labor: args.minutes.map(|duration_minutes| LaborCost {
            rate_per_hour: settings.labor_rate_per_hour,
            duration_minutes,
        }),
        gas: args.gas.or(hours.map(|h| settings.gas_rate_per_hour * h)),
        utility: args.utility.or(hours.map(|h| settings.utility_rate_per_hour * h)),
        other: args.other,
    };

    if options == OverheadOptions::default() {
        None
    } else {
        Some(options)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "roastery_calculator=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    let settings = db::load_settings(&conn)?;
    let unit = cli.unit.unwrap_or(settings.display_unit);
    let presentation = Presentation {
        unit,
        currency: settings.currency.clone(),
    };
    tracing::debug!(database = %cli.database.display(), %unit, "loaded settings");

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LotAdd {
            name,
            quantity,
            cost,
            origin,
        } => {
            let id = db::insert_lot(
                &conn,
                &name,
                origin.as_deref(),
                quantity.kg(unit),
                cost_to_per_kg(cost, unit),
            )?;
            println!("Added lot #{}: {}", id, name);
        }

        Commands::Lots => {
            let lots = db::list_lots(&conn)?;
            if cli.json {
                print_json(&lots)?;
            } else if lots.is_empty() {
                println!("No green coffee in inventory. Add some with 'lot-add'.");
            } else {
                print!("{}", report::format_lots(&lots, &presentation));
            }
        }

        Commands::Adjust { lot, quantity } => {
            let remaining = db::adjust_lot_quantity(&mut conn, lot, quantity.kg(unit))?;
            println!("Lot #{} now holds {:.3} {}", lot, from_kg(remaining, unit), unit);
        }

        Commands::Calc {
            green,
            roasted,
            cost,
            lot,
            overhead,
            margin,
        } => {
            let cost_per_kg = match (cost, lot) {
                (Some(cost), _) => cost_to_per_kg(cost, unit),
                (None, Some(lot)) => db::get_lot(&conn, lot)?.cost_per_kg,
                (None, None) => anyhow::bail!("Either --cost or --lot is required"),
            };
            let overhead = overhead_options(&overhead, &settings);
            let result = economics::compute_single_source_economics(
                green.kg(unit),
                roasted.kg(unit),
                cost_per_kg,
                overhead.as_ref(),
            )?;

            let margin = margin.unwrap_or(settings.default_margin_percent);
            let price = result.price_at(margin)?;

            if cli.json {
                print_json(&result)?;
            } else {
                print!(
                    "{}",
                    EconomicsReport {
                        result: &result,
                        presentation: &presentation,
                        extra_price: Some((margin, price)),
                    }
                );
            }
        }

        Commands::Price { breakeven, margin } => {
            let margin = margin.unwrap_or(settings.default_margin_percent);
            let price = economics::price_at_margin(breakeven, margin)?;
            if cli.json {
                print_json(&serde_json::json!({
                    "breakeven": breakeven,
                    "margin_percent": margin,
                    "price": price,
                }))?;
            } else {
                println!(
                    "{}{:.2} at {}% margin (breakeven {}{:.2})",
                    settings.currency, price, margin, settings.currency, breakeven
                );
            }
        }

        Commands::Plan {
            target,
            shrinkage,
            lot,
        } => {
            let target_kg = target.kg(unit);
            let required_kg = economics::reverse_green_required(target_kg, shrinkage)?;
            let lot = lot.map(|id| db::get_lot(&conn, id)).transpose()?;

            if cli.json {
                print_json(&serde_json::json!({
                    "target_roasted_kg": target_kg,
                    "shrinkage_percent": shrinkage,
                    "required_green_kg": required_kg,
                    "lot": lot,
                    "covered": lot.as_ref().map(|l| l.quantity_kg >= required_kg),
                }))?;
            } else {
                println!(
                    "Roast {:.3} {} of green to get {:.3} {} at {}% shrinkage",
                    from_kg(required_kg, unit),
                    unit,
                    from_kg(target_kg, unit),
                    unit,
                    shrinkage
                );
                if let Some(lot) = lot {
                    let on_hand = from_kg(lot.quantity_kg, unit);
                    if lot.quantity_kg >= required_kg {
                        println!("Lot #{} ({}) has {:.3} {}: enough", lot.id, lot.name, on_hand, unit);
                    } else {
                        println!(
                            "Lot #{} ({}) has {:.3} {}: short by {:.3} {}",
                            lot.id,
                            lot.name,
                            on_hand,
                            unit,
                            from_kg(required_kg - lot.quantity_kg, unit),
                            unit
                        );
                    }
                }
            }
        }

        Commands::BlendSave { name, components } => {
            db::save_blend(&mut conn, &name, &components)?;
            println!("Saved blend '{}' ({} components)", name, components.len());
        }

        Commands::Blends => {
            let blends = db::list_blends(&conn)?;
            if cli.json {
                print_json(&blends)?;
            } else if blends.is_empty() {
                println!("No blends saved. Create one with 'blend-save'.");
            } else {
                let lots = db::list_lots(&conn)?;
                for blend in &blends {
                    print!("{}", report::format_blend(blend, &lots));
                }
            }
        }

        Commands::BlendCalc {
            name,
            shrinkage,
            overhead,
            margin,
        } => {
            let blend = db::get_blend(&conn, &name)?;
            let components = db::blend_components(&conn, &blend)?;
            let overhead = overhead_options(&overhead, &settings);
            let result = economics::compute_blend_economics(
                &components,
                shrinkage,
                overhead.as_ref(),
                settings.reference_batch_kg,
            )?;

            let margin = margin.unwrap_or(settings.default_margin_percent);
            let price = result.price_at(margin)?;

            if cli.json {
                print_json(&result)?;
            } else {
                print!(
                    "{}",
                    BlendReport {
                        name: &blend.name,
                        result: &result,
                        presentation: &presentation,
                        extra_price: Some((margin, price)),
                    }
                );
            }
        }

        Commands::Roast {
            lot,
            green,
            roasted,
            overhead,
            notes,
        } => {
            let green_lot = db::get_lot(&conn, lot)?;
            let overhead = overhead_options(&overhead, &settings);
            let result = economics::compute_single_source_economics(
                green.kg(unit),
                roasted.kg(unit),
                green_lot.cost_per_kg,
                overhead.as_ref(),
            )?;
            let log = db::commit_roast(&mut conn, lot, &result, notes.as_deref())?;

            if cli.json {
                print_json(&log)?;
            } else {
                let price = result.price_at(settings.default_margin_percent)?;
                print!(
                    "{}",
                    EconomicsReport {
                        result: &result,
                        presentation: &presentation,
                        extra_price: Some((settings.default_margin_percent, price)),
                    }
                );
                println!();
                println!("Logged roast #{} from lot #{} ({})", log.id, lot, green_lot.name);
            }
        }

        Commands::Roasts { lot, limit } => {
            let roasts = db::list_roasts(&conn, lot, limit)?;
            if cli.json {
                print_json(&roasts)?;
            } else if roasts.is_empty() {
                println!("No roasts logged yet.");
            } else {
                print!("{}", report::format_roasts(&roasts, &presentation));
            }
        }

        Commands::Settings => {
            if cli.json {
                print_json(&settings)?;
            } else {
                println!("labor_rate          {}{:.2}/h", settings.currency, settings.labor_rate_per_hour);
                println!("gas_rate            {}{:.2}/h", settings.currency, settings.gas_rate_per_hour);
                println!("utility_rate        {}{:.2}/h", settings.currency, settings.utility_rate_per_hour);
                println!("default_margin      {}%", settings.default_margin_percent);
                println!("reference_batch_kg  {} kg", settings.reference_batch_kg);
                println!("display_unit        {}", settings.display_unit);
                println!("currency            {}", settings.currency);
            }
        }

        Commands::Set { key, value } => {
            db::set_setting(&conn, &key, &value)?;
            println!("{} = {}", key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blend_line() {
        let line = parse_blend_line("3=60").unwrap();
        assert_eq!(line.lot_id, 3);
        assert_eq!(line.percentage, 60.0);

        assert_eq!(parse_blend_line(" 7 = 39.5% ").unwrap().percentage, 39.5);
        assert!(parse_blend_line("3:60").is_err());
        assert!(parse_blend_line("x=60").is_err());
    }

    #[test]
    fn test_overhead_from_settings() {
        let settings = Settings {
            labor_rate_per_hour: 30.0,
            gas_rate_per_hour: 6.0,
            ..Settings::default()
        };
        let args = OverheadArgs {
            minutes: Some(12.0),
            utility: Some(0.5),
            ..OverheadArgs::default()
        };

        let options = overhead_options(&args, &settings).unwrap();
        assert_eq!(
            options.labor,
            Some(LaborCost {
                rate_per_hour: 30.0,
                duration_minutes: 12.0
            })
        );
        assert!((options.gas.unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(options.utility, Some(0.5));
        assert!((options.operational_cost().unwrap() - 7.7).abs() < 1e-9);
    }

    #[test]
    fn test_no_overhead_args_means_no_overhead() {
        assert_eq!(overhead_options(&OverheadArgs::default(), &Settings::default()), None);
    }

    #[test]
    fn test_cli_parses_roast_command() {
        let cli = Cli::try_parse_from([
            "roastery-calculator",
            "--unit",
            "lb",
            "roast",
            "--lot",
            "2",
            "--green",
            "22 lb",
            "--roasted",
            "8.5kg",
            "--minutes",
            "14",
        ])
        .unwrap();

        assert_eq!(cli.unit, Some(MassUnit::Pounds));
        match cli.command {
            Commands::Roast {
                lot,
                green,
                roasted,
                overhead,
                ..
            } => {
                assert_eq!(lot, 2);
                assert_eq!(green.unit, Some(MassUnit::Pounds));
                assert_eq!(roasted.kg(MassUnit::Pounds), 8.5);
                assert_eq!(overhead.minutes, Some(14.0));
            }
            _ => panic!("expected roast command"),
        }
    }

    #[test]
    fn test_calc_needs_cost_or_lot() {
        let base = ["roastery-calculator", "calc", "--green", "10", "--roasted", "8.5"];
        assert!(Cli::try_parse_from(base).is_err());
        assert!(Cli::try_parse_from(base.iter().copied().chain(["--cost", "6.5"])).is_ok());
        assert!(Cli::try_parse_from(base.iter().copied().chain(["--lot", "1"])).is_ok());
        assert!(Cli::try_parse_from(base.iter().copied().chain(["--lot", "1", "--cost", "2"])).is_err());
    }
}
