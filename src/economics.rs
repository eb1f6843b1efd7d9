//! Roast economics and blend costing
//!
//! Pure functions that turn green weights, roasted weights, cost rates and
//! overhead into a cost/margin breakdown. Masses are kilograms and costs are
//! currency per kilogram; percentages are plain numbers in `[0, 100]`.
//! Nothing in here reads settings, touches the database or logs.

use serde::Serialize;
use thiserror::Error;

/// Margins (price-based, in percent) every result carries a suggested price for
pub const REFERENCE_MARGINS: [f64; 2] = [30.0, 50.0];

/// How far a blend's share total may drift from 100 and still be valid
pub const BLEND_TOLERANCE: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EconomicsError {
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),

    #[error("Invalid cost: {0}")]
    InvalidCost(String),

    #[error("Shrinkage must be between 0 and 100% (got {0}%)")]
    InvalidShrinkage(f64),

    #[error("Margin must be between 0 and 100% (got {0}%)")]
    InvalidMargin(f64),

    #[error("Blend totals {total}%, must equal 100%")]
    BlendImbalance { total: f64 },

    #[error("Blend component share must be a finite, non-negative percentage (got {0}%)")]
    InvalidShare(f64),

    #[error("Reference batch size must be positive (got {0} kg)")]
    InvalidBatch(f64),
}

pub type Result<T> = std::result::Result<T, EconomicsError>;

/// Labor is only charged when both the rate and the duration are known
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaborCost {
    pub rate_per_hour: f64,
    pub duration_minutes: f64,
}

/// Additive overhead for one roast batch. Absent terms contribute zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverheadOptions {
    pub labor: Option<LaborCost>,
    pub gas: Option<f64>,
    pub utility: Option<f64>,
    pub other: Option<f64>,
}

impl OverheadOptions {
    /// Sum of the supplied overhead terms
    pub fn operational_cost(&self) -> Result<f64> {
        let mut total = 0.0;

        if let Some(labor) = &self.labor {
            non_negative_cost("labor rate", labor.rate_per_hour)?;
            if !(labor.duration_minutes >= 0.0 && labor.duration_minutes.is_finite()) {
                return Err(EconomicsError::InvalidCost(format!(
                    "roast duration must be a finite, non-negative number of minutes (got {})",
                    labor.duration_minutes
                )));
            }
            total += labor.rate_per_hour * (labor.duration_minutes / 60.0);
        }

        for (name, value) in [
            ("gas cost", self.gas),
            ("utility cost", self.utility),
            ("other overhead", self.other),
        ] {
            if let Some(value) = value {
                non_negative_cost(name, value)?;
                total += value;
            }
        }

        Ok(total)
    }
}

/// Cost breakdown for a single-origin roast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicsResult {
    pub green_kg: f64,
    pub roasted_kg: f64,
    pub shrinkage_loss_kg: f64,
    pub shrinkage_percent: f64,
    pub green_cost: f64,
    pub operational_cost: f64,
    pub total_cost: f64,
    /// Breakeven price per roasted kilogram
    pub cost_per_roasted_kg: f64,
    pub price_at_30: f64,
    pub price_at_50: f64,
}

impl EconomicsResult {
    pub fn price_at(&self, margin_percent: f64) -> Result<f64> {
        price_at_margin(self.cost_per_roasted_kg, margin_percent)
    }
}

/// One source in a blend: its green cost per kg and its share of the batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlendComponent {
    pub cost_per_kg: f64,
    pub percentage: f64,
}

/// Per-roasted-kilogram cost breakdown for a blend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlendResult {
    pub total_share: f64,
    pub target_shrinkage_percent: f64,
    /// Share-weighted green cost per green kg
    pub weighted_green_cost: f64,
    pub green_cost_per_roasted: f64,
    pub operational_cost_per_roasted: f64,
    pub total_cost_per_roasted: f64,
    pub price_at_30: f64,
    pub price_at_50: f64,
}

impl BlendResult {
    pub fn price_at(&self, margin_percent: f64) -> Result<f64> {
        price_at_margin(self.total_cost_per_roasted, margin_percent)
    }
}

/// Compute the full breakdown for one roast of a single green source
pub fn compute_single_source_economics(
    green_kg: f64,
    roasted_kg: f64,
    green_cost_per_kg: f64,
    overhead: Option<&OverheadOptions>,
) -> Result<EconomicsResult> {
    if !(green_kg > 0.0) || !(roasted_kg > 0.0) {
        return Err(EconomicsError::InvalidWeight(
            "weights must be positive".to_string(),
        ));
    }
    if !green_kg.is_finite() || !roasted_kg.is_finite() {
        return Err(EconomicsError::InvalidWeight(
            "weights must be finite".to_string(),
        ));
    }
    if roasted_kg > green_kg {
        return Err(EconomicsError::InvalidWeight(format!(
            "roasted weight cannot exceed green weight (violates physics): {} kg > {} kg",
            roasted_kg, green_kg
        )));
    }
    non_negative_cost("green cost", green_cost_per_kg)?;

    let shrinkage_percent = shrinkage_percent(green_kg, roasted_kg);
    let shrinkage_loss_kg = green_kg - roasted_kg;
    let green_cost = green_kg * green_cost_per_kg;
    let operational_cost = match overhead {
        Some(options) => options.operational_cost()?,
        None => 0.0,
    };
    let total_cost = green_cost + operational_cost;
    let cost_per_roasted_kg = total_cost / roasted_kg;

    let [low, high] = reference_prices(cost_per_roasted_kg)?;

    Ok(EconomicsResult {
        green_kg,
        roasted_kg,
        shrinkage_loss_kg,
        shrinkage_percent,
        green_cost,
        operational_cost,
        total_cost,
        cost_per_roasted_kg,
        price_at_30: low,
        price_at_50: high,
    })
}

/// Price that yields `margin_percent` of the price as profit.
///
/// Margin is `(price - cost) / price`, so the price is `cost / (1 - m/100)`.
pub fn price_at_margin(breakeven: f64, margin_percent: f64) -> Result<f64> {
    non_negative_cost("breakeven cost", breakeven)?;
    if !(0.0..100.0).contains(&margin_percent) {
        return Err(EconomicsError::InvalidMargin(margin_percent));
    }
    Ok(breakeven / (1.0 - margin_percent / 100.0))
}

/// Green weight needed to end up with `target_roasted_kg` after roasting
pub fn reverse_green_required(target_roasted_kg: f64, expected_shrinkage_percent: f64) -> Result<f64> {
    if !(target_roasted_kg > 0.0 && target_roasted_kg.is_finite()) {
        return Err(EconomicsError::InvalidWeight(format!(
            "target roasted weight must be positive and finite (got {} kg)",
            target_roasted_kg
        )));
    }
    check_shrinkage(expected_shrinkage_percent)?;

    let required = target_roasted_kg / (1.0 - expected_shrinkage_percent / 100.0);
    if !required.is_finite() {
        return Err(EconomicsError::InvalidWeight(format!(
            "required green weight for {} kg is too large to represent",
            target_roasted_kg
        )));
    }
    Ok(required)
}

/// Mass lost in roasting as a percentage of green mass
pub fn shrinkage_percent(green_kg: f64, roasted_kg: f64) -> f64 {
    (green_kg - roasted_kg) / green_kg * 100.0
}

/// Check component shares and costs, returning the share total
pub fn validate_blend(components: &[BlendComponent]) -> Result<f64> {
    let mut total = 0.0;
    for component in components {
        if !(component.percentage >= 0.0 && component.percentage.is_finite()) {
            return Err(EconomicsError::InvalidShare(component.percentage));
        }
        non_negative_cost("component cost", component.cost_per_kg)?;
        total += component.percentage;
    }

    if !((total - 100.0).abs() <= BLEND_TOLERANCE) {
        return Err(EconomicsError::BlendImbalance { total });
    }
    Ok(total)
}

/// Compute per-roasted-kilogram costs for a blend.
///
/// Overhead is spread over `reference_batch_kg` of green coffee, i.e. over
/// `reference_batch_kg * (1 - shrinkage)` of roasted output.
pub fn compute_blend_economics(
    components: &[BlendComponent],
    target_shrinkage_percent: f64,
    overhead: Option<&OverheadOptions>,
    reference_batch_kg: f64,
) -> Result<BlendResult> {
    let total_share = validate_blend(components)?;
    check_shrinkage(target_shrinkage_percent)?;
    if !(reference_batch_kg > 0.0 && reference_batch_kg.is_finite()) {
        return Err(EconomicsError::InvalidBatch(reference_batch_kg));
    }

    let yield_fraction = 1.0 - target_shrinkage_percent / 100.0;

    let weighted_green_cost: f64 = components
        .iter()
        .map(|c| c.cost_per_kg * c.percentage / 100.0)
        .sum();
    let green_cost_per_roasted = weighted_green_cost / yield_fraction;

    let operational_cost_per_roasted = match overhead {
        Some(options) => options.operational_cost()? / (reference_batch_kg * yield_fraction),
        None => 0.0,
    };
    let total_cost_per_roasted = green_cost_per_roasted + operational_cost_per_roasted;

    let [low, high] = reference_prices(total_cost_per_roasted)?;

    Ok(BlendResult {
        total_share,
        target_shrinkage_percent,
        weighted_green_cost,
        green_cost_per_roasted,
        operational_cost_per_roasted,
        total_cost_per_roasted,
        price_at_30: low,
        price_at_50: high,
    })
}

fn reference_prices(breakeven: f64) -> Result<[f64; 2]> {
    Ok([
        price_at_margin(breakeven, REFERENCE_MARGINS[0])?,
        price_at_margin(breakeven, REFERENCE_MARGINS[1])?,
    ])
}

fn check_shrinkage(percent: f64) -> Result<()> {
    if !(0.0..100.0).contains(&percent) {
        return Err(EconomicsError::InvalidShrinkage(percent));
    }
    Ok(())
}

fn non_negative_cost(what: &str, value: f64) -> Result<()> {
    if !(value >= 0.0) {
        return Err(EconomicsError::InvalidCost(format!(
            "{} cannot be negative (got {})",
            what, value
        )));
    }
    if !value.is_finite() {
        return Err(EconomicsError::InvalidCost(format!(
            "{} must be finite (got {})",
            what, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_single_origin_without_overhead() {
        let r = compute_single_source_economics(10.0, 8.5, 6.5, None).unwrap();
        assert!(close(r.shrinkage_percent, 15.0, EPS));
        assert!(close(r.shrinkage_loss_kg, 1.5, EPS));
        assert!(close(r.green_cost, 65.0, EPS));
        assert_eq!(r.operational_cost, 0.0);
        assert!(close(r.total_cost, 65.0, EPS));
        assert!(close(r.cost_per_roasted_kg, 7.647, 0.001));
    }

    #[test]
    fn test_single_origin_with_labor() {
        let overhead = OverheadOptions {
            labor: Some(LaborCost {
                rate_per_hour: 30.0,
                duration_minutes: 12.0,
            }),
            ..Default::default()
        };
        let r = compute_single_source_economics(10.0, 8.5, 6.5, Some(&overhead)).unwrap();
        assert!(close(r.operational_cost, 6.0, EPS));
        assert!(close(r.total_cost, 71.0, EPS));
        assert!(close(r.cost_per_roasted_kg, 8.353, 0.001));
    }

    #[test]
    fn test_all_overhead_terms_add_up() {
        let overhead = OverheadOptions {
            labor: Some(LaborCost {
                rate_per_hour: 20.0,
                duration_minutes: 30.0,
            }),
            gas: Some(2.5),
            utility: Some(1.25),
            other: Some(0.75),
        };
        assert!(close(overhead.operational_cost().unwrap(), 14.5, EPS));
        assert_eq!(OverheadOptions::default().operational_cost().unwrap(), 0.0);
    }

    #[test]
    fn test_reference_prices_on_result() {
        let r = compute_single_source_economics(10.0, 8.5, 6.5, None).unwrap();
        assert!(close(r.price_at_30, r.cost_per_roasted_kg / 0.7, EPS));
        assert!(close(r.price_at_50, r.cost_per_roasted_kg * 2.0, EPS));
        assert!(close(r.price_at(40.0).unwrap(), r.cost_per_roasted_kg / 0.6, EPS));
    }

    #[test]
    fn test_roasted_heavier_than_green_is_rejected() {
        let err = compute_single_source_economics(8.0, 8.5, 6.5, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidWeight(_)));
        assert!(err.to_string().contains("cannot exceed green weight"));
    }

    #[test]
    fn test_non_positive_weights_are_rejected() {
        for (green, roasted) in [(0.0, 0.0), (10.0, 0.0), (-1.0, -2.0), (f64::NAN, 1.0)] {
            let err = compute_single_source_economics(green, roasted, 5.0, None).unwrap_err();
            assert!(matches!(err, EconomicsError::InvalidWeight(_)), "{green} {roasted}");
        }
    }

    #[test]
    fn test_negative_costs_are_rejected() {
        let err = compute_single_source_economics(10.0, 8.5, -1.0, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));

        let overhead = OverheadOptions {
            gas: Some(-3.0),
            ..Default::default()
        };
        let err = compute_single_source_economics(10.0, 8.5, 6.5, Some(&overhead)).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));

        let overhead = OverheadOptions {
            labor: Some(LaborCost {
                rate_per_hour: 30.0,
                duration_minutes: -12.0,
            }),
            ..Default::default()
        };
        assert!(matches!(
            overhead.operational_cost(),
            Err(EconomicsError::InvalidCost(_))
        ));
    }

    #[test]
    fn test_infinite_inputs_are_rejected() {
        let err = compute_single_source_economics(f64::INFINITY, 1.0, 5.0, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidWeight(_)));
        let err = compute_single_source_economics(f64::INFINITY, f64::INFINITY, 5.0, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidWeight(_)));

        let err = compute_single_source_economics(10.0, 8.5, f64::INFINITY, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));

        let gas = OverheadOptions {
            gas: Some(f64::INFINITY),
            ..Default::default()
        };
        let err = compute_single_source_economics(10.0, 8.5, 6.5, Some(&gas)).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));
        let err = compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, Some(&gas), 10.0)
            .unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));

        let labor = OverheadOptions {
            labor: Some(LaborCost {
                rate_per_hour: 30.0,
                duration_minutes: f64::INFINITY,
            }),
            ..Default::default()
        };
        assert!(matches!(
            labor.operational_cost(),
            Err(EconomicsError::InvalidCost(_))
        ));

        assert!(matches!(
            price_at_margin(f64::INFINITY, 30.0),
            Err(EconomicsError::InvalidCost(_))
        ));
        assert!(matches!(
            reverse_green_required(f64::INFINITY, 15.0),
            Err(EconomicsError::InvalidWeight(_))
        ));
        assert!(matches!(
            validate_blend(&two_origin_blend(f64::INFINITY, 40.0)),
            Err(EconomicsError::InvalidShare(_))
        ));
        assert!(matches!(
            compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, None, f64::INFINITY),
            Err(EconomicsError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_overflowing_result_is_rejected() {
        let err = compute_single_source_economics(1e300, 1e-300, 1e300, None).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidCost(_)));
    }

    #[test]
    fn test_shrinkage_properties() {
        for (green, roasted) in [(10.0, 8.5), (1.0, 0.999), (50.0, 0.5), (3.3, 2.7)] {
            let r = compute_single_source_economics(green, roasted, 4.0, None).unwrap();
            assert!(r.shrinkage_percent > 0.0 && r.shrinkage_percent < 100.0);
            assert_eq!(r.shrinkage_loss_kg, green - roasted);
        }
    }

    #[test]
    fn test_price_at_margin() {
        assert!(close(price_at_margin(7.65, 50.0).unwrap(), 15.30, EPS));
        assert_eq!(price_at_margin(7.65, 0.0).unwrap(), 7.65);

        let mut last = 0.0;
        for m in [0.0, 10.0, 25.0, 50.0, 75.0, 99.0, 99.9] {
            let price = price_at_margin(7.65, m).unwrap();
            assert!(price > last);
            last = price;
        }
    }

    #[test]
    fn test_price_at_margin_out_of_range() {
        for m in [100.0, 120.0, -5.0, f64::NAN] {
            assert!(matches!(
                price_at_margin(7.65, m),
                Err(EconomicsError::InvalidMargin(_))
            ));
        }
        assert!(matches!(
            price_at_margin(-1.0, 30.0),
            Err(EconomicsError::InvalidCost(_))
        ));
    }

    #[test]
    fn test_reverse_green_required_round_trip() {
        for (target, s) in [(8.5, 15.0), (100.0, 0.0), (1.0, 22.5), (12.0, 99.0)] {
            let green = reverse_green_required(target, s).unwrap();
            assert!(close(shrinkage_percent(green, target), s, 1e-9));
        }
    }

    #[test]
    fn test_reverse_green_required_validation() {
        assert!(matches!(
            reverse_green_required(0.0, 15.0),
            Err(EconomicsError::InvalidWeight(_))
        ));
        assert!(matches!(
            reverse_green_required(10.0, 100.0),
            Err(EconomicsError::InvalidShrinkage(_))
        ));
        assert!(matches!(
            reverse_green_required(10.0, -1.0),
            Err(EconomicsError::InvalidShrinkage(_))
        ));
        assert!(matches!(
            reverse_green_required(10.0, f64::NAN),
            Err(EconomicsError::InvalidShrinkage(_))
        ));
    }

    fn two_origin_blend(first: f64, second: f64) -> Vec<BlendComponent> {
        vec![
            BlendComponent {
                cost_per_kg: 5.0,
                percentage: first,
            },
            BlendComponent {
                cost_per_kg: 7.0,
                percentage: second,
            },
        ]
    }

    #[test]
    fn test_blend_economics() {
        let r = compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, None, 10.0).unwrap();
        assert!(close(r.weighted_green_cost, 5.80, EPS));
        assert!(close(r.green_cost_per_roasted, 6.824, 0.001));
        assert_eq!(r.operational_cost_per_roasted, 0.0);
        assert!(close(r.total_cost_per_roasted, r.green_cost_per_roasted, EPS));
        assert!(close(r.price_at_50, 2.0 * r.total_cost_per_roasted, EPS));
    }

    #[test]
    fn test_blend_overhead_is_spread_over_reference_batch() {
        let overhead = OverheadOptions {
            other: Some(8.5),
            ..Default::default()
        };
        // 10 kg green at 15% shrinkage leaves 8.5 kg roasted
        let r = compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, Some(&overhead), 10.0)
            .unwrap();
        assert!(close(r.operational_cost_per_roasted, 1.0, EPS));
        assert!(close(
            r.total_cost_per_roasted,
            r.green_cost_per_roasted + 1.0,
            EPS
        ));
    }

    #[test]
    fn test_blend_share_tolerance() {
        for (a, b) in [(60.0, 37.0), (60.0, 43.0)] {
            let err = compute_blend_economics(&two_origin_blend(a, b), 15.0, None, 10.0).unwrap_err();
            assert!(matches!(err, EconomicsError::BlendImbalance { .. }));
        }
        let err = validate_blend(&two_origin_blend(60.0, 37.0)).unwrap_err();
        assert_eq!(err.to_string(), "Blend totals 97%, must equal 100%");

        assert!(compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, None, 10.0).is_ok());
        assert!(compute_blend_economics(&two_origin_blend(60.0, 39.95), 15.0, None, 10.0).is_ok());
    }

    #[test]
    fn test_blend_rejects_bad_inputs() {
        assert!(matches!(
            validate_blend(&[]),
            Err(EconomicsError::BlendImbalance { .. })
        ));
        assert!(matches!(
            validate_blend(&two_origin_blend(110.0, -10.0)),
            Err(EconomicsError::InvalidShare(_))
        ));
        assert!(matches!(
            validate_blend(&two_origin_blend(60.0, f64::NAN)),
            Err(EconomicsError::InvalidShare(_))
        ));
        assert!(matches!(
            compute_blend_economics(&two_origin_blend(60.0, 40.0), f64::NAN, None, 10.0),
            Err(EconomicsError::InvalidShrinkage(_))
        ));
        assert!(matches!(
            compute_blend_economics(&two_origin_blend(60.0, 40.0), 100.0, None, 10.0),
            Err(EconomicsError::InvalidShrinkage(_))
        ));
        assert!(matches!(
            compute_blend_economics(&two_origin_blend(60.0, 40.0), 15.0, None, 0.0),
            Err(EconomicsError::InvalidBatch(_))
        ));
    }
}
