//! Cost-layer math behind the stock valuation report.
//!
//! Layers are `IN` ledger rows that carry a unit cost, oldest first. Nothing here
//! touches storage, so the same inputs always produce the same figures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostLayer {
    pub quantity: i32,
    pub unit_cost: Decimal,
}

impl CostLayer {
    pub fn new(quantity: i32, unit_cost: Decimal) -> Self {
        Self {
            quantity,
            unit_cost,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValuationMode {
    #[default]
    Fifo,
    WeightedAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerValuation {
    pub unit_cost: Option<Decimal>,
    pub total_value: Decimal,
}

impl ValuationMode {
    pub fn value(self, on_hand: i32, layers: &[CostLayer]) -> LayerValuation {
        match self {
            ValuationMode::Fifo => fifo(on_hand, layers),
            ValuationMode::WeightedAverage => weighted_average(on_hand, layers),
        }
    }
}

fn usable(layers: &[CostLayer]) -> impl DoubleEndedIterator<Item = &CostLayer> {
    layers.iter().filter(|layer| layer.quantity > 0)
}

/// Values the on-hand quantity as if it were made of the most recent receipts.
///
/// Issues are not matched to specific layers: the newest `min(on_hand, received)`
/// units are kept and everything older is treated as consumed.
pub fn fifo(on_hand: i32, layers: &[CostLayer]) -> LayerValuation {
    let total_value = fifo_total(on_hand, layers);
    let unit_cost = if on_hand > 0 {
        Some(total_value / Decimal::from(on_hand))
    } else {
        None
    };
    LayerValuation {
        unit_cost,
        total_value,
    }
}

fn fifo_total(on_hand: i32, layers: &[CostLayer]) -> Decimal {
    if on_hand <= 0 {
        return Decimal::ZERO;
    }
    let received: i64 = usable(layers).map(|layer| i64::from(layer.quantity)).sum();
    if received <= 0 {
        return Decimal::ZERO;
    }

    let mut remaining = i64::from(on_hand).min(received);
    let mut total = Decimal::ZERO;
    for layer in usable(layers).rev() {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(i64::from(layer.quantity));
        total += Decimal::from(take) * layer.unit_cost;
        remaining -= take;
    }
    total
}

/// `Σ(q·c) / Σq` over every layer, applied to the on-hand quantity.
pub fn weighted_average(on_hand: i32, layers: &[CostLayer]) -> LayerValuation {
    let (quantity, cost) = usable(layers).fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(quantity, cost), layer| {
            let q = Decimal::from(layer.quantity);
            (quantity + q, cost + q * layer.unit_cost)
        },
    );

    if quantity.is_zero() {
        return LayerValuation {
            unit_cost: None,
            total_value: Decimal::ZERO,
        };
    }

    let unit_cost = cost / quantity;
    LayerValuation {
        unit_cost: Some(unit_cost),
        total_value: Decimal::from(on_hand) * unit_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn layers() -> Vec<CostLayer> {
        vec![CostLayer::new(10, dec!(5.00)), CostLayer::new(5, dec!(8.00))]
    }

    #[test]
    fn fifo_with_everything_on_hand_values_all_layers() {
        let valuation = fifo(15, &layers());
        assert_eq!(valuation.total_value, dec!(90.00));
        assert_eq!(valuation.unit_cost, Some(dec!(6.00)));
    }

    #[test]
    fn fifo_keeps_newest_units() {
        let valuation = fifo(3, &layers());
        assert_eq!(valuation.total_value, dec!(24.00));
        assert_eq!(valuation.unit_cost, Some(dec!(8.00)));

        let valuation = fifo(7, &layers());
        assert_eq!(valuation.total_value, dec!(50.00));
    }

    #[test]
    fn fifo_caps_at_received_quantity() {
        // Adjustments can push on-hand above what was ever received at cost
        let valuation = fifo(20, &layers());
        assert_eq!(valuation.total_value, dec!(90.00));
        assert_eq!(valuation.unit_cost, Some(dec!(4.50)));
    }

    #[test]
    fn fifo_without_layers_is_zero() {
        let valuation = fifo(4, &[]);
        assert_eq!(valuation.total_value, Decimal::ZERO);
        assert_eq!(valuation.unit_cost, Some(Decimal::ZERO));

        assert_eq!(fifo(0, &layers()).unit_cost, None);
    }

    #[test]
    fn weighted_average_blends_all_layers() {
        let valuation = weighted_average(3, &layers());
        assert_eq!(valuation.unit_cost, Some(dec!(6)));
        assert_eq!(valuation.total_value, dec!(18));
    }

    #[test]
    fn weighted_average_without_layers_has_no_unit_cost() {
        let valuation = weighted_average(5, &[]);
        assert_eq!(valuation.unit_cost, None);
        assert_eq!(valuation.total_value, Decimal::ZERO);
    }

    #[test]
    fn non_positive_layers_are_ignored() {
        let mut with_noise = layers();
        with_noise.insert(1, CostLayer::new(0, dec!(100)));
        with_noise.push(CostLayer::new(-2, dec!(100)));
        assert_eq!(fifo(15, &with_noise), fifo(15, &layers()));
        assert_eq!(weighted_average(15, &with_noise), weighted_average(15, &layers()));
    }

    #[test]
    fn mode_parses_from_query_strings() {
        assert_eq!(ValuationMode::from_str("fifo").unwrap(), ValuationMode::Fifo);
        assert_eq!(
            ValuationMode::from_str("weighted_average").unwrap(),
            ValuationMode::WeightedAverage
        );
        assert!(ValuationMode::from_str("lifo").is_err());
        assert_eq!(ValuationMode::default(), ValuationMode::Fifo);
    }
}
