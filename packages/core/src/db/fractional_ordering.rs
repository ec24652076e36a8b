//! Fractional execution ordering
//!
//! Work items in a space are totally ordered by a floating-point `execution_order`,
//! highest first. Moving an item only rewrites that item's order: the new value is
//! placed between its new neighbours. When two neighbours get closer than the
//! configured minimum gap the calculator asks for a rebalance instead, and the caller
//! re-spaces the whole space once before placing again.

use crate::config::OrderingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderDirection {
    Above,
    Below,
    Top,
    Bottom,
}

impl ReorderDirection {
    /// Above and Below are relative to a target item
    pub fn needs_target(&self) -> bool {
        matches!(self, ReorderDirection::Above | ReorderDirection::Below)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReorderDirection::Above => "above",
            ReorderDirection::Below => "below",
            ReorderDirection::Top => "top",
            ReorderDirection::Bottom => "bottom",
        }
    }
}

impl fmt::Display for ReorderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReorderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "above" => Ok(ReorderDirection::Above),
            "below" => Ok(ReorderDirection::Below),
            "top" => Ok(ReorderDirection::Top),
            "bottom" => Ok(ReorderDirection::Bottom),
            other => Err(format!("unknown reorder direction: {}", other)),
        }
    }
}

/// A neighbouring item as seen by the calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedItem {
    pub id: Uuid,
    pub execution_order: f64,
}

impl OrderedItem {
    pub fn new(id: Uuid, execution_order: f64) -> Self {
        Self {
            id,
            execution_order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderPlacement {
    /// The item already sits where it was asked to go
    Unchanged,
    At(f64),
    /// Neighbours are too close; re-space the space and place again
    Rebalance,
}

/// Calculates execution orders for placing an item relative to its neighbours
pub struct FractionalOrderCalculator;

impl FractionalOrderCalculator {
    /// Calculate order value for inserting between a lower and a higher neighbour
    ///
    /// # Examples
    /// ```
    /// use witrack_core::db::FractionalOrderCalculator;
    ///
    /// // First item in an empty space
    /// assert_eq!(FractionalOrderCalculator::calculate_order(None, None, 1000.0), 1000.0);
    /// // New top item
    /// assert_eq!(FractionalOrderCalculator::calculate_order(Some(3000.0), None, 1000.0), 4000.0);
    /// // Between two items
    /// assert_eq!(FractionalOrderCalculator::calculate_order(Some(1000.0), Some(2000.0), 1000.0), 1500.0);
    /// ```
    pub fn calculate_order(lower: Option<f64>, higher: Option<f64>, gap: f64) -> f64 {
        match (lower, higher) {
            (None, None) => gap,
            (None, Some(higher)) => higher / 2.0,
            (Some(lower), None) => lower + gap,
            (Some(lower), Some(higher)) => (lower + higher) / 2.0,
        }
    }

    /// Move an item directly above `target`
    ///
    /// `above` is the item currently directly above the target, if any.
    pub fn place_above(
        item_id: Uuid,
        target: &OrderedItem,
        above: Option<&OrderedItem>,
        config: &OrderingConfig,
    ) -> OrderPlacement {
        match above {
            Some(above) if above.id == item_id => OrderPlacement::Unchanged,
            Some(above) => {
                Self::between(target.execution_order, above.execution_order, config)
            }
            None => OrderPlacement::At(Self::calculate_order(
                Some(target.execution_order),
                None,
                config.gap,
            )),
        }
    }

    /// Move an item directly below `target`
    ///
    /// `below` is the item currently directly below the target; without one the
    /// lower bound is 0.
    pub fn place_below(
        item_id: Uuid,
        target: &OrderedItem,
        below: Option<&OrderedItem>,
        config: &OrderingConfig,
    ) -> OrderPlacement {
        match below {
            Some(below) if below.id == item_id => OrderPlacement::Unchanged,
            Some(below) => Self::between(below.execution_order, target.execution_order, config),
            None => Self::between(0.0, target.execution_order, config),
        }
    }

    pub fn place_top(item_id: Uuid, highest: &OrderedItem, config: &OrderingConfig) -> OrderPlacement {
        if highest.id == item_id {
            return OrderPlacement::Unchanged;
        }
        OrderPlacement::At(Self::calculate_order(
            Some(highest.execution_order),
            None,
            config.gap,
        ))
    }

    pub fn place_bottom(item_id: Uuid, lowest: &OrderedItem, config: &OrderingConfig) -> OrderPlacement {
        if lowest.id == item_id {
            return OrderPlacement::Unchanged;
        }
        Self::between(0.0, lowest.execution_order, config)
    }

    fn between(lower: f64, higher: f64, config: &OrderingConfig) -> OrderPlacement {
        let candidate = Self::calculate_order(Some(lower), Some(higher), config.gap);
        let exhausted = candidate <= lower || candidate >= higher;
        if exhausted || Self::needs_rebalancing(&[lower, higher], config.min_gap) {
            return OrderPlacement::Rebalance;
        }
        OrderPlacement::At(candidate)
    }

    /// Check if rebalancing is needed (gap too small)
    ///
    /// `orders` must be sorted ascending.
    pub fn needs_rebalancing(orders: &[f64], min_gap: f64) -> bool {
        orders.windows(2).any(|pair| pair[1] - pair[0] < min_gap)
    }

    /// Evenly spaced orders for `count` items, lowest first
    ///
    /// # Example
    /// Input:  count = 4, gap = 1000
    /// Output: [1000.0, 2000.0, 3000.0, 4000.0]
    pub fn rebalance(count: usize, gap: f64) -> Vec<f64> {
        (1..=count).map(|rank| rank as f64 * gap).collect()
    }
}
