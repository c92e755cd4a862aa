//! Relative cost of a candidate scan.

use serde::{Deserialize, Serialize};

use crate::filter::Operator;
use crate::value::Order;

/// One requested sort key and whether the adapter produces it natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub order: Order,
    pub native: bool,
}

/// Parameters of the default cost function.
///
/// `window` is the number of pages (or days, requests, ...) a non-equality
/// constraint is expected to touch. An equality touches one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    pub fixed_cost: u64,
    pub filter_cost: u64,
    pub window: u64,
    pub sort_cost: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            fixed_cost: 0,
            filter_cost: 1000,
            window: 1,
            sort_cost: 1000,
        }
    }
}

impl CostModel {
    pub fn with_window(window: u64) -> Self {
        Self {
            window: window.max(1),
            ..Self::default()
        }
    }

    /// Estimate the cost of pushing `filtered` and producing `order`.
    pub fn estimate(&self, filtered: &[(String, Operator)], order: &[SortKey]) -> u64 {
        let filters = filtered.iter().fold(0u64, |acc, (_, op)| {
            let weight = match op {
                Operator::Eq | Operator::IsNull | Operator::IsNotNull => 1,
                _ => self.window,
            };
            acc.saturating_add(self.filter_cost.saturating_mul(weight))
        });
        let sorts = order
            .iter()
            .filter(|key| !key.native)
            .fold(0u64, |acc, _| acc.saturating_add(self.sort_cost));
        self.fixed_cost.saturating_add(filters).saturating_add(sorts)
    }
}
