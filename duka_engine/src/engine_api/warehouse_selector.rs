use log::*;

use crate::{
    db_types::{Allocation, Sku, WarehouseStock},
    traits::StockError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Allow a line to be drawn from more than one warehouse when no single warehouse can cover it
    pub allow_split: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self { allow_split: true }
    }
}

/// Decides which warehouses an order line is drawn from.
///
/// Active warehouses are ranked by descending priority, ties broken by warehouse code. The highest ranked warehouse
/// that can cover the whole quantity wins. Otherwise, if the policy allows it, warehouses are drained in rank order
/// until the quantity is covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarehouseSelector {
    policy: SelectionPolicy,
}

impl WarehouseSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Plans the allocation of `quantity` units of `sku`. Nothing is reserved.
    pub fn select(&self, sku: &Sku, quantity: i64, levels: &[WarehouseStock]) -> Result<Vec<Allocation>, StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(format!("{quantity} x {sku}")));
        }
        let mut candidates =
            levels.iter().filter(|l| l.is_active && &l.sku == sku && l.available() > 0).collect::<Vec<_>>();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.warehouse.cmp(&b.warehouse)));
        let allocate = |stock: &WarehouseStock, quantity: i64| Allocation {
            warehouse: stock.warehouse.clone(),
            sku: sku.clone(),
            quantity,
        };
        if let Some(stock) = candidates.iter().find(|c| c.available() >= quantity) {
            trace!("🧭️ {quantity} x {sku} can be drawn from {}", stock.warehouse);
            return Ok(vec![allocate(*stock, quantity)]);
        }
        let total = candidates.iter().map(|c| c.available()).sum::<i64>();
        if !self.policy.allow_split || total < quantity {
            let available = if self.policy.allow_split {
                total
            } else {
                candidates.iter().map(|c| c.available()).max().unwrap_or_default()
            };
            debug!("🧭️ Cannot allocate {quantity} x {sku}. {available} available");
            return Err(StockError::InsufficientStock { sku: sku.clone(), requested: quantity, available });
        }
        let mut remaining = quantity;
        let mut plan = Vec::new();
        for stock in candidates {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(stock.available());
            plan.push(allocate(stock, take));
            remaining -= take;
        }
        debug!("🧭️ {quantity} x {sku} split across {} warehouses", plan.len());
        Ok(plan)
    }
}
