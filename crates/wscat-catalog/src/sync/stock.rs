//! Groups stock signals by the catalog product they resolve to.
//!
//! Several member SKUs of one variant family can each carry a signal. They
//! must land as a single write per product, or the stored price would depend
//! on which concurrent update finished last.

use std::collections::BTreeMap;

use wscat_core::{MergedProduct, StockSignal};

/// One write per resolved product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWrite {
    /// Signal addressed to the product id.
    pub signal: StockSignal,
    /// Feed signals folded into this write.
    pub signals: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StockPlan {
    pub writes: Vec<StockWrite>,
    /// Signals carrying neither price nor stock.
    pub inert: usize,
    /// Signals whose SKU no catalog product claims.
    pub unknown: usize,
}

/// Resolves each signal to a product (by id first, then by member SKU) and
/// folds the signals for one product together.
///
/// The price comes from the signal for the product id itself, then from
/// members in family order. A product is in stock if any member signal says
/// so.
#[must_use]
pub fn plan_stock_writes(catalog: &[MergedProduct], signals: Vec<StockSignal>) -> StockPlan {
    let mut plan = StockPlan::default();
    let mut grouped: BTreeMap<String, Vec<(usize, StockSignal)>> = BTreeMap::new();

    for signal in signals {
        if signal.price.is_none() && signal.in_stock.is_none() {
            plan.inert += 1;
            continue;
        }
        let Some((product, rank)) = resolve(catalog, &signal.sku) else {
            tracing::debug!(sku = %signal.sku, "stock signal for unknown sku");
            plan.unknown += 1;
            continue;
        };
        grouped
            .entry(product.id.clone())
            .or_default()
            .push((rank, signal));
    }

    for (id, mut members) in grouped {
        members.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.sku.cmp(&b.sku)));
        let price = members.iter().find_map(|(_, s)| s.price);
        let stock: Vec<bool> = members.iter().filter_map(|(_, s)| s.in_stock).collect();
        let in_stock = if stock.is_empty() {
            None
        } else {
            Some(stock.contains(&true))
        };
        if members.len() > 1 {
            tracing::debug!(
                id = %id,
                signals = members.len(),
                "stock signals folded into one product write"
            );
        }
        plan.writes.push(StockWrite {
            signals: members.len(),
            signal: StockSignal {
                sku: id,
                price,
                in_stock,
            },
        });
    }

    plan
}

/// The product claiming `sku` and the signal's precedence within it.
fn resolve<'a>(catalog: &'a [MergedProduct], sku: &str) -> Option<(&'a MergedProduct, usize)> {
    if let Some(product) = catalog.iter().find(|p| p.id == sku) {
        return Some((product, 0));
    }
    catalog.iter().find_map(|p| {
        p.member_skus
            .iter()
            .position(|m| m == sku)
            .map(|i| (p, i + 1))
    })
}
