//! Product variant stock

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::OutOfStockItem;

/// One requested deduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct VariantStock {
    pub id: Uuid,
    pub stock: i32,
}

/// Merges duplicate variants and orders lines by variant id, which is also the
/// lock acquisition order. Quantities below one count as one.
pub fn normalize_lines(lines: &[StockLine]) -> Vec<StockLine> {
    let mut want: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        *want.entry(line.variant_id).or_insert(0) += line.quantity.max(1);
    }
    want.into_iter().map(|(variant_id, quantity)| StockLine { variant_id, quantity }).collect()
}

/// Every line the locked stock cannot cover. Unknown variants count as zero stock.
pub fn shortfalls(want: &[StockLine], available: &[VariantStock]) -> Vec<OutOfStockItem> {
    want.iter()
        .filter_map(|line| {
            let have = available.iter().find(|v| v.id == line.variant_id).map_or(0, |v| v.stock);
            (have < line.quantity).then_some(OutOfStockItem {
                variant_id: line.variant_id,
                requested: line.quantity,
                available: have,
            })
        })
        .collect()
}
