//! Quota selection: largest-remainder apportionment of N output slots over
//! categories, ranking within a category, shortfall redistribution.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{Category, NewsItem};

/// Guards `floor` against products like 8.999999999 that mean 9.
const FLOOR_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Share {
    category: Category,
    target: usize,
    remainder: f64,
}

/// Shares ordered by fractional remainder desc, ties by category order.
fn apportion(total: usize, quotas: &BTreeMap<Category, f64>) -> Vec<Share> {
    let positive: Vec<(Category, f64)> = quotas
        .iter()
        .filter(|(_, f)| f.is_finite() && **f > 0.0)
        .map(|(c, f)| (*c, *f))
        .collect();
    let sum: f64 = positive.iter().map(|(_, f)| f).sum();
    if positive.is_empty() || sum <= 0.0 {
        return Vec::new();
    }

    let mut shares: Vec<Share> = positive
        .into_iter()
        .map(|(category, f)| {
            let raw = total as f64 * f / sum;
            let floor = (raw + FLOOR_EPSILON).floor();
            Share {
                category,
                target: floor as usize,
                remainder: (raw - floor).max(0.0),
            }
        })
        .collect();
    shares.sort_by(|a, b| {
        b.remainder
            .total_cmp(&a.remainder)
            .then_with(|| a.category.cmp(&b.category))
    });

    let assigned = shares
        .iter()
        .map(|s| s.target)
        .fold(0usize, usize::saturating_add);
    let mut left = total.saturating_sub(assigned);
    for s in shares.iter_mut() {
        if left == 0 {
            break;
        }
        s.target += 1;
        left -= 1;
    }
    shares
}

/// Integer slot count per category; sums to `total` whenever at least one
/// quota is positive.
pub fn allocate_targets(total: usize, quotas: &BTreeMap<Category, f64>) -> BTreeMap<Category, usize> {
    apportion(total, quotas)
        .into_iter()
        .map(|s| (s.category, s.target))
        .collect()
}

/// Output order: total score desc, then newer first, then insertion order.
pub fn rank_cmp(a: &NewsItem, b: &NewsItem) -> Ordering {
    b.total_score()
        .total_cmp(&a.total_score())
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.seq.cmp(&b.seq))
}

/// Pick up to `total` items honouring the quotas. Categories that cannot fill
/// their target hand the slots to categories with surplus candidates, in
/// remainder order. Returns fewer than `total` only when candidates run out.
pub fn select_by_quota(
    items: Vec<NewsItem>,
    total: usize,
    quotas: &BTreeMap<Category, f64>,
) -> Vec<NewsItem> {
    // Every candidate fits once total reaches the pool size.
    let total = total.min(items.len());
    let shares = apportion(total, quotas);

    let mut pools: BTreeMap<Category, Vec<NewsItem>> = BTreeMap::new();
    for item in items {
        let category = item.effective_category().unwrap_or(Category::Politics);
        pools.entry(category).or_default().push(item);
    }
    for pool in pools.values_mut() {
        pool.sort_by(rank_cmp);
    }

    let available = |c: Category| pools.get(&c).map_or(0, Vec::len);
    let mut take: Vec<(Category, usize)> = shares
        .iter()
        .map(|s| (s.category, s.target.min(available(s.category))))
        .collect();

    let mut shortfall: usize = shares
        .iter()
        .zip(&take)
        .map(|(s, (_, t))| s.target - t)
        .sum();
    for (category, t) in take.iter_mut() {
        if shortfall == 0 {
            break;
        }
        let extra = shortfall.min(available(*category) - *t);
        *t += extra;
        shortfall -= extra;
    }

    let mut selected = Vec::with_capacity(total);
    for (category, n) in take {
        if let Some(pool) = pools.remove(&category) {
            selected.extend(pool.into_iter().take(n));
        }
    }
    selected.sort_by(rank_cmp);
    selected
}
