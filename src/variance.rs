use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;

use crate::db::ON_CONTRACT;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Inputs to the variance pipeline. Everything that shapes the result is
/// explicit here so a run can be repeated against the same purchase lines.
#[derive(Debug, Clone)]
pub struct VarianceParams {
    pub facility: String,
    /// Window start; the prior quarter is the calendar quarter containing it.
    pub start_date: NaiveDate,
    /// Window end; the current quarter is the calendar quarter containing it.
    pub end_date: NaiveDate,
    /// Assumed annual inflation rate, applied as a single multiplier.
    pub inflation_rate: f64,
}

// ---------------------------------------------------------------------------
// Item identity
// ---------------------------------------------------------------------------

/// Items match on the exact (sku, description, category) triple. An edited
/// description or category for the same SKU starts a separate history.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ItemKey {
    pub sku: String,
    pub description: String,
    pub category: String,
}

// ---------------------------------------------------------------------------
// Stage 1: monthly aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonthlyRecord {
    pub item: ItemKey,
    /// Calendar month, YYYY-MM.
    pub month: String,
    /// Unweighted mean of per-line unit prices for the month.
    pub avg_price: f64,
    pub spend: f64,
    pub quantity: f64,
}

/// One record per (item, month) for the facility's on-contract lines.
///
/// A line's unit price is uom_price / uom_quantity when the unit-of-measure
/// quantity is positive, else its flat each-price; the CASE keeps a zero or
/// missing denominator on the fallback path instead of erroring. Months with
/// no net quantity, or where no line yields a usable price, drop out here.
///
/// There is no lower date bound: months before the comparison window feed
/// the baseline resolver.
pub fn monthly_records(conn: &Connection, params: &VarianceParams) -> Result<Vec<MonthlyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sku, description, category, substr(date, 1, 7) AS month, \
         AVG(CASE WHEN uom_quantity > 0 THEN uom_price / uom_quantity ELSE each_price END) AS avg_price, \
         SUM(amount) AS spend, \
         SUM(quantity) AS qty \
         FROM purchase_lines \
         WHERE facility = ?1 AND contract_type = ?2 AND date <= ?3 \
         GROUP BY sku, description, category, month \
         HAVING SUM(quantity) > 0 \
         ORDER BY sku, description, category, month",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![
            params.facility,
            ON_CONTRACT,
            params.end_date.format("%Y-%m-%d").to_string(),
        ],
        |row| {
            Ok((
                ItemKey {
                    sku: row.get(0)?,
                    description: row.get(1)?,
                    category: row.get(2)?,
                },
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
            ))
        },
    )?;

    let mut records = Vec::new();
    for row in rows {
        let (item, month, avg_price, spend, quantity) = row?;
        let Some(avg_price) = avg_price else { continue };
        records.push(MonthlyRecord {
            item,
            month,
            avg_price,
            spend,
            quantity,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Stage 2: IQR outlier filter
// ---------------------------------------------------------------------------

/// Interpolated percentile over sorted values (linear between closest
/// ranks). Both quartiles go through this one estimator so the fences are
/// mutually consistent.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Tukey fence per item: keep a month when its average price lies within
/// [Q1 - 1.5*IQR, Q3 + 1.5*IQR]. When the IQR collapses to zero, keep
/// exactly the months priced at Q1 — an item with a single observed price
/// across all months must survive, not be discarded wholesale.
pub fn filter_outliers(records: Vec<MonthlyRecord>) -> Vec<MonthlyRecord> {
    let mut by_item: BTreeMap<ItemKey, Vec<f64>> = BTreeMap::new();
    for r in &records {
        by_item.entry(r.item.clone()).or_default().push(r.avg_price);
    }

    let mut fences: BTreeMap<ItemKey, (f64, f64)> = BTreeMap::new();
    for (item, mut prices) in by_item {
        prices.sort_by(|a, b| a.total_cmp(b));
        let q1 = percentile(&prices, 0.25);
        let q3 = percentile(&prices, 0.75);
        fences.insert(item, (q1, q3));
    }

    records
        .into_iter()
        .filter(|r| {
            let (q1, q3) = fences[&r.item];
            let iqr = q3 - q1;
            if iqr > 0.0 {
                r.avg_price >= q1 - 1.5 * iqr && r.avg_price <= q3 + 1.5 * iqr
            } else {
                r.avg_price == q1
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stage 3: quarterly aggregation
// ---------------------------------------------------------------------------

/// A calendar-quarter bucket, compared against months by YYYY-MM prefix.
#[derive(Debug, Clone)]
pub struct QuarterWindow {
    pub label: String,
    first_month: String,
    last_month: String,
}

impl QuarterWindow {
    pub fn containing(date: NaiveDate) -> Self {
        let quarter = (date.month() - 1) / 3 + 1;
        let first = (quarter - 1) * 3 + 1;
        let last = first + 2;
        QuarterWindow {
            label: format!("Q{} {}", quarter, date.year()),
            first_month: format!("{:04}-{:02}", date.year(), first),
            last_month: format!("{:04}-{:02}", date.year(), last),
        }
    }

    fn contains(&self, month: &str) -> bool {
        self.first_month.as_str() <= month && month <= self.last_month.as_str()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuarterTotals {
    /// Average of the monthly average prices, not spend-weighted.
    pub avg_price: f64,
    pub spend: f64,
    pub quantity: f64,
}

/// Re-aggregate filtered months into one bucket. Months outside the bucket
/// are ignored here; a month between the two quarters of interest ends up
/// in neither and is excluded from the comparison entirely.
pub fn quarterly_totals(
    records: &[MonthlyRecord],
    window: &QuarterWindow,
) -> BTreeMap<ItemKey, QuarterTotals> {
    struct Acc {
        price_sum: f64,
        months: u32,
        spend: f64,
        quantity: f64,
    }

    let mut acc: BTreeMap<ItemKey, Acc> = BTreeMap::new();
    for r in records {
        if !window.contains(&r.month) {
            continue;
        }
        let e = acc.entry(r.item.clone()).or_insert(Acc {
            price_sum: 0.0,
            months: 0,
            spend: 0.0,
            quantity: 0.0,
        });
        e.price_sum += r.avg_price;
        e.months += 1;
        e.spend += r.spend;
        e.quantity += r.quantity;
    }

    acc.into_iter()
        .map(|(item, a)| {
            (
                item,
                QuarterTotals {
                    avg_price: a.price_sum / a.months as f64,
                    spend: a.spend,
                    quantity: a.quantity,
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stage 4: baseline backfill
// ---------------------------------------------------------------------------

/// Per item, the average price of the latest filtered month strictly before
/// the window-start month. Months are unique per item by construction, so
/// the ordered scan picks deterministically.
pub fn baseline_prices(
    records: &[MonthlyRecord],
    start_date: NaiveDate,
) -> BTreeMap<ItemKey, f64> {
    let start_month = start_date.format("%Y-%m").to_string();
    let mut latest: BTreeMap<ItemKey, (String, f64)> = BTreeMap::new();
    for r in records {
        if r.month >= start_month {
            continue;
        }
        match latest.get(&r.item) {
            Some((kept, _)) if *kept >= r.month => {}
            _ => {
                latest.insert(r.item.clone(), (r.month.clone(), r.avg_price));
            }
        }
    }
    latest.into_iter().map(|(item, (_, price))| (item, price)).collect()
}

// ---------------------------------------------------------------------------
// Stage 5: comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub item: ItemKey,
    /// Prior-quarter average price, or the backfilled baseline when the
    /// item had no qualifying prior-quarter months.
    pub prior_price: Option<f64>,
    pub current_price: Option<f64>,
    pub prior_spend: Option<f64>,
    pub current_spend: Option<f64>,
    pub prior_quantity: Option<f64>,
    pub current_quantity: Option<f64>,
    pub pct_change_price: Option<f64>,
    pub pct_change_spend: Option<f64>,
    pub pct_change_quantity: Option<f64>,
    /// Prior price projected forward by the assumed inflation rate.
    pub adjusted_price: Option<f64>,
    /// Percent change of the current price against the projected price.
    pub real_pct_change_price: Option<f64>,
    pub baseline_backfilled: bool,
}

/// Percent change with a null-safe denominator: a missing or zero base
/// yields None rather than an error.
fn safe_pct_change(current: Option<f64>, base: Option<f64>) -> Option<f64> {
    match (current, base) {
        (Some(c), Some(b)) if b != 0.0 => Some((c - b) / b * 100.0),
        _ => None,
    }
}

/// Join the two quarters per item and compute nominal and real changes.
///
/// The price baseline falls back to the backfilled pre-window price, but
/// spend and quantity changes only ever use true prior-quarter totals —
/// with no prior bucket they stay None even when a price baseline exists.
/// The inflation projection is a single fixed multiplier; it does not
/// compound or look at how many days separate the two windows.
pub fn compare(
    prior: &BTreeMap<ItemKey, QuarterTotals>,
    current: &BTreeMap<ItemKey, QuarterTotals>,
    baselines: &BTreeMap<ItemKey, f64>,
    inflation_rate: f64,
) -> Vec<ComparisonRow> {
    let items: BTreeSet<&ItemKey> = prior.keys().chain(current.keys()).collect();

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let p = prior.get(item);
        let c = current.get(item);
        let backfill = baselines.get(item).copied();

        let baseline_backfilled = p.is_none() && backfill.is_some();
        let baseline_price = p.map(|t| t.avg_price).or(backfill);
        let current_price = c.map(|t| t.avg_price);
        let adjusted_price = baseline_price.map(|b| b * (1.0 + inflation_rate));

        rows.push(ComparisonRow {
            item: item.clone(),
            prior_price: baseline_price,
            current_price,
            prior_spend: p.map(|t| t.spend),
            current_spend: c.map(|t| t.spend),
            prior_quantity: p.map(|t| t.quantity),
            current_quantity: c.map(|t| t.quantity),
            pct_change_price: safe_pct_change(current_price, baseline_price),
            pct_change_spend: safe_pct_change(c.map(|t| t.spend), p.map(|t| t.spend)),
            pct_change_quantity: safe_pct_change(c.map(|t| t.quantity), p.map(|t| t.quantity)),
            adjusted_price,
            real_pct_change_price: safe_pct_change(current_price, adjusted_price),
            baseline_backfilled,
        });
    }

    // Ascending by real change; rows where it could not be computed sort
    // last, ties broken by item key so output order is stable.
    rows.sort_by(|a, b| match (a.real_pct_change_price, b.real_pct_change_price) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.item.cmp(&b.item)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.item.cmp(&b.item),
    });
    rows
}

// ---------------------------------------------------------------------------
// Pipeline entry point
// ---------------------------------------------------------------------------

pub struct VarianceReport {
    pub prior_quarter: QuarterWindow,
    pub current_quarter: QuarterWindow,
    pub inflation_rate: f64,
    pub rows: Vec<ComparisonRow>,
    /// Monthly records the outlier filter discarded.
    pub months_filtered: usize,
}

pub fn get_variance(conn: &Connection, params: &VarianceParams) -> Result<VarianceReport> {
    let prior_quarter = QuarterWindow::containing(params.start_date);
    let current_quarter = QuarterWindow::containing(params.end_date);

    let monthly = monthly_records(conn, params)?;
    let before = monthly.len();
    let filtered = filter_outliers(monthly);
    let months_filtered = before - filtered.len();

    let prior = quarterly_totals(&filtered, &prior_quarter);
    let current = quarterly_totals(&filtered, &current_quarter);
    let baselines = baseline_prices(&filtered, params.start_date);
    let rows = compare(&prior, &current, &baselines, params.inflation_rate);

    Ok(VarianceReport {
        prior_quarter,
        current_quarter,
        inflation_rate: params.inflation_rate,
        rows,
        months_filtered,
    })
}
