use std::path::PathBuf;

use rusqlite::Connection;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::load_settings;

const FACILITY: &str = "Mercy General Hospital";
const OTHER_FACILITY: &str = "St. Anne Medical Center";

/// Sample catalog. Prices drift linearly per month so every pipeline
/// branch has something to chew on: increases above and below inflation,
/// a flat-priced item, and a deliberate data-entry outlier.
struct DemoItem {
    sku: &'static str,
    description: &'static str,
    category: &'static str,
    /// Starting per-each price at the first demo month.
    each_price: f64,
    /// Fractional price change per month index.
    monthly_drift: f64,
    /// Case pack size; 0 means the item is priced per each.
    uom_quantity: f64,
    cases_per_month: f64,
}

const ITEMS: &[DemoItem] = &[
    DemoItem {
        sku: "GLV-2210",
        description: "EXAM GLOVE NITRILE MED",
        category: "Gloves",
        each_price: 0.12,
        monthly_drift: 0.009,
        uom_quantity: 200.0,
        cases_per_month: 40.0,
    },
    DemoItem {
        sku: "SYR-1010",
        description: "SYRINGE 10ML LUER LOCK",
        category: "Syringes & Needles",
        each_price: 0.50,
        monthly_drift: 0.001,
        uom_quantity: 100.0,
        cases_per_month: 25.0,
    },
    DemoItem {
        sku: "IVC-0420",
        description: "IV CATHETER 20G",
        category: "IV Therapy",
        each_price: 2.50,
        monthly_drift: -0.003,
        uom_quantity: 50.0,
        cases_per_month: 12.0,
    },
    DemoItem {
        sku: "MSK-3301",
        description: "SURGICAL MASK LEVEL 3",
        category: "PPE",
        each_price: 0.45,
        monthly_drift: 0.0,
        uom_quantity: 0.0,
        cases_per_month: 0.0,
    },
    DemoItem {
        sku: "WND-4040",
        description: "WOUND DRESSING 4X4",
        category: "Wound Care",
        each_price: 5.00,
        monthly_drift: 0.002,
        uom_quantity: 0.0,
        cases_per_month: 0.0,
    },
];

/// The syringe price keyed in with a shifted decimal point. The IQR
/// filter is expected to throw this month out.
const OUTLIER_MONTH: (i32, u32) = (2025, 2);
const OUTLIER_SKU: &str = "SYR-1010";

/// Demo months: January 2024 through September 2025.
fn demo_months() -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    for m in 1..=12u32 {
        months.push((2024, m));
    }
    for m in 1..=9u32 {
        months.push((2025, m));
    }
    months
}

fn round_cents(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

struct DemoLine {
    sku: &'static str,
    description: &'static str,
    category: &'static str,
    facility: &'static str,
    contract_type: &'static str,
    date: String,
    quantity: f64,
    amount: f64,
    uom_price: Option<f64>,
    uom_quantity: Option<f64>,
    each_price: Option<f64>,
}

fn generate_lines() -> Vec<DemoLine> {
    let mut lines = Vec::new();

    for (idx, (year, month)) in demo_months().into_iter().enumerate() {
        for item in ITEMS {
            // The wound dressing goes quiet between July 2024 and June
            // 2025 so its comparison baseline must be backfilled.
            if item.sku == "WND-4040" && (2024, 7) <= (year, month) && (year, month) < (2025, 7) {
                continue;
            }

            let mut price = round_cents(item.each_price * (1.0 + item.monthly_drift * idx as f64));
            if item.sku == OUTLIER_SKU && (year, month) == OUTLIER_MONTH {
                price = round_cents(price * 10.0);
            }

            let date = format!("{year:04}-{month:02}-08");
            if item.uom_quantity > 0.0 {
                let uom_price = round_cents(price * item.uom_quantity);
                lines.push(DemoLine {
                    sku: item.sku,
                    description: item.description,
                    category: item.category,
                    facility: FACILITY,
                    contract_type: "on contract",
                    date,
                    quantity: item.uom_quantity * item.cases_per_month,
                    amount: round_cents(uom_price * item.cases_per_month),
                    uom_price: Some(uom_price),
                    uom_quantity: Some(item.uom_quantity),
                    each_price: None,
                });
            } else {
                let quantity = 300.0;
                lines.push(DemoLine {
                    sku: item.sku,
                    description: item.description,
                    category: item.category,
                    facility: FACILITY,
                    contract_type: "on contract",
                    date,
                    quantity,
                    amount: round_cents(price * quantity),
                    uom_price: None,
                    uom_quantity: None,
                    each_price: Some(price),
                });
            }
        }

        // A recurring off-contract spot buy; reports must ignore it.
        lines.push(DemoLine {
            sku: "GLV-2210",
            description: "EXAM GLOVE NITRILE MED",
            category: "Gloves",
            facility: FACILITY,
            contract_type: "off contract",
            date: format!("{year:04}-{month:02}-21"),
            quantity: 400.0,
            amount: 96.0,
            uom_price: None,
            uom_quantity: None,
            each_price: Some(0.24),
        });

        // Sister facility volume, present so facility filtering matters.
        lines.push(DemoLine {
            sku: "GLV-2210",
            description: "EXAM GLOVE NITRILE MED",
            category: "Gloves",
            facility: OTHER_FACILITY,
            contract_type: "on contract",
            date: format!("{year:04}-{month:02}-11"),
            quantity: 2000.0,
            amount: 270.0,
            uom_price: Some(27.0),
            uom_quantity: Some(200.0),
            each_price: None,
        });
    }

    lines
}

fn insert_demo_data(conn: &Connection) -> Result<usize> {
    let lines = generate_lines();
    for line in &lines {
        conn.execute(
            "INSERT INTO purchase_lines \
             (sku, description, category, facility, contract_type, date, quantity, amount, \
              uom_price, uom_quantity, each_price) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                line.sku,
                line.description,
                line.category,
                line.facility,
                line.contract_type,
                line.date,
                line.quantity,
                line.amount,
                line.uom_price,
                line.uom_quantity,
                line.each_price,
            ],
        )?;
    }
    Ok(lines.len())
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = PathBuf::from(&settings.data_dir).join("quartermaster.db");

    if !db_path.exists() {
        eprintln!("No database found. Run `quartermaster init` first.");
        std::process::exit(1);
    }

    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    // Idempotency guard
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM purchase_lines WHERE facility = ?1)",
        [FACILITY],
        |r| r.get(0),
    )?;
    if exists {
        println!("Demo data already loaded (facility '{}' has lines).", FACILITY);
        return Ok(());
    }

    let line_count = insert_demo_data(&conn)?;

    println!("Demo data loaded!");
    println!("  Facility:       {FACILITY}");
    println!("  Purchase lines: {line_count}");
    println!();
    println!("Try these next:");
    println!("  quartermaster report variance --facility \"{FACILITY}\" --from 2024-07-01 --to 2025-09-30");
    println!("  quartermaster report categories --facility \"{FACILITY}\"");
    println!("  quartermaster report register --facility \"{FACILITY}\" --from 2025-07-01 --to 2025-09-30");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::variance::{get_variance, VarianceParams};
    use chrono::NaiveDate;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn demo_params() -> VarianceParams {
        VarianceParams {
            facility: FACILITY.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
            inflation_rate: 0.03,
        }
    }

    #[test]
    fn test_generate_lines_deterministic() {
        let a = generate_lines();
        let b = generate_lines();
        assert_eq!(a.len(), b.len());
        assert!(a.iter().zip(&b).all(|(x, y)| x.date == y.date && x.amount == y.amount));
    }

    #[test]
    fn test_generate_lines_dates_are_valid() {
        for line in generate_lines() {
            assert!(
                NaiveDate::parse_from_str(&line.date, "%Y-%m-%d").is_ok(),
                "invalid date: {}",
                line.date
            );
        }
    }

    #[test]
    fn test_demo_covers_both_facilities_and_contract_states() {
        let lines = generate_lines();
        assert!(lines.iter().any(|l| l.facility == OTHER_FACILITY));
        assert!(lines.iter().any(|l| l.contract_type == "off contract"));
        assert!(lines.iter().any(|l| l.uom_price.is_some()));
        assert!(lines.iter().any(|l| l.each_price.is_some()));
    }

    #[test]
    fn test_demo_variance_report_shape() {
        let (_dir, conn) = test_db();
        insert_demo_data(&conn).unwrap();
        let report = get_variance(&conn, &demo_params()).unwrap();

        // All five catalog items appear in one quarter or the other.
        assert_eq!(report.rows.len(), 5);
        // The syringe outlier month was discarded.
        assert!(report.months_filtered >= 1);

        let wound = report
            .rows
            .iter()
            .find(|r| r.item.sku == "WND-4040")
            .unwrap();
        assert!(wound.baseline_backfilled);
        assert_eq!(wound.pct_change_spend, None);

        // The flat-priced mask survives the degenerate-IQR branch.
        let mask = report
            .rows
            .iter()
            .find(|r| r.item.sku == "MSK-3301")
            .unwrap();
        assert!((mask.prior_price.unwrap() - 0.45).abs() < 1e-9);
        assert!((mask.current_price.unwrap() - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_demo_idempotency_guard() {
        let (_dir, conn) = test_db();
        insert_demo_data(&conn).unwrap();
        let before: i64 = conn
            .query_row("SELECT count(*) FROM purchase_lines", [], |r| r.get(0))
            .unwrap();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM purchase_lines WHERE facility = ?1)",
                [FACILITY],
                |r| r.get(0),
            )
            .unwrap();
        assert!(exists);
        if !exists {
            insert_demo_data(&conn).unwrap();
        }

        let after: i64 = conn
            .query_row("SELECT count(*) FROM purchase_lines", [], |r| r.get(0))
            .unwrap();
        assert_eq!(before, after);
    }
}
