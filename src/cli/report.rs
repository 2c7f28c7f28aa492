use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::resolve_variance_params;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::{money, opt_money, pct, qty};
use crate::reports;
use crate::settings::get_data_dir;
use crate::variance;

pub fn variance(
    facility: Option<String>,
    from_date: &str,
    to_date: &str,
    inflation: Option<f64>,
) -> Result<()> {
    let params = resolve_variance_params(facility, from_date, to_date, inflation)?;
    let conn = get_connection(&get_data_dir().join("quartermaster.db"))?;
    let report = variance::get_variance(&conn, &params)?;

    let mut table = Table::new();
    table.set_header(vec![
        "SKU".to_string(),
        "Description".to_string(),
        "Category".to_string(),
        format!("{} Price", report.prior_quarter.label),
        format!("{} Price", report.current_quarter.label),
        "Price Δ".to_string(),
        "Real Δ".to_string(),
        "Spend Δ".to_string(),
        "Qty Δ".to_string(),
    ]);

    let mut backfilled = 0usize;
    for row in &report.rows {
        let sku = if row.baseline_backfilled {
            backfilled += 1;
            format!("{}*", row.item.sku)
        } else {
            row.item.sku.clone()
        };
        let real = match row.real_pct_change_price {
            Some(v) if v > 0.0 => pct(row.real_pct_change_price).red().to_string(),
            Some(_) => pct(row.real_pct_change_price).green().to_string(),
            None => pct(None),
        };
        table.add_row(vec![
            Cell::new(sku),
            Cell::new(&row.item.description),
            Cell::new(&row.item.category),
            Cell::new(opt_money(row.prior_price)),
            Cell::new(opt_money(row.current_price)),
            Cell::new(pct(row.pct_change_price)),
            Cell::new(real),
            Cell::new(pct(row.pct_change_spend)),
            Cell::new(pct(row.pct_change_quantity)),
        ]);
    }

    println!(
        "Price Variance \u{2014} {} \u{2014} {} vs {} (inflation {:.1}%)",
        params.facility,
        report.current_quarter.label,
        report.prior_quarter.label,
        report.inflation_rate * 100.0
    );
    println!("{table}");
    if backfilled > 0 {
        println!("* baseline backfilled from the last price before {from_date}");
    }
    if report.months_filtered > 0 {
        println!(
            "{} outlier month(s) excluded by the IQR filter",
            report.months_filtered
        );
    }
    Ok(())
}

pub fn register(
    facility: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    sku: Option<String>,
) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("quartermaster.db"))?;
    let report = reports::get_register(
        &conn,
        facility.as_deref(),
        from_date.as_deref(),
        to_date.as_deref(),
        sku.as_deref(),
    )?;

    let mut table = Table::new();
    table.set_header(vec![
        "Date", "SKU", "Description", "Category", "Facility", "Contract", "Qty", "Amount",
    ]);
    for row in &report.rows {
        table.add_row(vec![
            Cell::new(&row.date),
            Cell::new(&row.sku),
            Cell::new(&row.description),
            Cell::new(&row.category),
            Cell::new(&row.facility),
            Cell::new(&row.contract_type),
            Cell::new(qty(row.quantity)),
            Cell::new(money(row.amount)),
        ]);
    }
    println!("Purchase Register\n{table}");
    println!(
        "{} line(s), total spend {}",
        report.count,
        money(report.total_spend)
    );
    Ok(())
}

pub fn categories(facility: Option<String>, year: Option<i32>) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("quartermaster.db"))?;
    let data = reports::get_category_breakdown(&conn, facility.as_deref(), year)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Spend", "%", "Lines"]);
    for item in &data.categories {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(money(item.total)),
            Cell::new(format!("{:.1}%", item.pct)),
            Cell::new(item.count),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(money(data.total)),
        Cell::new(""),
        Cell::new(""),
    ]);
    println!("Spend by Category\n{table}");

    if !data.top_skus.is_empty() {
        let mut stable = Table::new();
        stable.set_header(vec!["SKU", "Description", "Spend", "Lines"]);
        for s in &data.top_skus {
            stable.add_row(vec![
                Cell::new(&s.sku),
                Cell::new(&s.description),
                Cell::new(money(s.total)),
                Cell::new(s.count),
            ]);
        }
        println!("\nTop SKUs\n{stable}");
    }
    Ok(())
}
