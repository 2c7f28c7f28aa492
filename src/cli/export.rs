use std::path::PathBuf;

use crate::cli::resolve_variance_params;
use crate::db::get_connection;
use crate::error::Result;
use crate::settings::get_data_dir;
use crate::variance;

fn default_path(name: &str) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    get_data_dir()
        .join("exports")
        .join(format!("{name}-{date}.csv"))
}

fn opt_field(val: Option<f64>) -> String {
    val.map(|v| format!("{v:.6}")).unwrap_or_default()
}

pub fn variance(
    facility: Option<String>,
    from_date: &str,
    to_date: &str,
    inflation: Option<f64>,
    output: Option<String>,
) -> Result<()> {
    let params = resolve_variance_params(facility, from_date, to_date, inflation)?;
    let conn = get_connection(&get_data_dir().join("quartermaster.db"))?;
    let report = variance::get_variance(&conn, &params)?;

    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_path("variance"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record([
        "sku",
        "description",
        "category",
        "prior_avg_price",
        "current_avg_price",
        "prior_spend",
        "current_spend",
        "prior_quantity",
        "current_quantity",
        "pct_change_price",
        "pct_change_spend",
        "pct_change_quantity",
        "inflation_adjusted_price",
        "real_pct_change_price",
        "baseline_backfilled",
    ])?;
    for row in &report.rows {
        wtr.write_record([
            row.item.sku.clone(),
            row.item.description.clone(),
            row.item.category.clone(),
            opt_field(row.prior_price),
            opt_field(row.current_price),
            opt_field(row.prior_spend),
            opt_field(row.current_spend),
            opt_field(row.prior_quantity),
            opt_field(row.current_quantity),
            opt_field(row.pct_change_price),
            opt_field(row.pct_change_spend),
            opt_field(row.pct_change_quantity),
            opt_field(row.adjusted_price),
            opt_field(row.real_pct_change_price),
            row.baseline_backfilled.to_string(),
        ])?;
    }
    wtr.flush()?;

    println!("Wrote {}", path.display());
    Ok(())
}
