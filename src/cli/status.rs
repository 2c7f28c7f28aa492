use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("quartermaster.db");

    println!(
        "Facility:   {}",
        if settings.facility_name.is_empty() {
            "(not set)"
        } else {
            &settings.facility_name
        }
    );
    println!("Inflation:  {:.1}%", settings.inflation_rate * 100.0);
    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;

        let lines: i64 = conn.query_row("SELECT count(*) FROM purchase_lines", [], |r| r.get(0))?;
        let facilities: i64 = conn.query_row(
            "SELECT count(DISTINCT facility) FROM purchase_lines",
            [],
            |r| r.get(0),
        )?;
        let skus: i64 = conn.query_row(
            "SELECT count(DISTINCT sku) FROM purchase_lines",
            [],
            |r| r.get(0),
        )?;
        let imports: i64 = conn.query_row("SELECT count(*) FROM imports", [], |r| r.get(0))?;
        let range: (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(date), MAX(date) FROM purchase_lines",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        println!();
        println!("Purchase lines:  {lines}");
        println!("Facilities:      {facilities}");
        println!("SKUs:            {skus}");
        println!("Imports:         {imports}");
        if let (Some(min), Some(max)) = range {
            println!("Date range:      {min} to {max}");
        }
    } else {
        println!();
        println!("Database not found. Run `quartermaster init` to set up.");
    }

    Ok(())
}
