use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);

CREATE TABLE IF NOT EXISTS purchase_lines (
    id INTEGER PRIMARY KEY,
    sku TEXT NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    facility TEXT NOT NULL,
    contract_type TEXT NOT NULL,
    date TEXT NOT NULL,
    quantity REAL NOT NULL,
    amount REAL NOT NULL,
    uom_price REAL,
    uom_quantity REAL,
    each_price REAL,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (import_id) REFERENCES imports(id)
);

CREATE INDEX IF NOT EXISTS idx_lines_facility_date ON purchase_lines(facility, date);
CREATE INDEX IF NOT EXISTS idx_lines_item ON purchase_lines(sku, description, category);
";

/// Contract-type value a purchase line must carry to count toward reports.
/// Importers normalize whatever the source extract says to lowercase.
pub const ON_CONTRACT: &str = "on contract";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
