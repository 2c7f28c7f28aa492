use std::path::Path;

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::{QmError, Result};
use crate::models::ParsedLine;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> f64 {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return -inner.trim().parse::<f64>().unwrap_or(0.0);
    }
    s.parse().unwrap_or(0.0)
}

/// Optional money/number field: blank or unparseable means absent, so the
/// aggregation's price-fallback rule decides what to do, not the importer.
pub fn parse_optional_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

pub fn parse_date_mdy(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

pub fn parse_date_iso(raw: &str) -> Option<String> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok()
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn is_duplicate_line(conn: &Connection, line: &ParsedLine) -> bool {
    let mut stmt = conn
        .prepare_cached(
            "SELECT 1 FROM purchase_lines \
             WHERE sku = ?1 AND date = ?2 AND amount = ?3 AND description = ?4 AND facility = ?5",
        )
        .unwrap();
    stmt.exists(rusqlite::params![
        line.sku,
        line.date,
        line.amount,
        line.description,
        line.facility
    ])
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Importer kinds — enum dispatch instead of trait objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImporterKind {
    /// Canonical purchase-line export: ISO dates, one header row.
    GenericExtract,
    /// Infor Lawson PO-line extract: M/D/Y dates, dollar-formatted
    /// amounts, report preamble before the header row.
    LawsonPoLines,
}

impl ImporterKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::GenericExtract => "generic",
            Self::LawsonPoLines => "lawson",
        }
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenericExtract => "Generic purchase-line CSV",
            Self::LawsonPoLines => "Infor Lawson PO-line extract",
        }
    }

    pub fn detect(&self, file_path: &Path) -> bool {
        match self {
            Self::GenericExtract => detect_generic(file_path),
            Self::LawsonPoLines => detect_lawson(file_path),
        }
    }

    pub fn parse(&self, file_path: &Path) -> Result<Vec<ParsedLine>> {
        match self {
            Self::GenericExtract => parse_generic(file_path),
            Self::LawsonPoLines => parse_lawson(file_path),
        }
    }
}

const ALL_IMPORTERS: &[ImporterKind] = &[ImporterKind::GenericExtract, ImporterKind::LawsonPoLines];

pub fn get_by_key(key: &str) -> Option<ImporterKind> {
    ALL_IMPORTERS.iter().find(|i| i.key() == key).copied()
}

pub fn get_for_file(file_path: &Path) -> Option<ImporterKind> {
    ALL_IMPORTERS.iter().find(|i| i.detect(file_path)).copied()
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    format_key: Option<&str>,
) -> Result<ImportResult> {
    let checksum = compute_checksum(file_path)?;
    {
        let mut stmt = conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1")?;
        if stmt.exists([&checksum])? {
            return Ok(ImportResult {
                imported: 0,
                skipped: 0,
                duplicate_file: true,
            });
        }
    }

    let importer = if let Some(key) = format_key {
        get_by_key(key).ok_or_else(|| QmError::UnknownFormat(key.to_string()))?
    } else {
        get_for_file(file_path).ok_or_else(|| {
            QmError::Other(format!(
                "Could not detect the format of {}; pass --format",
                file_path.display()
            ))
        })?
    };

    let parsed_lines = importer.parse(file_path)?;

    let dates: Vec<&str> = parsed_lines.iter().map(|l| l.date.as_str()).collect();
    let min_date = dates.iter().min().copied();
    let max_date = dates.iter().max().copied();
    conn.execute(
        "INSERT INTO imports (filename, record_count, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            file_path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            parsed_lines.len() as i64,
            min_date,
            max_date,
            checksum,
        ],
    )?;
    let import_id = conn.last_insert_rowid();

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for line in &parsed_lines {
        if is_duplicate_line(conn, line) {
            skipped += 1;
            continue;
        }
        conn.execute(
            "INSERT INTO purchase_lines \
             (sku, description, category, facility, contract_type, date, quantity, amount, \
              uom_price, uom_quantity, each_price, import_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
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
                import_id,
            ],
        )?;
        imported += 1;
    }

    Ok(ImportResult {
        imported,
        skipped,
        duplicate_file: false,
    })
}

// ---------------------------------------------------------------------------
// Generic extract parser
// ---------------------------------------------------------------------------

fn detect_generic(file_path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(file_path) else {
        return false;
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    if let Some(Ok(record)) = rdr.records().next() {
        return record.iter().any(|f| f.trim() == "SKU")
            && record.iter().any(|f| f.trim() == "Contract Type");
    }
    false
}

fn parse_generic(file_path: &Path) -> Result<Vec<ParsedLine>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut lines = Vec::new();
    let mut cols: Option<GenericCols> = None;

    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if cols.is_none() {
            cols = GenericCols::from_header(&record);
            continue;
        }
        let Some(c) = cols.as_ref() else { continue };
        if record.len() <= c.max_index() {
            continue;
        }
        let Some(date) = parse_date_iso(&record[c.date]) else {
            continue;
        };
        let sku = record[c.sku].trim().to_string();
        if sku.is_empty() {
            continue;
        }
        lines.push(ParsedLine {
            sku,
            description: record[c.description].trim().to_string(),
            category: record[c.category].trim().to_string(),
            facility: record[c.facility].trim().to_string(),
            contract_type: record[c.contract_type].trim().to_lowercase(),
            date,
            quantity: parse_amount(&record[c.quantity]),
            amount: parse_amount(&record[c.amount]),
            uom_price: parse_optional_amount(&record[c.uom_price]),
            uom_quantity: parse_optional_amount(&record[c.uom_quantity]),
            each_price: parse_optional_amount(&record[c.each_price]),
        });
    }
    Ok(lines)
}

struct GenericCols {
    sku: usize,
    description: usize,
    category: usize,
    facility: usize,
    contract_type: usize,
    date: usize,
    quantity: usize,
    amount: usize,
    uom_price: usize,
    uom_quantity: usize,
    each_price: usize,
}

impl GenericCols {
    fn from_header(record: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| {
            record
                .iter()
                .position(|f| f.trim().eq_ignore_ascii_case(name))
        };
        Some(GenericCols {
            sku: find("SKU")?,
            description: find("Description")?,
            category: find("Category")?,
            facility: find("Facility")?,
            contract_type: find("Contract Type")?,
            date: find("Date")?,
            quantity: find("Quantity")?,
            amount: find("Amount")?,
            uom_price: find("UOM Price")?,
            uom_quantity: find("UOM Quantity")?,
            each_price: find("Each Price")?,
        })
    }

    fn max_index(&self) -> usize {
        [
            self.sku,
            self.description,
            self.category,
            self.facility,
            self.contract_type,
            self.date,
            self.quantity,
            self.amount,
            self.uom_price,
            self.uom_quantity,
            self.each_price,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Lawson PO-line parser
// ---------------------------------------------------------------------------

fn detect_lawson(file_path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(file_path) else {
        return false;
    };
    content.contains("Item Number") && content.contains("PO Date")
}

fn parse_lawson(file_path: &Path) -> Result<Vec<ParsedLine>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut lines = Vec::new();
    let mut found_header = false;
    let (mut idx_sku, mut idx_desc, mut idx_cat, mut idx_loc) = (0, 1, 2, 3);
    let (mut idx_contract, mut idx_date, mut idx_qty, mut idx_ext) = (4, 5, 6, 7);
    let (mut idx_uom_cost, mut idx_uom_factor, mut idx_unit) = (8, 9, 10);

    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if !found_header {
            if record.iter().any(|f| f.trim() == "Item Number") {
                for (i, field) in record.iter().enumerate() {
                    match field.trim() {
                        "Item Number" => idx_sku = i,
                        "Item Description" => idx_desc = i,
                        "Category" => idx_cat = i,
                        "Location" => idx_loc = i,
                        "Contract" => idx_contract = i,
                        "PO Date" => idx_date = i,
                        "Quantity" => idx_qty = i,
                        "Extended Cost" => idx_ext = i,
                        "UOM Cost" => idx_uom_cost = i,
                        "UOM Factor" => idx_uom_factor = i,
                        "Unit Cost" => idx_unit = i,
                        _ => {}
                    }
                }
                found_header = true;
            }
            continue;
        }
        let min_cols = [
            idx_sku, idx_desc, idx_cat, idx_loc, idx_contract, idx_date, idx_qty, idx_ext,
            idx_uom_cost, idx_uom_factor, idx_unit,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1;
        if record.len() < min_cols || record[idx_sku].trim().is_empty() {
            continue;
        }
        let Some(date) = parse_date_mdy(&record[idx_date]) else {
            continue;
        };
        // Lawson flags contract lines with Y/N.
        let contract_type = if record[idx_contract].trim().eq_ignore_ascii_case("Y") {
            "on contract".to_string()
        } else {
            "off contract".to_string()
        };
        lines.push(ParsedLine {
            sku: record[idx_sku].trim().to_string(),
            description: record[idx_desc].trim().to_string(),
            category: record[idx_cat].trim().to_string(),
            facility: record[idx_loc].trim().to_string(),
            contract_type,
            date,
            quantity: parse_amount(&record[idx_qty]),
            amount: parse_amount(&record[idx_ext]),
            uom_price: parse_optional_amount(&record[idx_uom_cost]),
            uom_quantity: parse_optional_amount(&record[idx_uom_factor]),
            each_price: parse_optional_amount(&record[idx_unit]),
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    const GENERIC_HEADER: &str =
        "SKU,Description,Category,Facility,Contract Type,Date,Quantity,Amount,UOM Price,UOM Quantity,Each Price\n";

    fn write_generic_csv(dir: &Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut content = String::from(GENERIC_HEADER);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(&path, &content).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), 1234.56);
        assert_eq!(parse_amount("$500.00"), 500.0);
        assert_eq!(parse_amount("(42.50)"), -42.5);
        assert_eq!(parse_amount("not_a_number"), 0.0);
    }

    #[test]
    fn test_parse_optional_amount() {
        assert_eq!(parse_optional_amount("12.34"), Some(12.34));
        assert_eq!(parse_optional_amount("$1,200.00"), Some(1200.0));
        assert_eq!(parse_optional_amount(""), None);
        assert_eq!(parse_optional_amount("  "), None);
        assert_eq!(parse_optional_amount("n/a"), None);
    }

    #[test]
    fn test_parse_date_mdy() {
        assert_eq!(parse_date_mdy("7/15/2024"), Some("2024-07-15".to_string()));
        assert_eq!(parse_date_mdy("02/30/2025"), None);
        assert_eq!(parse_date_mdy("2024-07-15"), None);
    }

    #[test]
    fn test_parse_date_iso() {
        assert_eq!(parse_date_iso("2024-07-15"), Some("2024-07-15".to_string()));
        assert_eq!(parse_date_iso("7/15/2024"), None);
        assert_eq!(parse_date_iso("2024-13-01"), None);
    }

    #[test]
    fn test_generic_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &[
                "GLV-2210,EXAM GLOVE NITRILE MED,Gloves,Mercy General Hospital,On Contract,2024-07-15,10,120.00,120.00,10,",
                "SYR-1010,SYRINGE 10ML,Syringes,Mercy General Hospital,On Contract,2024-07-16,50,25.00,,,0.50",
            ],
        );
        let lines = ImporterKind::GenericExtract.parse(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sku, "GLV-2210");
        assert_eq!(lines[0].contract_type, "on contract");
        assert_eq!(lines[0].uom_price, Some(120.0));
        assert_eq!(lines[0].uom_quantity, Some(10.0));
        assert_eq!(lines[0].each_price, None);
        assert_eq!(lines[1].uom_price, None);
        assert_eq!(lines[1].each_price, Some(0.5));
    }

    #[test]
    fn test_generic_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &[
                ",MISSING SKU,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00",
                "GLV-1,BAD DATE,Gloves,Mercy,On Contract,07/15/2024,10,120.00,,,12.00",
                "GLV-2,GOOD,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00",
            ],
        );
        let lines = ImporterKind::GenericExtract.parse(&path).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].sku, "GLV-2");
    }

    #[test]
    fn test_generic_detect() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_generic_csv(dir.path(), "extract.csv", &[]);
        assert!(ImporterKind::GenericExtract.detect(&path));
        assert!(!ImporterKind::LawsonPoLines.detect(&path));
    }

    #[test]
    fn test_lawson_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lawson.csv");
        let content = "\
Run Date: 10/01/2025,,,,,,,,,,
Requested By: MMIS,,,,,,,,,,
Item Number,Item Description,Category,Location,Contract,PO Date,Quantity,Extended Cost,UOM Cost,UOM Factor,Unit Cost
IVC-0420,IV CATHETER 20G,IV Therapy,Mercy General Hospital,Y,7/15/2024,5,\"$1,250.00\",$250.00,50,
MSK-3301,SURGICAL MASK LEVEL 3,PPE,Mercy General Hospital,N,7/16/2024,20,$180.00,,,$0.45
";
        std::fs::write(&path, content).unwrap();
        assert!(ImporterKind::LawsonPoLines.detect(&path));
        let lines = ImporterKind::LawsonPoLines.parse(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sku, "IVC-0420");
        assert_eq!(lines[0].contract_type, "on contract");
        assert_eq!(lines[0].date, "2024-07-15");
        assert_eq!(lines[0].amount, 1250.0);
        assert_eq!(lines[0].uom_price, Some(250.0));
        assert_eq!(lines[0].uom_quantity, Some(50.0));
        assert_eq!(lines[1].contract_type, "off contract");
        assert_eq!(lines[1].each_price, Some(0.45));
    }

    #[test]
    fn test_import_file_inserts_lines() {
        let (dir, conn) = test_db();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &[
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00",
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-08-15,10,122.00,,,12.20",
            ],
        );
        let result = import_file(&conn, &path, Some("generic")).unwrap();
        assert_eq!(result.imported, 2);
        assert!(!result.duplicate_file);
        let count: i64 = conn
            .query_row("SELECT count(*) FROM purchase_lines", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_import_file_detects_format() {
        let (dir, conn) = test_db();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &["GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00"],
        );
        let result = import_file(&conn, &path, None).unwrap();
        assert_eq!(result.imported, 1);
    }

    #[test]
    fn test_import_file_rejects_unknown_format() {
        let (dir, conn) = test_db();
        let path = write_generic_csv(dir.path(), "extract.csv", &[]);
        let result = import_file(&conn, &path, Some("sap"));
        assert!(matches!(result, Err(QmError::UnknownFormat(_))));
    }

    #[test]
    fn test_import_file_detects_file_duplicate() {
        let (dir, conn) = test_db();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &["GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00"],
        );
        let r1 = import_file(&conn, &path, Some("generic")).unwrap();
        assert_eq!(r1.imported, 1);
        let r2 = import_file(&conn, &path, Some("generic")).unwrap();
        assert!(r2.duplicate_file);
        assert_eq!(r2.imported, 0);
    }

    #[test]
    fn test_import_file_detects_row_duplicates() {
        let (dir, conn) = test_db();
        let first = write_generic_csv(
            dir.path(),
            "july.csv",
            &[
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00",
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-20,10,121.00,,,12.10",
            ],
        );
        import_file(&conn, &first, Some("generic")).unwrap();
        let second = write_generic_csv(
            dir.path(),
            "july-august.csv",
            &[
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-20,10,121.00,,,12.10",
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-08-15,10,122.00,,,12.20",
            ],
        );
        let r2 = import_file(&conn, &second, Some("generic")).unwrap();
        assert_eq!(r2.imported, 1);
        assert_eq!(r2.skipped, 1);
    }

    #[test]
    fn test_import_file_records_batch() {
        let (dir, conn) = test_db();
        let path = write_generic_csv(
            dir.path(),
            "extract.csv",
            &[
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-07-15,10,120.00,,,12.00",
                "GLV-1,GLOVE,Gloves,Mercy,On Contract,2024-09-15,10,122.00,,,12.20",
            ],
        );
        import_file(&conn, &path, Some("generic")).unwrap();
        let (count, start, end): (i64, String, String) = conn
            .query_row(
                "SELECT record_count, date_range_start, date_range_end FROM imports LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(start, "2024-07-15");
        assert_eq!(end, "2024-09-15");
    }
}
