use rusqlite::Connection;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Filter helper
// ---------------------------------------------------------------------------

fn date_filter(
    year: Option<i32>,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<(String, Vec<String>)> {
    match (from_date, to_date) {
        (Some(from), Some(to)) => {
            return Ok((
                "date BETWEEN ? AND ?".to_string(),
                vec![from.to_string(), to.to_string()],
            ));
        }
        (Some(_), None) => {
            return Err(crate::error::QmError::Other(
                "--from requires --to (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(crate::error::QmError::Other(
                "--to requires --from (both date boundaries must be specified)".to_string(),
            ));
        }
        (None, None) => {}
    }
    if let Some(y) = year {
        return Ok(("date LIKE ?".to_string(), vec![format!("{y}%")]));
    }
    Ok(("1=1".to_string(), Vec::new()))
}

fn to_params(params: &[String]) -> Vec<&dyn rusqlite::types::ToSql> {
    params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect()
}

// ---------------------------------------------------------------------------
// Purchase-line register
// ---------------------------------------------------------------------------

pub struct RegisterRow {
    pub date: String,
    pub sku: String,
    pub description: String,
    pub category: String,
    pub facility: String,
    pub contract_type: String,
    pub quantity: f64,
    pub amount: f64,
}

pub struct RegisterReport {
    pub rows: Vec<RegisterRow>,
    pub total_spend: f64,
    pub count: usize,
}

pub fn get_register(
    conn: &Connection,
    facility: Option<&str>,
    from_date: Option<&str>,
    to_date: Option<&str>,
    sku: Option<&str>,
) -> Result<RegisterReport> {
    let (clause, mut params) = date_filter(None, from_date, to_date)?;

    let mut extra = String::new();
    if let Some(f) = facility {
        params.push(f.to_string());
        extra.push_str(" AND facility = ?");
    }
    if let Some(s) = sku {
        params.push(s.to_string());
        extra.push_str(" AND sku = ?");
    }

    let sql = format!(
        "SELECT date, sku, description, category, facility, contract_type, quantity, amount \
         FROM purchase_lines WHERE {clause}{extra} \
         ORDER BY date, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<RegisterRow> = stmt
        .query_map(to_params(&params).as_slice(), |row| {
            Ok(RegisterRow {
                date: row.get(0)?,
                sku: row.get(1)?,
                description: row.get(2)?,
                category: row.get(3)?,
                facility: row.get(4)?,
                contract_type: row.get(5)?,
                quantity: row.get(6)?,
                amount: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let total_spend: f64 = rows.iter().map(|r| r.amount).sum();
    let count = rows.len();
    Ok(RegisterReport {
        rows,
        total_spend,
        count,
    })
}

// ---------------------------------------------------------------------------
// Spend by category
// ---------------------------------------------------------------------------

pub struct CategoryItem {
    pub name: String,
    pub total: f64,
    pub count: i64,
    pub pct: f64,
}

pub struct SkuItem {
    pub sku: String,
    pub description: String,
    pub total: f64,
    pub count: i64,
}

pub struct CategoryBreakdown {
    pub categories: Vec<CategoryItem>,
    pub total: f64,
    pub top_skus: Vec<SkuItem>,
}

pub fn get_category_breakdown(
    conn: &Connection,
    facility: Option<&str>,
    year: Option<i32>,
) -> Result<CategoryBreakdown> {
    let (clause, mut params) = date_filter(year, None, None)?;
    let mut extra = String::new();
    if let Some(f) = facility {
        params.push(f.to_string());
        extra.push_str(" AND facility = ?");
    }

    let sql = format!(
        "SELECT category, SUM(amount) as total, COUNT(*) as count \
         FROM purchase_lines WHERE {clause}{extra} \
         GROUP BY category ORDER BY total DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw: Vec<(String, f64, i64)> = stmt
        .query_map(to_params(&params).as_slice(), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let total: f64 = raw.iter().map(|(_, t, _)| t).sum();
    let categories = raw
        .iter()
        .map(|(name, t, c)| CategoryItem {
            name: name.clone(),
            total: *t,
            count: *c,
            pct: if total != 0.0 { t / total * 100.0 } else { 0.0 },
        })
        .collect();

    let sku_sql = format!(
        "SELECT sku, description, SUM(amount) as total, COUNT(*) as count \
         FROM purchase_lines WHERE {clause}{extra} \
         GROUP BY sku, description ORDER BY total DESC LIMIT 10"
    );
    let mut sstmt = conn.prepare(&sku_sql)?;
    let top_skus: Vec<SkuItem> = sstmt
        .query_map(to_params(&params).as_slice(), |row| {
            Ok(SkuItem {
                sku: row.get(0)?,
                description: row.get(1)?,
                total: row.get(2)?,
                count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CategoryBreakdown {
        categories,
        total,
        top_skus,
    })
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

    fn seed_lines(conn: &Connection) {
        let rows = [
            ("GLV-1", "EXAM GLOVE", "Gloves", "Mercy General", "2024-07-15", 10.0, 120.0),
            ("GLV-1", "EXAM GLOVE", "Gloves", "Mercy General", "2024-08-15", 10.0, 122.0),
            ("SYR-1", "SYRINGE 10ML", "Syringes", "Mercy General", "2024-08-20", 50.0, 25.0),
            ("SYR-1", "SYRINGE 10ML", "Syringes", "St. Anne", "2024-08-21", 50.0, 27.0),
        ];
        for (sku, desc, cat, fac, date, qty, amount) in rows {
            conn.execute(
                "INSERT INTO purchase_lines \
                 (sku, description, category, facility, contract_type, date, quantity, amount, each_price) \
                 VALUES (?1, ?2, ?3, ?4, 'on contract', ?5, ?6, ?7, ?8)",
                rusqlite::params![sku, desc, cat, fac, date, qty, amount, amount / qty],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_register_returns_all_lines() {
        let (_dir, conn) = test_db();
        seed_lines(&conn);
        let report = get_register(&conn, None, None, None, None).unwrap();
        assert_eq!(report.count, 4);
        assert_eq!(report.total_spend, 294.0);
    }

    #[test]
    fn test_register_facility_filter() {
        let (_dir, conn) = test_db();
        seed_lines(&conn);
        let report = get_register(&conn, Some("Mercy General"), None, None, None).unwrap();
        assert_eq!(report.count, 3);
        let report = get_register(&conn, Some("Nonexistent"), None, None, None).unwrap();
        assert_eq!(report.count, 0);
    }

    #[test]
    fn test_register_date_and_sku_filters() {
        let (_dir, conn) = test_db();
        seed_lines(&conn);
        let report = get_register(
            &conn,
            None,
            Some("2024-08-01"),
            Some("2024-08-31"),
            Some("SYR-1"),
        )
        .unwrap();
        assert_eq!(report.count, 2);
    }

    #[test]
    fn test_register_rejects_from_without_to() {
        let (_dir, conn) = test_db();
        let result = get_register(&conn, None, Some("2024-07-01"), None, None);
        assert!(result.is_err());
        let msg = result.err().unwrap().to_string();
        assert!(msg.contains("--from requires --to"), "got: {msg}");
    }

    #[test]
    fn test_register_rejects_to_without_from() {
        let (_dir, conn) = test_db();
        let result = get_register(&conn, None, None, Some("2024-12-31"), None);
        assert!(result.is_err());
        let msg = result.err().unwrap().to_string();
        assert!(msg.contains("--to requires --from"), "got: {msg}");
    }

    #[test]
    fn test_category_breakdown() {
        let (_dir, conn) = test_db();
        seed_lines(&conn);
        let breakdown = get_category_breakdown(&conn, Some("Mercy General"), Some(2024)).unwrap();
        assert_eq!(breakdown.categories.len(), 2);
        assert_eq!(breakdown.categories[0].name, "Gloves");
        assert_eq!(breakdown.categories[0].count, 2);
        assert_eq!(breakdown.total, 267.0);
        let pct_sum: f64 = breakdown.categories.iter().map(|c| c.pct).sum();
        assert!((pct_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_breakdown_top_skus() {
        let (_dir, conn) = test_db();
        seed_lines(&conn);
        let breakdown = get_category_breakdown(&conn, None, None).unwrap();
        assert_eq!(breakdown.top_skus.len(), 2);
        assert_eq!(breakdown.top_skus[0].sku, "GLV-1");
        assert_eq!(breakdown.top_skus[0].total, 242.0);
    }
}
