#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct PurchaseLine {
    pub id: Option<i64>,
    pub sku: String,
    pub description: String,
    pub category: String,
    pub facility: String,
    pub contract_type: String,
    pub date: String,
    pub quantity: f64,
    pub amount: f64,
    pub uom_price: Option<f64>,
    pub uom_quantity: Option<f64>,
    pub each_price: Option<f64>,
    pub import_id: Option<i64>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub id: Option<i64>,
    pub filename: String,
    pub record_count: Option<i64>,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
    pub checksum: Option<String>,
}

/// Intermediate representation from a CSV parser before DB insert.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub sku: String,
    pub description: String,
    pub category: String,
    pub facility: String,
    pub contract_type: String,
    pub date: String,
    pub quantity: f64,
    pub amount: f64,
    pub uom_price: Option<f64>,
    pub uom_quantity: Option<f64>,
    pub each_price: Option<f64>,
}
