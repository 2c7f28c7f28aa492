pub mod demo;
pub mod export;
pub mod import;
pub mod init;
pub mod report;
pub mod status;

use clap::{Parser, Subcommand};

use crate::error::{QmError, Result};
use crate::settings::load_settings;
use crate::variance::VarianceParams;

pub(crate) fn parse_date(raw: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| QmError::InvalidDate(raw.to_string()))
}

/// Resolve variance-report arguments against settings defaults.
pub(crate) fn resolve_variance_params(
    facility: Option<String>,
    from_date: &str,
    to_date: &str,
    inflation: Option<f64>,
) -> Result<VarianceParams> {
    let settings = load_settings();
    let facility = match facility {
        Some(f) => f,
        None if !settings.facility_name.is_empty() => settings.facility_name.clone(),
        None => {
            return Err(QmError::Other(
                "No facility given; pass --facility or set facility_name in settings".to_string(),
            ))
        }
    };
    let start_date = parse_date(from_date)?;
    let end_date = parse_date(to_date)?;
    if end_date < start_date {
        return Err(QmError::Other(
            "--to must not be earlier than --from".to_string(),
        ));
    }
    Ok(VarianceParams {
        facility,
        start_date,
        end_date,
        inflation_rate: inflation.unwrap_or(settings.inflation_rate),
    })
}

#[derive(Parser)]
#[command(
    name = "quartermaster",
    about = "Quarter-over-quarter procurement price variance for healthcare supply chains."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up quartermaster: choose a data directory and initialize the database.
    Init {
        /// Path for quartermaster data (default: ~/Documents/quartermaster)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a purchase-line CSV extract.
    Import {
        /// Path to the CSV file to import
        file: String,
        /// Importer format key (generic, lawson); auto-detected when omitted
        #[arg(long)]
        format: Option<String>,
    },
    /// Generate reports.
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Export reports to CSV.
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Load a sample facility's purchase history to explore quartermaster.
    Demo,
    /// Show current database and summary statistics.
    Status,
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Quarter-over-quarter price variance, adjusted for assumed inflation.
    Variance {
        /// Window start: YYYY-MM-DD; the prior quarter is the calendar
        /// quarter containing this date
        #[arg(long = "from")]
        from_date: String,
        /// Window end: YYYY-MM-DD; the current quarter is the calendar
        /// quarter containing this date
        #[arg(long = "to")]
        to_date: String,
        /// Facility name (default: facility_name from settings)
        #[arg(long)]
        facility: Option<String>,
        /// Assumed annual inflation rate, e.g. 0.03 (default: settings)
        #[arg(long)]
        inflation: Option<f64>,
    },
    /// Purchase-line register for a date period.
    Register {
        /// Filter by facility name
        #[arg(long)]
        facility: Option<String>,
        /// Start date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Filter by SKU
        #[arg(long)]
        sku: Option<String>,
    },
    /// Spend by category, with the top SKUs by spend.
    Categories {
        /// Filter by facility name
        #[arg(long)]
        facility: Option<String>,
        /// Year filter: YYYY
        #[arg(long)]
        year: Option<i32>,
    },
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Export the variance report to CSV.
    Variance {
        #[arg(long = "from")]
        from_date: String,
        #[arg(long = "to")]
        to_date: String,
        #[arg(long)]
        facility: Option<String>,
        #[arg(long)]
        inflation: Option<f64>,
        /// Output file path (default: <data_dir>/exports/variance-<date>.csv)
        #[arg(long)]
        output: Option<String>,
    },
}
