mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod reports;
mod settings;
mod variance;

use clap::{CommandFactory, Parser};

use cli::{Cli, Commands, ExportCommands, ReportCommands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, format } => cli::import::run(&file, format.as_deref()),
        Commands::Report { command } => match command {
            ReportCommands::Variance {
                from_date,
                to_date,
                facility,
                inflation,
            } => cli::report::variance(facility, &from_date, &to_date, inflation),
            ReportCommands::Register {
                facility,
                from_date,
                to_date,
                sku,
            } => cli::report::register(facility, from_date, to_date, sku),
            ReportCommands::Categories { facility, year } => {
                cli::report::categories(facility, year)
            }
        },
        Commands::Export { command } => match command {
            ExportCommands::Variance {
                from_date,
                to_date,
                facility,
                inflation,
                output,
            } => cli::export::variance(facility, &from_date, &to_date, inflation, output),
        },
        Commands::Demo => cli::demo::run(),
        Commands::Status => cli::status::run(),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "quartermaster",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
