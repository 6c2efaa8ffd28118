use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use libinfo_core::LibraryInfo;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// List the sections and exported symbols of ELF, PE and Mach-O binaries
#[derive(Parser)]
#[command(
    name = "libinfo",
    about = "Inspect sections and exported symbols of ELF, PE and Mach-O libraries",
    version,
    author
)]
struct Cli {
    /// Path to binary file
    #[arg(required = true)]
    path: PathBuf,

    /// Reject binaries this host could not load
    #[arg(long)]
    native: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the detected format and counts
    Info,
    /// List all sections
    Sections,
    /// List exported symbols
    Symbols {
        /// Only symbols defined in this section
        #[arg(long, short)]
        section: Option<String>,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    path: &'a Path,
    format: String,
    bits: u32,
    sections: usize,
    symbols: usize,
}

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Section")]
    name: String,
}

#[derive(Tabled)]
struct SymbolRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Symbol")]
    name: String,
}

fn banner(path: &Path, info: &LibraryInfo) {
    let format = info.format();
    println!(
        "{} {} ({}-bit)",
        path.display().to_string().bold(),
        format.to_string().cyan(),
        format.bits()
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut info = LibraryInfo::open(&cli.path, cli.native)
        .with_context(|| format!("failed to open {}", cli.path.display()))?;

    match cli.command {
        Command::Info => {
            let summary = Summary {
                path: &cli.path,
                format: info.format().to_string(),
                bits: info.format().bits(),
                sections: info.sections().context("failed to read sections")?.len(),
                symbols: info.symbols().context("failed to read symbols")?.len(),
            };
            if cli.json {
                print_json(&summary)?;
            } else {
                banner(&cli.path, &info);
                println!("  {:<10} {}", "Sections:".green(), summary.sections);
                println!("  {:<10} {}", "Symbols:".green(), summary.symbols);
            }
        }

        Command::Sections => {
            let sections = info.sections().context("failed to read sections")?;
            if cli.json {
                print_json(&sections)?;
            } else if sections.is_empty() {
                banner(&cli.path, &info);
                println!("No sections found.");
            } else {
                banner(&cli.path, &info);
                let rows = sections
                    .into_iter()
                    .enumerate()
                    .map(|(index, name)| SectionRow { index, name });
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        Command::Symbols { section } => {
            let symbols = match &section {
                Some(name) => info
                    .section_symbols(name)
                    .with_context(|| format!("failed to read symbols of {name}"))?,
                None => info.symbols().context("failed to read symbols")?,
            };
            if cli.json {
                print_json(&symbols)?;
            } else if symbols.is_empty() {
                banner(&cli.path, &info);
                println!("No exported symbols found (possibly stripped binary).");
            } else {
                banner(&cli.path, &info);
                let rows = symbols
                    .into_iter()
                    .enumerate()
                    .map(|(index, name)| SymbolRow { index, name });
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
    }

    Ok(())
}
