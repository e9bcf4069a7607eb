//! Output formatting for the CLI

use anyhow::Result;
use console::{style, Style};
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;
use tabled::{settings::Style as TableStyle, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn is_structured(&self) -> bool {
        !matches!(self, OutputFormat::Table)
    }
}

/// Print rows as a table.
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", style("No results found").dim());
    } else {
        println!("{}", Table::new(rows).with(TableStyle::rounded()));
    }
}

/// Print a whole report as JSON or YAML.
pub fn print_structured<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(data)?),
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(data)?)
        }
    }
    Ok(())
}

pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn warning(msg: impl Display) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn print_kv(key: &str, value: impl Display) {
    let key_style = Style::new().cyan().bold();
    println!("{}: {}", key_style.apply_to(key), value);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", style(title).bold().underlined());
    println!();
}

/// Human readable duration with second precision.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else if seconds == 0 && duration.subsec_millis() > 0 {
        format!("{}ms", duration.subsec_millis())
    } else {
        format!("{}s", secs)
    }
}

/// Phase name colored by outcome.
pub fn phase_indicator(phase: &str) -> String {
    match phase {
        "Completed" => style(phase).green().to_string(),
        "Holding" | "Injecting" | "CleaningUp" => style(phase).yellow().to_string(),
        "Failed" | "StuckOnRemoval" => style(phase).red().to_string(),
        _ => phase.to_string(),
    }
}
