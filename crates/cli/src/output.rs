//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn parse_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Pretty-print any response as JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a 0-1 probability as percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.0}%", probability * 100.0)
}

/// Format a 0-100 score
pub fn format_score(score: f64) -> String {
    format!("{:.1}", score)
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "loaded" | "ok" => status.green().to_string(),
        "degraded" | "warning" => status.yellow().to_string(),
        "unhealthy" | "unavailable" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a risk level
pub fn color_risk(level: &str) -> String {
    match level {
        "Low" => level.green().to_string(),
        "Medium" => level.yellow().to_string(),
        "High" => level.red().to_string(),
        _ => level.dimmed().to_string(),
    }
}

/// Color a wellness index; higher is worse
pub fn color_prwi(score: f64) -> String {
    let formatted = format_score(score);
    if score <= 30.0 {
        formatted.green().to_string()
    } else if score <= 60.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a cycle health score; higher is better
pub fn color_health_score(score: u8) -> String {
    let formatted = score.to_string();
    if score >= 80 {
        formatted.green().to_string()
    } else if score >= 50 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
