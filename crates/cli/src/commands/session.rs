//! Commands that fill a session's form sections

use anyhow::Result;
use clap::ValueEnum;
use std::path::Path;

use crate::client::ApiClient;
use crate::commands::{read_cycles, read_object};
use crate::output::{print_json, print_success, OutputFormat};

/// Form section accepted by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    CycleData,
    UserData,
    SymptomsData,
}

impl Section {
    /// Endpoint path segment
    pub fn path(&self) -> &'static str {
        match self {
            Section::CycleData => "cycle-data",
            Section::UserData => "user-data",
            Section::SymptomsData => "symptoms-data",
        }
    }
}

/// Upload one form section from a JSON file
pub async fn submit_section(
    client: &ApiClient,
    session_id: &str,
    section: Section,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let data = read_object(file)?;
    let fields = data.len();
    let response = client.save_section(section.path(), session_id, data).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "{} ({} fields, session {})",
            response.message, fields, response.session_id
        )),
    }
    Ok(())
}

/// Upload cycle records from a JSON file
pub async fn submit_cycles(
    client: &ApiClient,
    session_id: &str,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let cycles = read_cycles(file)?;
    let count = cycles.len();
    let response = client.save_cycles(session_id, cycles).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "Saved {} cycles to session {}",
            count, response.session_id
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_paths() {
        assert_eq!(Section::CycleData.path(), "cycle-data");
        assert_eq!(Section::SymptomsData.path(), "symptoms-data");
        assert_eq!(Section::from_str("user-data", true).unwrap(), Section::UserData);
    }
}
