//! CLI subcommand implementations

pub mod health;
pub mod metrics;
pub mod predict;
pub mod session;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Read a JSON object from a file
pub fn read_object(path: &Path) -> Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

/// Read cycle records from a file holding an array or `{ "cycles": [...] }`
pub fn read_cycles(path: &Path) -> Result<Vec<Value>> {
    match read_json(path)? {
        Value::Array(cycles) => Ok(cycles),
        Value::Object(mut map) => match map.remove("cycles") {
            Some(Value::Array(cycles)) => Ok(cycles),
            _ => bail!("{} has no \"cycles\" array", path.display()),
        },
        _ => bail!("{} must contain a JSON array of cycles", path.display()),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_cycles_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let bare = write(&dir, "bare.json", r#"[{"startDate":"2024-01-01"}]"#);
        let wrapped = write(&dir, "wrapped.json", r#"{"cycles":[{"startDate":"2024-01-01"},{}]}"#);

        assert_eq!(read_cycles(&bare).unwrap().len(), 1);
        assert_eq!(read_cycles(&wrapped).unwrap().len(), 2);
    }

    #[test]
    fn test_read_object_rejects_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "profile.json", "[1, 2]");
        assert!(read_object(&path).is_err());
        assert!(read_object(&dir.path().join("missing.json")).is_err());
    }
}
