use crate::error::{LoomError, Result};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting manifests and artifacts.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// Write a file only if its current content differs. Returns true if written.
pub fn write_if_changed(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() && std::fs::read(path)? == data {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Structured reads
// ---------------------------------------------------------------------------

/// Read and deserialize a YAML file. A missing file is reported with `hint`
/// as the suggested fix; parse failures carry the line number.
pub fn read_yaml<T: DeserializeOwned>(path: &Path, kind: &str, hint: &str) -> Result<T> {
    let data = read_required(path, kind, hint)?;
    parse_yaml(path, &data)
}

pub fn parse_yaml<T: DeserializeOwned>(path: &Path, data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| LoomError::MalformedYaml {
        path: path.to_path_buf(),
        line: e.location().map(|l| l.line()),
        message: e.to_string(),
    })
}

/// Read a JSON file into an untyped value so callers can inspect fields
/// before committing to a schema.
pub fn read_json_value(path: &Path, kind: &str, hint: &str) -> Result<serde_json::Value> {
    let data = read_required(path, kind, hint)?;
    parse_json(path, &data)
}

pub fn parse_json(path: &Path, data: &str) -> Result<serde_json::Value> {
    serde_json::from_str(data).map_err(|e| json_error(path, e))
}

pub(crate) fn json_error(path: &Path, e: serde_json::Error) -> LoomError {
    LoomError::MalformedJson {
        path: path.to_path_buf(),
        line: Some(e.line()).filter(|l| *l > 0),
        message: e.to_string(),
    }
}

fn read_required(path: &Path, kind: &str, hint: &str) -> Result<String> {
    if !path.exists() {
        return Err(LoomError::MissingFile {
            kind: kind.to_string(),
            path: path.to_path_buf(),
            hint: hint.to_string(),
        });
    }
    tracing::debug!(path = %path.display(), kind, "loading file");
    Ok(std::fs::read_to_string(path)?)
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(sha256_hex(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/plan.json");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn write_if_missing_skips_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, b"original").unwrap();
        let written = write_if_missing(&path, b"new").unwrap();
        assert!(!written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn write_if_changed_only_on_difference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.md");
        assert!(write_if_changed(&path, b"one").unwrap());
        assert!(!write_if_changed(&path, b"one").unwrap());
        assert!(write_if_changed(&path, b"two").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }

    #[derive(Debug, Deserialize)]
    struct Meta {
        #[allow(dead_code)]
        id: String,
        #[allow(dead_code)]
        phase: u32,
    }

    #[test]
    fn read_yaml_missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks/01_intro.yaml");
        let err = read_yaml::<Meta>(&path, "task metadata", "create it").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tasks/01_intro.yaml"), "{msg}");
        assert!(msg.contains("create it"));
    }

    #[test]
    fn read_yaml_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.yaml");
        std::fs::write(&path, "id: intro\nphase: [unclosed\n").unwrap();
        match read_yaml::<Meta>(&path, "task metadata", "") {
            Err(LoomError::MalformedYaml { line, .. }) => assert!(line.is_some()),
            other => panic!("expected MalformedYaml, got {other:?}"),
        }
    }

    #[test]
    fn parse_json_reports_line_number() {
        let err = parse_json(Path::new("m.json"), "{\n  \"phase\": \n}").unwrap_err();
        match err {
            LoomError::MalformedJson { line, .. } => assert_eq!(line, Some(3)),
            other => panic!("expected MalformedJson, got {other:?}"),
        }
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
