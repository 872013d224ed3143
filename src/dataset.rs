//! Dataset context bound into every sandbox script
//!
//! Resolves the dataset file a session analyzes and produces the loader
//! statement that binds it to `df` inside the sandbox preamble.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name the dataset is bound to inside executed snippets
pub const DATASET_BINDING: &str = "df";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported dataset format: {0} (expected csv, tsv, json, parquet, xlsx or xls)")]
    UnsupportedFormat(PathBuf),
}

/// File formats the preamble knows how to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Tsv,
    Json,
    Parquet,
    Excel,
}

impl DatasetFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "parquet" => Some(Self::Parquet),
            "xlsx" | "xls" => Some(Self::Excel),
            _ => None,
        }
    }
}

/// A read-only tabular dataset shared by every execution in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetContext {
    path: PathBuf,
    format: DatasetFormat,
}

impl DatasetContext {
    /// Resolve `name` against `data_dir`.
    ///
    /// A bare file name is looked up inside the data directory; anything with
    /// a directory component (or an absolute path) is used as given.
    pub fn resolve(data_dir: &Path, name: &str) -> Result<Self, DatasetError> {
        let candidate = Path::new(name);
        let path = if candidate.is_absolute() || candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            data_dir.join(candidate)
        };
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let path = path.into();
        let format =
            DatasetFormat::from_path(&path).ok_or_else(|| DatasetError::UnsupportedFormat(path.clone()))?;
        if !path.is_file() {
            return Err(DatasetError::NotFound(path));
        }
        // Scripts run from the sandbox working directory, so pin the path
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DatasetFormat {
        self.format
    }

    /// File name for display (falls back to the full path)
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Python statement binding the dataset to [`DATASET_BINDING`]
    pub fn load_statement(&self) -> String {
        let literal = python_string_literal(&self.path.to_string_lossy());
        let call = match self.format {
            DatasetFormat::Csv => format!("pd.read_csv({literal})"),
            DatasetFormat::Tsv => format!("pd.read_csv({literal}, sep=\"\\t\")"),
            DatasetFormat::Json => format!("pd.read_json({literal})"),
            DatasetFormat::Parquet => format!("pd.read_parquet({literal})"),
            DatasetFormat::Excel => format!("pd.read_excel({literal})"),
        };
        format!("{DATASET_BINDING} = {call}")
    }
}

/// Quote `s` as a Python string literal.
///
/// JSON string escapes (`\"`, `\\`, `\n`, `\uXXXX`) are all valid Python
/// escapes, so the JSON encoding doubles as a Python literal.
pub fn python_string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        path
    }

    #[test]
    fn test_resolve_bare_name_in_data_dir() {
        let dir = TempDir::new().unwrap();
        write(&dir, "campaigns.csv");
        let ctx = DatasetContext::resolve(dir.path(), "campaigns.csv").unwrap();
        assert!(ctx.path().ends_with("campaigns.csv"));
        assert!(ctx.path().is_absolute());
        assert_eq!(ctx.format(), DatasetFormat::Csv);
        assert_eq!(ctx.display_name(), "campaigns.csv");
    }

    #[test]
    fn test_resolve_explicit_path_ignores_data_dir() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "sales.tsv");
        let ctx = DatasetContext::resolve(Path::new("/nonexistent"), path.to_str().unwrap()).unwrap();
        assert_eq!(ctx.format(), DatasetFormat::Tsv);
        assert!(ctx.load_statement().contains("sep=\"\\t\""));
    }

    #[test]
    fn test_missing_and_unsupported() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DatasetContext::resolve(dir.path(), "missing.csv"),
            Err(DatasetError::NotFound(_))
        ));
        write(&dir, "notes.txt");
        assert!(matches!(
            DatasetContext::resolve(dir.path(), "notes.txt"),
            Err(DatasetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_statement_escapes_path() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "quote\"d.csv");
        let ctx = DatasetContext::open(path).unwrap();
        let stmt = ctx.load_statement();
        assert!(stmt.starts_with("df = pd.read_csv(\""));
        assert!(stmt.contains("quote\\\"d.csv"));
    }

    #[test]
    fn test_python_string_literal() {
        assert_eq!(python_string_literal("a\\b"), r#""a\\b""#);
        assert_eq!(python_string_literal("line\nbreak"), r#""line\nbreak""#);
    }
}
