//! Line-oriented store files
//!
//! One entity per line, whitespace-separated fields. Files are written to a
//! temporary sibling first and renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Store persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't load {kind} from line {line} of {path}: '{content}'")]
    Parse {
        kind: &'static str,
        path: PathBuf,
        line: usize,
        content: String,
    },
}

/// Result type for store persistence
pub type StoreResult<T> = Result<T, StoreError>;

/// One parsed line of a store file
#[derive(Debug)]
pub(crate) struct Record<'a> {
    kind: &'static str,
    path: &'a Path,
    line: usize,
    content: String,
}

impl<'a> Record<'a> {
    fn fields(&self) -> impl Iterator<Item = &str> {
        self.content.split_whitespace()
    }

    fn error(&self) -> StoreError {
        StoreError::Parse {
            kind: self.kind,
            path: self.path.to_path_buf(),
            line: self.line,
            content: self.content.clone(),
        }
    }

    /// The first field
    pub(crate) fn name(&self) -> &str {
        self.fields().next().unwrap_or_default()
    }

    /// Parse the field at `index`
    pub(crate) fn field<T: FromStr>(&self, index: usize) -> StoreResult<T> {
        self.fields()
            .nth(index)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| self.error())
    }

    /// Parse a `0`/`1` flag field
    pub(crate) fn flag(&self, index: usize) -> StoreResult<bool> {
        Ok(self.field::<i64>(index)? != 0)
    }
}

/// Read a store file; a missing file is an empty store
///
/// Every line must have exactly `field_count` fields.
pub(crate) fn read_records<'a>(
    path: &'a Path,
    kind: &'static str,
    field_count: usize,
) -> StoreResult<Vec<Record<'a>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Store file not found: {:?}", path);
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let record = Record {
            kind,
            path,
            line: index + 1,
            content: line.to_string(),
        };
        if record.fields().count() != field_count {
            return Err(record.error());
        }
        records.push(record);
    }

    debug!("Loaded {} {} record(s) from {:?}", records.len(), kind, path);
    Ok(records)
}

/// Write a store file atomically
pub(crate) fn write_records(path: &Path, lines: impl IntoIterator<Item = String>) -> StoreResult<()> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut content = String::new();
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, content).map_err(io_error)?;
    fs::rename(&temp_path, path).map_err(io_error)?;

    debug!("Saved store file: {:?}", path);
    Ok(())
}
