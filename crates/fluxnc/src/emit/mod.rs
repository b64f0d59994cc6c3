//! Writers turning a [`ConvertedDataset`] into a file on disk.
//!
//! Every writer stages its output in a temporary file beside the target
//! and renames it into place only once the write has completed, so a
//! failed conversion never leaves a partial file behind.

mod json;
#[cfg(feature = "netcdf")]
mod netcdf;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use crate::error::{FluxError, Result};
use crate::output::ConvertedDataset;

pub use json::JsonEmitter;
#[cfg(feature = "netcdf")]
pub use self::netcdf::NetcdfEmitter;

/// Output encoder.
pub trait FileEmitter: Send + Sync {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Write the dataset to `path`, atomically.
    fn emit(&self, dataset: &ConvertedDataset, path: &Path) -> Result<()>;
}

/// Look an emitter up by format name (`json`, `netcdf`/`nc`).
pub fn emitter_for(format: &str) -> Result<Box<dyn FileEmitter>> {
    match format.to_ascii_lowercase().as_str() {
        "json" => Ok(Box::new(JsonEmitter::new())),
        #[cfg(feature = "netcdf")]
        "netcdf" | "nc" => Ok(Box::new(NetcdfEmitter::new())),
        #[cfg(not(feature = "netcdf"))]
        "netcdf" | "nc" => Err(FluxError::Config(
            "NetCDF output requires the `netcdf` feature".to_string(),
        )),
        other => Err(FluxError::Config(format!("unknown output format '{}'", other))),
    }
}

/// Write `target` through a staging file beside it.
///
/// `write` fills the staging file; it is renamed onto `target` only when
/// `write` succeeds. On any failure the staging file and every directory
/// created for `target` are removed again.
pub(crate) fn write_atomic<F>(target: &Path, extension: &str, write: F) -> Result<()>
where
    F: FnOnce(&NamedTempFile) -> Result<()>,
{
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let created = create_parents(parent)?;

    let outcome = stage(parent, extension).and_then(|staged| {
        write(&staged)?;
        commit(staged, target)
    });
    if outcome.is_err() {
        remove_created(&created);
    }
    outcome
}

/// Create `dir` and its missing ancestors; returns those created, deepest first.
fn create_parents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(d) = cursor {
        if d.as_os_str().is_empty() || d.exists() {
            break;
        }
        missing.push(d.to_path_buf());
        cursor = d.parent();
    }

    if !missing.is_empty() {
        fs::create_dir_all(dir).map_err(|e| FluxError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        debug!(dir = %dir.display(), "created output directory");
    }
    Ok(missing)
}

fn remove_created(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(e) = fs::remove_dir(dir) {
            debug!(dir = %dir.display(), error = %e, "left output directory in place");
            break;
        }
    }
}

fn stage(parent: &Path, extension: &str) -> Result<NamedTempFile> {
    Builder::new()
        .prefix(".fluxnc-")
        .suffix(&format!(".{}.partial", extension))
        .tempfile_in(parent)
        .map_err(|e| FluxError::Encoding(format!("cannot stage output in '{}': {}", parent.display(), e)))
}

fn commit(staged: NamedTempFile, target: &Path) -> Result<()> {
    staged
        .persist(target)
        .map_err(|e| FluxError::Encoding(format!("cannot write '{}': {}", target.display(), e.error)))?;
    info!(file = %target.display(), "output written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_emitter_lookup() {
        assert_eq!(emitter_for("JSON").unwrap().extension(), "json");
        assert!(matches!(emitter_for("parquet"), Err(FluxError::Config(_))));
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_netcdf_needs_feature() {
        assert!(emitter_for("netcdf").is_err());
    }

    #[test]
    fn test_write_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("deeper").join("out.json");

        write_atomic(&target, "json", |staged| {
            assert!(staged.path().starts_with(dir.path().join("nested").join("deeper")));
            staged.as_file().write_all(b"{}").map_err(|e| FluxError::Encoding(e.to_string()))
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn test_failed_write_removes_created_directories() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("deeper").join("out.json");

        let err = write_atomic(&target, "json", |_| Err(FluxError::Encoding("boom".to_string())))
            .unwrap_err();

        assert!(matches!(err, FluxError::Encoding(_)));
        assert!(!dir.path().join("nested").exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_failed_write_keeps_existing_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.json");

        assert!(write_atomic(&target, "json", |_| Err(FluxError::Encoding("boom".to_string()))).is_err());

        assert!(dir.path().exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
