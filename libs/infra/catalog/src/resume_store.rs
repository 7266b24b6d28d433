//! The single-file resume checkpoint (`nextbatch.txt`). Checkpoint de
//! reanudación: un único archivo clave=valor, sin base de datos de por medio.

use std::fs;
use std::path::PathBuf;
use xiebo_domain_models::ResumeRecord;
use xiebo_shared_errors::CoordinatorError;

pub struct ResumeStore {
    path: PathBuf,
}

impl ResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Serializes `record` to the resume file. Callers are responsible for
    /// invoking the external mirror afterward (§4.4 treats mirroring as a
    /// cross-cutting concern, not something this store calls itself).
    pub fn save(&self, record: &ResumeRecord) -> Result<(), CoordinatorError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CoordinatorError::ResumeIo {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, record.to_kv_string()).map_err(|source| CoordinatorError::ResumeIo {
            path: self.path.clone(),
            source,
        })
    }

    pub fn load(&self) -> Option<ResumeRecord> {
        let raw = fs::read_to_string(&self.path).ok()?;
        ResumeRecord::from_kv_string(&raw)
    }

    /// Removes the resume file once partitioning is complete. Absence of
    /// the file is not an error.
    pub fn clear(&self) -> Result<(), CoordinatorError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CoordinatorError::ResumeIo {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
