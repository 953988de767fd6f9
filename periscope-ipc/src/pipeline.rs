//! Memory-mapped shared pipeline
//!
//! A fixed-capacity block of memory backed by a uniquely named temp file,
//! mapped by the controller (`create`) and by the agent (`open`). The
//! agent is the only writer, the controller the only reader, and the
//! request/response handshake orders the two: the controller never reads
//! before the agent's response frame announces how many bytes to take.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use uuid::Uuid;

use crate::error::PipelineError;

/// Which side created the mapping; only the creator deletes the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Creator,
    Opener,
}

/// A fixed-capacity mapped file shared between controller and agent.
///
/// Capacity is fixed for the lifetime of one mapping; a write larger
/// than the capacity fails with [`PipelineError::Overflow`], never with
/// silent truncation.
#[derive(Debug)]
pub struct SharedPipeline {
    path: PathBuf,
    capacity: u64,
    map: MmapMut,
    role: Role,
}

impl SharedPipeline {
    /// Create the backing file sized to `capacity` and map it.
    ///
    /// The file lands in `spool_dir` (system temp dir when `None`) under
    /// a unique name so that concurrent invocations never collide.
    pub fn create(spool_dir: Option<&Path>, capacity: u64) -> Result<Self, PipelineError> {
        let dir = spool_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let path = dir.join(format!("periscope-{}.pipe", Uuid::new_v4()));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(capacity)?;

        let map = Self::map(&file, capacity)?;
        log::debug!("created pipeline {} ({} bytes)", path.display(), capacity);
        Ok(Self {
            path,
            capacity,
            map,
            role: Role::Creator,
        })
    }

    /// Map an existing pipeline file (agent side).
    ///
    /// `capacity` must be the capacity used at creation: both sides
    /// compute identical offsets from it.
    pub fn open(path: &Path, capacity: u64) -> Result<Self, PipelineError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let actual = file.metadata()?.len();
        if actual < capacity {
            return Err(PipelineError::CapacityMismatch {
                expected: capacity,
                actual,
            });
        }

        let map = Self::map(&file, capacity)?;
        log::debug!("opened pipeline {} ({} bytes)", path.display(), capacity);
        Ok(Self {
            path: path.to_path_buf(),
            capacity,
            map,
            role: Role::Opener,
        })
    }

    fn map(file: &std::fs::File, capacity: u64) -> Result<MmapMut, PipelineError> {
        let len = usize::try_from(capacity)
            .map_err(|_| PipelineError::CapacityUnaddressable(capacity))?;
        // SAFETY: the file length is fixed before mapping and the two
        // processes never write concurrently (handshake-ordered).
        let map = unsafe { MmapOptions::new().len(len).map_mut(file)? };
        Ok(map)
    }

    /// Capacity of this mapping in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` at offset zero and force them to the mapping.
    ///
    /// Fails with [`PipelineError::Overflow`] when the payload exceeds
    /// the capacity. The flush completes before this returns, so a
    /// response frame sent afterwards is a valid read barrier.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        let required = bytes.len() as u64;
        if required > self.capacity {
            return Err(PipelineError::Overflow {
                required,
                capacity: self.capacity,
            });
        }

        self.map[..bytes.len()].copy_from_slice(bytes);
        self.map.flush()?;
        Ok(())
    }

    /// Read exactly `len` bytes from offset zero.
    pub fn read(&self, len: u64) -> Result<Vec<u8>, PipelineError> {
        if len > self.capacity {
            return Err(PipelineError::BadReadLength {
                requested: len,
                capacity: self.capacity,
            });
        }
        Ok(self.map[..len as usize].to_vec())
    }

    /// Unmap and, on the creator side, delete the backing file.
    ///
    /// Deletion is best-effort; the helper never deletes (the controller
    /// owns the file's lifecycle).
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SharedPipeline {
    fn drop(&mut self) {
        if self.role == Role::Creator {
            // Best-effort; the file may already be gone.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
