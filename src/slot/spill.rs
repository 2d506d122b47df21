//! Disk-spill strategy for Output history under a memory budget
//! (spec.md §4.2 "Memory limit"). The format is private and only
//! sequential restore is required, so entries are framed as
//! `u64 little-endian length` + JSON bytes and appended to a single
//! scratch file per Output.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Result};

#[derive(Debug, Clone)]
pub struct SpillConfig {
    pub directory: PathBuf,
    pub byte_limit: u64,
}

/// One Output's scratch file: entries are appended as they spill and read
/// back sequentially (in push order) when restored.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    file: File,
    /// Byte offsets of each spilled entry, oldest first, for sequential
    /// restore without scanning the whole file.
    offsets: Vec<u64>,
}

impl SpillFile {
    pub fn create(dir: &std::path::Path, slot_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| FinamError::Spill {
            ctx: ErrorContext::new().slot(slot_name),
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(format!("finam-spill-{slot_name}-{}.bin", std::process::id()));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| FinamError::Spill {
                ctx: ErrorContext::new().slot(slot_name),
                path: path.clone(),
                source: e,
            })?;
        Ok(SpillFile {
            path,
            file,
            offsets: Vec::new(),
        })
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new()
    }

    pub fn append(&mut self, env: &Envelope) -> Result<()> {
        let bytes = serde_json::to_vec(env).expect("envelope serialization cannot fail");
        let offset = self.file.seek(SeekFrom::End(0)).map_err(|e| FinamError::Spill {
            ctx: self.ctx(),
            path: self.path.clone(),
            source: e,
        })?;
        self.file
            .write_all(&(bytes.len() as u64).to_le_bytes())
            .and_then(|_| self.file.write_all(&bytes))
            .map_err(|e| FinamError::Spill {
                ctx: self.ctx(),
                path: self.path.clone(),
                source: e,
            })?;
        self.offsets.push(offset);
        Ok(())
    }

    /// Reads back the `index`-th spilled entry (0 = oldest spilled).
    pub fn read(&mut self, index: usize) -> Result<Envelope> {
        let offset = *self.offsets.get(index).ok_or_else(|| {
            FinamError::data(self.ctx(), "spill index out of range")
        })?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| FinamError::Spill {
                ctx: self.ctx(),
                path: self.path.clone(),
                source: e,
            })?;
        let mut len_bytes = [0u8; 8];
        self.file
            .read_exact(&mut len_bytes)
            .map_err(|e| FinamError::Spill {
                ctx: self.ctx(),
                path: self.path.clone(),
                source: e,
            })?;
        let len = u64::from_le_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).map_err(|e| FinamError::Spill {
            ctx: self.ctx(),
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::from_slice(&buf)
            .map_err(|e| FinamError::data(self.ctx(), format!("corrupt spill entry: {e}")))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Drops the oldest `n` spilled entries; since the file only ever
    /// grows, this just forgets their offsets (the file is removed
    /// entirely on drop).
    pub fn discard_oldest(&mut self, n: usize) {
        self.offsets.drain(0..n.min(self.offsets.len()));
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::prepare;
    use crate::grid::GridSpec;
    use crate::info::Info;
    use crate::payload::Payload;
    use crate::time::Time;
    use crate::units::Units;

    #[test]
    fn round_trips_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let mut spill = SpillFile::create(dir.path(), "out").unwrap();
        let info = Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::dimensionless());
        let envs: Vec<_> = (0..3)
            .map(|i| {
                prepare(
                    Payload::scalar(i as f64),
                    &info,
                    Time::from_ymd_hms(2023, 1, 1 + i, 0, 0, 0),
                )
                .unwrap()
            })
            .collect();
        for e in &envs {
            spill.append(e).unwrap();
        }
        for (i, e) in envs.iter().enumerate() {
            assert_eq!(&spill.read(i).unwrap(), e);
        }
    }
}
