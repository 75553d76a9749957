//! Memory-mapped file backend.

use std::{fs, path::Path};

use memmap2::Mmap;

use super::Backend;
use crate::{
    Error::{Error, FileError},
    Result,
};

/// Image bytes mapped read-only from a file on disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // SAFETY: the mapping is read-only and owned by `Physical`.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|error| Error(error.to_string()))?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        self.data
            .get(offset..offset_end)
            .ok_or(out_of_bounds_error!())
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
