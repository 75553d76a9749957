//! Loading of raw metadata images from disk or memory.
//!
//! A standalone Portable PDB is a metadata image without a PE wrapper, starting directly with the
//! `BSJB` root. [`MetadataFile`] owns the bytes of such an image, either memory-mapped or in an
//! owned buffer, and keeps a parsed [`MetadataReader`] borrowing from them.
//!
//! # Key Components
//!
//! - [`MetadataFile`] - Owned image together with its parsed reader
//! - [`Backend`] - Trait for the data sources (memory-mapped files, owned buffers)
//! - [`io`] - Endian-aware primitive reads and writes
//!
//! # Examples
//!
//! ```rust,no_run
//! use metascope::file::MetadataFile;
//! use std::path::Path;
//!
//! let file = MetadataFile::from_file(Path::new("Program.pdb"))?;
//! println!("{} bytes, version {}", file.len(), file.with_reader(|reader| reader.metadata_version().to_string()));
//! if let Some(id) = file.pdb_id() {
//!     println!("PDB id: {:02x?}", id);
//! }
//! # Ok::<(), metascope::Error>(())
//! ```

pub mod io;

mod memory;
mod physical;

use std::path::Path;

use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

use crate::{
    metadata::{streams::PDB_ID_SIZE, MetadataReader},
    Error::Empty,
    Result,
};

/// Backend trait for file data sources.
///
/// All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

#[self_referencing]
/// A loaded metadata image.
///
/// The image is parsed once on load; any structural problem is reported then, so every
/// `MetadataFile` holds a valid [`MetadataReader`].
///
/// # Examples
///
/// ```rust
/// use metascope::{builder::{MetadataBuilder, MetadataRootBuilder}, file::MetadataFile, BlobBuilder};
///
/// let mut out = BlobBuilder::new();
/// MetadataRootBuilder::new(MetadataBuilder::new(), None, false)?.serialize(&mut out)?;
///
/// let file = MetadataFile::from_mem(out.to_vec()?)?;
/// assert!(!file.is_standalone_debug());
/// file.with_reader(|reader| assert_eq!(reader.metadata_version(), "v4.0.30319"));
/// # Ok::<(), metascope::Error>(())
/// ```
pub struct MetadataFile {
    /// The underlying data source (memory or file).
    data: Box<dyn Backend>,
    /// The parsed metadata, referencing the data.
    #[borrows(data)]
    #[not_covariant]
    parsed: MetadataReader<'this>,
}

impl MetadataFile {
    /// Loads a metadata image from the given path.
    ///
    /// The file is memory-mapped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped,
    /// [`crate::Error::Empty`] if it is empty, and any error of [`MetadataReader::read`].
    pub fn from_file(file: &Path) -> Result<MetadataFile> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Loads a metadata image from a memory buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if the buffer is empty, and any error of
    /// [`MetadataReader::read`].
    pub fn from_mem(data: Vec<u8>) -> Result<MetadataFile> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<MetadataFile> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data: Box<dyn Backend> = Box::new(data);
        MetadataFile::try_new(data, |data| MetadataReader::read(data.data()))
    }

    /// Returns the total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns true if the image holds no bytes. Never true for a loaded file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Returns a slice of the image at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Run `f` with the parsed metadata.
    pub fn with_reader<R>(&self, f: impl FnOnce(&MetadataReader<'_>) -> R) -> R {
        self.with_parsed(|reader| f(reader))
    }

    /// Returns true if the image carries a `#Pdb` stream.
    #[must_use]
    pub fn is_standalone_debug(&self) -> bool {
        self.with_reader(|reader| reader.is_standalone_debug())
    }

    /// The 20-byte id of a standalone Portable PDB.
    #[must_use]
    pub fn pdb_id(&self) -> Option<[u8; PDB_ID_SIZE]> {
        self.with_reader(|reader| reader.pdb().map(|pdb| pdb.id))
    }
}

impl std::fmt::Debug for MetadataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataFile")
            .field("len", &self.len())
            .field("standalone_debug", &self.is_standalone_debug())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::BlobBuilder,
        builder::{ContentId, MetadataBuilder, MetadataRootBuilder, PortablePdbBuilder, RowValue},
        metadata::{
            handles::EntityHandle,
            tables::{TableId, TABLE_SLOTS},
        },
        Error,
    };

    fn module_image() -> Vec<u8> {
        let mut metadata = MetadataBuilder::new();
        let name = metadata.intern_string("Sample.dll");
        metadata
            .add_row(
                TableId::Module,
                vec![
                    RowValue::Int(0),
                    RowValue::String(name),
                    RowValue::Guid(Default::default()),
                    RowValue::Guid(Default::default()),
                    RowValue::Guid(Default::default()),
                ],
            )
            .unwrap();

        let mut out = BlobBuilder::new();
        MetadataRootBuilder::new(metadata, None, false)
            .unwrap()
            .serialize(&mut out)
            .unwrap();
        out.to_vec().unwrap()
    }

    fn pdb_image() -> (Vec<u8>, ContentId) {
        let mut rows = [0u32; TABLE_SLOTS];
        rows[TableId::MethodDef.index()] = 1;

        let pdb = PortablePdbBuilder::new(
            MetadataBuilder::new(),
            &rows,
            EntityHandle::new(TableId::MethodDef, 1),
        )
        .unwrap();

        let mut out = BlobBuilder::new();
        let id = pdb.serialize(&mut out).unwrap();
        (out.to_vec().unwrap(), id)
    }

    #[test]
    fn load_buffer() {
        let image = module_image();
        let file = MetadataFile::from_mem(image.clone()).unwrap();

        assert_eq!(file.len(), image.len());
        assert_eq!(file.data(), image.as_slice());
        assert_eq!(file.data_slice(0, 4).unwrap(), b"BSJB");
        assert!(file.data_slice(image.len(), 1).is_err());
        assert!(!file.is_standalone_debug());
        assert!(file.pdb_id().is_none());

        let name = file.with_reader(|reader| {
            let module = reader.tables().table(TableId::Module).unwrap().row(1).unwrap();
            reader
                .strings()
                .resolve(module.string(1).unwrap())
                .unwrap()
                .to_string()
        });
        assert_eq!(name, "Sample.dll");
    }

    #[test]
    fn load_file() {
        let (image, id) = pdb_image();
        let path = std::env::temp_dir().join(format!("metascope_{}.pdb", std::process::id()));
        std::fs::write(&path, &image).unwrap();

        let file = MetadataFile::from_file(&path).unwrap();
        assert!(file.is_standalone_debug());
        assert_eq!(file.pdb_id(), Some(id.to_bytes()));
        file.with_reader(|reader| {
            assert_eq!(reader.metadata_version(), "PDB v1.0");
            assert_eq!(
                reader.pdb().unwrap().entry_point,
                EntityHandle::new(TableId::MethodDef, 1)
            );
        });

        drop(file);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_invalid() {
        assert!(matches!(MetadataFile::from_mem(vec![]), Err(Error::Empty)));
        assert!(matches!(
            MetadataFile::from_mem(b"BSJA".to_vec()),
            Err(Error::Malformed { .. }) | Err(Error::OutOfBounds)
        ));
        assert!(matches!(
            MetadataFile::from_file(Path::new("/nonexistent/metascope.pdb")),
            Err(Error::FileError(_))
        ));
    }
}
