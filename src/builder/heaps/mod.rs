//! Accumulation of heap content while a metadata image is being built.
//!
//! [`HeapBuilder`] deduplicates everything it is handed: equal strings, user strings and blobs are
//! stored once and share one handle. Blob, GUID and user string handles are final when they are
//! returned. `#Strings` handles are virtual until [`HeapBuilder::finish`] has laid out the heap
//! with suffix folding; [`SerializedHeaps::string_offset`] then resolves them.
//!
//! # Example
//!
//! ```rust
//! use metascope::builder::HeapBuilder;
//!
//! let mut heaps = HeapBuilder::new();
//! let foo = heaps.intern_string("Foo");
//! let bar_foo = heaps.intern_string("BarFoo");
//! let signature = heaps.intern_blob(&[0x06, 0x08])?;
//! assert_eq!(heaps.intern_blob(&[0x06, 0x08])?, signature);
//!
//! let heaps = heaps.finish()?;
//! assert_eq!(heaps.string_offset(bar_foo)?, 1);
//! assert_eq!(heaps.string_offset(foo)?, 4);
//! # Ok::<(), metascope::Error>(())
//! ```

mod blobdict;
mod strings;

use rustc_hash::FxHashMap;
use strum::EnumCount;

use crate::{
    blob::{BlobBuilder, DEFAULT_CHUNK_SIZE},
    metadata::{
        handles::{BlobHandle, GuidHandle, StringHandle, StringKind, UserStringHandle, OFFSET_MASK},
        sizes::HeapIndex,
    },
    utils::to_u32,
    Result,
};

use blobdict::BlobDictionary;
use strings::serialize_string_heap;

/// Largest size of the `#US` heap; user string tokens hold a 24-bit offset.
pub const MAX_USER_STRING_HEAP_SIZE: usize = 1 << 24;

/// Deduplicating accumulator for the content of the four heaps.
pub struct HeapBuilder {
    strings: FxHashMap<String, StringHandle>,
    string_list: Vec<String>,
    user_strings: FxHashMap<String, UserStringHandle>,
    user_string_heap: BlobBuilder,
    blobs: BlobDictionary,
    blob_heap: BlobBuilder,
    guid_heap: BlobBuilder,
}

impl HeapBuilder {
    /// Create empty heaps. `#US` and `#Blob` start with the empty entry at offset 0.
    #[must_use]
    pub fn new() -> Self {
        HeapBuilder {
            strings: FxHashMap::default(),
            string_list: Vec::new(),
            user_strings: FxHashMap::default(),
            user_string_heap: BlobBuilder::from_bytes(DEFAULT_CHUNK_SIZE, &[0]),
            blobs: BlobDictionary::new(),
            blob_heap: BlobBuilder::from_bytes(DEFAULT_CHUNK_SIZE, &[0]),
            guid_heap: BlobBuilder::new(),
        }
    }

    /// Intern an identifier for the `#Strings` heap.
    ///
    /// The returned handle is virtual; its offset is assigned by [`HeapBuilder::finish`]. The
    /// empty string maps to the nil handle.
    pub fn intern_string(&mut self, text: &str) -> StringHandle {
        if text.is_empty() {
            return StringHandle::default();
        }

        if let Some(handle) = self.strings.get(text) {
            return *handle;
        }

        self.string_list.push(text.to_string());
        let handle = StringHandle::from_virtual_index(self.string_list.len() as u32);
        self.strings.insert(text.to_string(), handle);
        handle
    }

    /// Intern a literal string for the `#US` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the heap would grow beyond
    /// [`MAX_USER_STRING_HEAP_SIZE`].
    pub fn intern_user_string(&mut self, text: &str) -> Result<UserStringHandle> {
        if let Some(handle) = self.user_strings.get(text) {
            return Ok(*handle);
        }

        let offset = self.user_string_heap.count();
        let mut entry = BlobBuilder::with_capacity(text.len() * 2 + 8);
        entry.write_user_string(text)?;
        if offset + entry.count() > MAX_USER_STRING_HEAP_SIZE {
            return Err(argument_error!(
                "#US heap exceeds {} bytes",
                MAX_USER_STRING_HEAP_SIZE
            ));
        }

        self.user_string_heap.link_suffix(&mut entry)?;
        let handle = UserStringHandle::from_offset(to_u32(offset)?);
        self.user_strings.insert(text.to_string(), handle);
        Ok(handle)
    }

    /// Intern a blob; identical content yields the same handle, empty content the nil handle.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the blob is too long for its length prefix
    /// or the heap outgrows the 29-bit offset space.
    pub fn intern_blob(&mut self, content: &[u8]) -> Result<BlobHandle> {
        if content.is_empty() {
            return Ok(BlobHandle::default());
        }

        let heap = &mut self.blob_heap;
        self.blobs.get_or_insert_with(content, || {
            let offset = heap.count();
            if offset > OFFSET_MASK as usize {
                return Err(argument_error!("#Blob heap exceeds {} bytes", OFFSET_MASK));
            }

            heap.write_compressed_integer(to_u32(content.len())?)?;
            heap.write_bytes(content)?;
            Ok(BlobHandle::from_offset(offset as u32))
        })
    }

    /// Intern the content of `builder` as a blob.
    ///
    /// # Errors
    /// See [`HeapBuilder::intern_blob`]; also fails if `builder` has been linked.
    pub fn intern_blob_builder(&mut self, builder: &BlobBuilder) -> Result<BlobHandle> {
        self.intern_blob(&builder.to_vec()?)
    }

    /// Intern a Portable PDB document name.
    ///
    /// The name is split at its dominant separator (`/` unless `\` occurs more often); the blob
    /// holds the separator byte followed by the compressed blob offset of every UTF-8 part.
    ///
    /// # Errors
    /// See [`HeapBuilder::intern_blob`].
    pub fn intern_document_name(&mut self, name: &str) -> Result<BlobHandle> {
        let forward = name.matches('/').count();
        let backward = name.matches('\\').count();
        let separator = if forward >= backward { '/' } else { '\\' };

        let mut document = BlobBuilder::new();
        document.write_u8(separator as u8)?;
        for part in name.split(separator) {
            let part = self.intern_blob(part.as_bytes())?;
            document.write_compressed_integer(part.offset().unwrap_or(0))?;
        }

        self.intern_blob_builder(&document)
    }

    /// Append a GUID to the `#GUID` heap; the nil GUID maps to the nil handle.
    ///
    /// GUID handles are 1-based indices of 16-byte entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the index no longer fits a heap handle
    pub fn intern_guid(&mut self, guid: uguid::Guid) -> Result<GuidHandle> {
        if guid == uguid::Guid::ZERO {
            return Ok(GuidHandle::default());
        }

        let index = to_u32(self.guid_heap.count() / 16 + 1)?;
        if index > OFFSET_MASK {
            return Err(argument_error!("#GUID heap holds too many entries - {}", index));
        }

        self.guid_heap.write_guid(&guid)?;
        Ok(GuidHandle::from_offset(index))
    }

    /// Number of distinct `#Strings` entries
    #[must_use]
    pub fn string_count(&self) -> usize {
        self.string_list.len()
    }

    /// Number of distinct blobs
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Lay out the `#Strings` heap and hand over the content of all four heaps.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#Strings` heap outgrows the 29-bit
    /// offset space.
    pub fn finish(self) -> Result<SerializedHeaps> {
        let mut strings = BlobBuilder::new();
        let string_offsets = serialize_string_heap(&self.string_list, &mut strings)?;
        if strings.count() > OFFSET_MASK as usize {
            return Err(argument_error!("#Strings heap exceeds {} bytes", OFFSET_MASK));
        }

        Ok(SerializedHeaps {
            strings,
            user_strings: self.user_string_heap,
            blobs: self.blob_heap,
            guids: self.guid_heap,
            string_offsets,
        })
    }
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HeapBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapBuilder")
            .field("strings", &self.string_list.len())
            .field("user_strings", &self.user_string_heap.count())
            .field("blobs", &self.blob_heap.count())
            .field("guids", &(self.guid_heap.count() / 16))
            .finish()
    }
}

/// Final content of the four heaps, unaligned.
#[derive(Debug)]
pub struct SerializedHeaps {
    strings: BlobBuilder,
    user_strings: BlobBuilder,
    blobs: BlobBuilder,
    guids: BlobBuilder,
    string_offsets: Vec<u32>,
}

impl SerializedHeaps {
    /// The content of `heap`
    #[must_use]
    pub fn heap(&self, heap: HeapIndex) -> &BlobBuilder {
        match heap {
            HeapIndex::UserString => &self.user_strings,
            HeapIndex::String => &self.strings,
            HeapIndex::Blob => &self.blobs,
            HeapIndex::Guid => &self.guids,
        }
    }

    /// Unaligned byte size of every heap, indexed by [`HeapIndex`]
    #[must_use]
    pub fn heap_sizes(&self) -> [usize; HeapIndex::COUNT] {
        let mut sizes = [0; HeapIndex::COUNT];
        sizes[HeapIndex::UserString.index()] = self.user_strings.count();
        sizes[HeapIndex::String.index()] = self.strings.count();
        sizes[HeapIndex::Blob.index()] = self.blobs.count();
        sizes[HeapIndex::Guid.index()] = self.guids.count();
        sizes
    }

    /// Final `#Strings` offset of `handle`.
    ///
    /// Virtual handles from [`HeapBuilder::intern_string`] resolve to their laid out offset;
    /// plain offsets pass through.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a virtual index no string was interned
    /// under, and for dot-terminated or WinRT-prefixed handles, which have no heap
    /// representation of their own.
    pub fn string_offset(&self, handle: StringHandle) -> Result<u32> {
        match handle.kind() {
            StringKind::Plain => Ok(handle.offset().unwrap_or(0)),
            StringKind::Virtual => {
                let index = handle.value().payload() as usize;
                match self.string_offsets.get(index) {
                    Some(offset) if index > 0 => Ok(*offset),
                    _ => Err(invalid_operation!(
                        "String handle {:?} was not interned by this builder",
                        handle
                    )),
                }
            }
            kind => Err(invalid_operation!(
                "{:?} string handles cannot be serialized",
                kind
            )),
        }
    }
}
