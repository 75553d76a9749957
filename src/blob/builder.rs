//! Chunked, append-optimized byte buffer.
//!
//! A [`BlobBuilder`] owns a chain of fixed-size chunks stored in an arena. Exactly one chunk, the
//! head, accepts writes; every other chunk is frozen and only contributes its written length.
//! Chunks are linked as a ring: the head records the first chunk of the chain and every frozen
//! chunk records its successor, so walking from the first chunk visits the content in order and
//! ends at the head.
//!
//! Growing the buffer never moves bytes. When the head runs out of space, it is frozen in place
//! and a freshly allocated chunk becomes the new head, which keeps the arena index of every
//! reservation stable. Whole builders can be concatenated with [`BlobBuilder::link_suffix`] and
//! [`BlobBuilder::link_prefix`]; the chunks of the other builder are moved into this builder's
//! arena without copying their bytes, and the other builder becomes unusable for writing.
//!
//! # Examples
//!
//! ```rust
//! use metascope::blob::BlobBuilder;
//!
//! let mut builder = BlobBuilder::new();
//! builder.write_utf8("hi")?;
//! builder.write_compressed_integer(300)?;
//! builder.write_u8(0xFF)?;
//! assert_eq!(builder.to_vec()?, [0x68, 0x69, 0x81, 0x2C, 0xFF]);
//!
//! let mut tail = BlobBuilder::new();
//! tail.write_le(0xCAFEu16)?;
//! builder.link_suffix(&mut tail)?;
//! assert_eq!(builder.count(), 7);
//! assert!(tail.write_u8(0).is_err());
//! # Ok::<(), metascope::Error>(())
//! ```

use std::{fmt, io::Write, sync::Arc};

use widestring::U16String;

use crate::{
    blob::{
        allocator::{ChunkAllocator, HeapAllocator},
        encode_compressed_integer, encode_compressed_signed_integer, user_string_terminal, Blob,
        BlobWriter,
    },
    file::io::MetadataIO,
    Result,
};

/// Chunk size used by [`BlobBuilder::new`].
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Smallest chunk size a builder accepts; smaller requests are rounded up.
pub const MIN_CHUNK_SIZE: usize = 16;

const REPLACEMENT_CHARACTER: [u8; 3] = [0xEF, 0xBF, 0xBD];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkRole {
    /// Writable chunk, remembers where the chain starts
    Head { first: usize },
    /// Immutable chunk, remembers its successor
    Frozen { next: usize },
}

struct Chunk {
    buffer: Vec<u8>,
    written: usize,
    role: ChunkRole,
}

impl Chunk {
    fn free_space(&self) -> usize {
        self.buffer.len() - self.written
    }
}

/// Append-only byte buffer built from a chain of chunks.
///
/// See the [module documentation](self) for the chunk layout. All write operations fail with
/// [`crate::Error::InvalidOperation`] once the builder has been linked into another builder.
pub struct BlobBuilder {
    chunks: Vec<Chunk>,
    head: usize,
    previous_length: usize,
    chunk_size: usize,
    linked: bool,
    allocator: Arc<dyn ChunkAllocator>,
}

impl BlobBuilder {
    /// Create a builder with [`DEFAULT_CHUNK_SIZE`] chunks allocated from the heap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHUNK_SIZE)
    }

    /// Create a builder whose chunks hold at least `chunk_size` bytes.
    #[must_use]
    pub fn with_capacity(chunk_size: usize) -> Self {
        Self::with_allocator(chunk_size, Arc::new(HeapAllocator))
    }

    /// Create a builder that requests its chunks from `allocator`.
    #[must_use]
    pub fn with_allocator(chunk_size: usize, allocator: Arc<dyn ChunkAllocator>) -> Self {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        let buffer = allocator.allocate(chunk_size);

        BlobBuilder {
            chunks: vec![Chunk {
                buffer,
                written: 0,
                role: ChunkRole::Head { first: 0 },
            }],
            head: 0,
            previous_length: 0,
            chunk_size,
            linked: false,
            allocator,
        }
    }

    /// Create a builder whose content starts with `content`.
    ///
    /// The first chunk is sized to hold all of `content`, so nothing spills.
    #[must_use]
    pub fn from_bytes(chunk_size: usize, content: &[u8]) -> Self {
        let mut builder = Self::with_capacity(chunk_size.max(content.len()));
        builder.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);

        let head = &mut builder.chunks[0];
        head.buffer[..content.len()].copy_from_slice(content);
        head.written = content.len();
        builder
    }

    /// Total number of bytes written to the chain.
    ///
    /// A builder that has been linked into another builder no longer owns any content and
    /// reports 0.
    #[must_use]
    pub fn count(&self) -> usize {
        if self.linked {
            return 0;
        }

        self.previous_length + self.chunks[self.head].written
    }

    /// True if no bytes have been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Minimum capacity of newly allocated chunks.
    #[must_use]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_size
    }

    /// Bytes that still fit into the writable chunk without expanding.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        if self.linked {
            return 0;
        }

        self.chunks[self.head].free_space()
    }

    /// True if this builder has been linked into another builder.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Release all chunks except one and reset the builder to an empty, writable state.
    ///
    /// Outstanding reservations become invalid. A builder that was linked away becomes usable
    /// again.
    pub fn clear(&mut self) {
        let keep = if self.linked {
            self.allocator.allocate(self.chunk_size)
        } else {
            let mut buffer = std::mem::take(&mut self.chunks[self.head].buffer);
            let written = self.chunks[self.head].written;
            buffer[..written].fill(0);
            buffer
        };

        for chunk in self.chunks.drain(..) {
            if !chunk.buffer.is_empty() {
                self.allocator.free(chunk.buffer);
            }
        }

        self.chunks.push(Chunk {
            buffer: keep,
            written: 0,
            role: ChunkRole::Head { first: 0 },
        });
        self.head = 0;
        self.previous_length = 0;
        self.linked = false;
    }

    /// Reserve `byte_count` contiguous bytes at the current position.
    ///
    /// The bytes are zeroed and count as written. Fill them in later through
    /// [`BlobBuilder::reserved_writer`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn reserve(&mut self, byte_count: usize) -> Result<Blob> {
        self.ensure_head()?;
        if byte_count == 0 {
            return Ok(Blob::default());
        }

        if self.chunks[self.head].free_space() < byte_count {
            self.expand(byte_count);
        }

        let head = &mut self.chunks[self.head];
        let start = head.written;
        head.buffer[start..start + byte_count].fill(0);
        head.written += byte_count;

        self.check_invariants();
        Ok(Blob {
            chunk: Some(self.head),
            start,
            length: byte_count,
        })
    }

    /// A writer over the bytes of a reservation made by this builder.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `blob` does not address a region of this
    /// builder.
    pub fn reserved_writer(&mut self, blob: &Blob) -> Result<BlobWriter<'_>> {
        let Some(index) = blob.chunk else {
            return Ok(BlobWriter::new(&mut []));
        };

        let Some(chunk) = self.chunks.get_mut(index) else {
            return Err(out_of_bounds_error!());
        };

        let end = blob
            .start
            .checked_add(blob.length)
            .ok_or(out_of_bounds_error!())?;
        if end > chunk.written {
            return Err(out_of_bounds_error!());
        }

        Ok(BlobWriter::new(&mut chunk.buffer[blob.start..end]))
    }

    /// Append `data`, spilling into new chunks as required.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        self.ensure_head()?;

        loop {
            let head = &mut self.chunks[self.head];
            let take = head.free_space().min(data.len());
            head.buffer[head.written..head.written + take].copy_from_slice(&data[..take]);
            head.written += take;
            data = &data[take..];

            if data.is_empty() {
                break;
            }
            self.expand(data.len());
        }

        self.check_invariants();
        Ok(())
    }

    /// Append `count` copies of `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_fill(&mut self, value: u8, mut count: usize) -> Result<()> {
        self.ensure_head()?;

        loop {
            let head = &mut self.chunks[self.head];
            let take = head.free_space().min(count);
            head.buffer[head.written..head.written + take].fill(value);
            head.written += take;
            count -= take;

            if count == 0 {
                break;
            }
            self.expand(count);
        }

        self.check_invariants();
        Ok(())
    }

    /// Append a single byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Append a boolean as a single byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Append a primitive in little-endian byte order.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_le<T: MetadataIO>(&mut self, value: T) -> Result<()> {
        self.write_bytes(value.to_le_bytes().as_ref())
    }

    /// Append a primitive in big-endian byte order.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_be<T: MetadataIO>(&mut self, value: T) -> Result<()> {
        self.write_bytes(value.to_be_bytes().as_ref())
    }

    /// Append a 2 or 4 byte table or heap reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_reference(&mut self, reference: u32, is_small: bool) -> Result<()> {
        if is_small {
            debug_assert!(reference <= u32::from(u16::MAX));
            self.write_le(reference as u16)
        } else {
            self.write_le(reference)
        }
    }

    /// Append an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `value` exceeds `0x1FFF_FFFF` and
    /// [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_compressed_integer(&mut self, value: u32) -> Result<()> {
        let (bytes, len) = encode_compressed_integer(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Append an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `value` is outside `-2^28..2^28` and
    /// [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_compressed_signed_integer(&mut self, value: i32) -> Result<()> {
        let (bytes, len) = encode_compressed_signed_integer(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Append the UTF-8 bytes of `text` without terminator or length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_utf8(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Append UTF-16 code units converted to UTF-8.
    ///
    /// Unpaired surrogates are replaced by U+FFFD unless `allow_unpaired_surrogates` is set, in
    /// which case each one is encoded on its own as a 3-byte sequence.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_utf16_as_utf8(
        &mut self,
        units: &[u16],
        allow_unpaired_surrogates: bool,
    ) -> Result<()> {
        let mut scratch = [0u8; 4];
        for decoded in char::decode_utf16(units.iter().copied()) {
            match decoded {
                Ok(c) => self.write_bytes(c.encode_utf8(&mut scratch).as_bytes())?,
                Err(error) if allow_unpaired_surrogates => {
                    let unit = error.unpaired_surrogate();
                    self.write_bytes(&[
                        0xE0 | (unit >> 12) as u8,
                        0x80 | ((unit >> 6) & 0x3F) as u8,
                        0x80 | (unit & 0x3F) as u8,
                    ])?;
                }
                Err(_) => self.write_bytes(&REPLACEMENT_CHARACTER)?,
            }
        }
        Ok(())
    }

    /// Append the UTF-16LE code units of `text`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_utf16(&mut self, text: &str) -> Result<()> {
        for unit in text.encode_utf16() {
            self.write_le(unit)?;
        }
        Ok(())
    }

    /// Append a `SerString` (II.23.3): `0xFF` for `None`, otherwise the compressed byte length
    /// followed by the UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the string is too long to prefix and
    /// [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_serialized_string(&mut self, text: Option<&str>) -> Result<()> {
        match text {
            None => self.write_u8(0xFF),
            Some(text) => {
                self.write_compressed_integer(crate::utils::to_u32(text.len())?)?;
                self.write_utf8(text)
            }
        }
    }

    /// Append a `#US` heap entry: compressed byte length, UTF-16LE units and the terminal byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the string is too long to prefix and
    /// [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_user_string(&mut self, text: &str) -> Result<()> {
        let units = U16String::from_str(text);
        let byte_len = crate::utils::to_u32(units.len() * 2 + 1)?;

        self.write_compressed_integer(byte_len)?;
        for &unit in units.as_slice() {
            self.write_le(unit)?;
        }
        self.write_u8(user_string_terminal(units.as_slice()))
    }

    /// Append the 16 bytes of `guid` in their on-disk (mixed-endian) layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn write_guid(&mut self, guid: &uguid::Guid) -> Result<()> {
        self.write_bytes(&guid.to_bytes())
    }

    /// Append zero bytes until the count is a multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `alignment` is not a power of two and
    /// [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if crate::utils::is_power_of_two(alignment).is_none() {
            return Err(argument_error!("alignment {} is not a power of two", alignment));
        }

        let count = self.count();
        self.write_fill(0, crate::utils::align_to(count, alignment) - count)
    }

    /// Append zero bytes until the count reaches `position`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if more than `position` bytes have already
    /// been written and [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn pad_to(&mut self, position: usize) -> Result<()> {
        let count = self.count();
        if position < count {
            return Err(argument_error!(
                "cannot pad to {} - {} bytes already written",
                position,
                count
            ));
        }

        self.write_fill(0, position - count)
    }

    /// Append a copy of the content of `other`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if either builder has been linked.
    pub fn write_builder(&mut self, other: &BlobBuilder) -> Result<()> {
        for blob in other.blobs()? {
            self.write_bytes(blob)?;
        }
        Ok(())
    }

    /// Iterate the written bytes chunk by chunk, from the first chunk to the head.
    ///
    /// The traversal can be restarted any number of times. The writable chunk is included even
    /// when nothing has been written to it yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn blobs(&self) -> Result<Blobs<'_>> {
        self.ensure_head()?;

        Ok(Blobs {
            builder: self,
            next: Some(self.first()),
        })
    }

    /// Copy the whole content into a contiguous vector.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.to_vec_range(0, self.count())
    }

    /// Copy `byte_count` bytes starting at `start` into a contiguous vector.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the range exceeds [`BlobBuilder::count`]
    /// and [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn to_vec_range(&self, start: usize, byte_count: usize) -> Result<Vec<u8>> {
        self.ensure_head()?;

        let end = start
            .checked_add(byte_count)
            .filter(|&end| end <= self.count())
            .ok_or_else(|| {
                argument_error!(
                    "range {}+{} exceeds the {} written bytes",
                    start,
                    byte_count,
                    self.count()
                )
            })?;

        let mut result = Vec::with_capacity(byte_count);
        let mut position = 0;
        for blob in self.blobs()? {
            let blob_end = position + blob.len();
            if blob_end > start && position < end {
                let from = start.saturating_sub(position);
                let to = (end - position).min(blob.len());
                result.extend_from_slice(&blob[from..to]);
            }
            if blob_end >= end {
                break;
            }
            position = blob_end;
        }

        Ok(result)
    }

    /// Stream the content into `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked, or
    /// [`crate::Error::FileError`] if `out` fails.
    pub fn write_content_to<W: Write>(&self, out: &mut W) -> Result<()> {
        for blob in self.blobs()? {
            out.write_all(blob)?;
        }
        Ok(())
    }

    /// Compare the content of two builders byte for byte, regardless of how it is chunked.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if either builder has been linked.
    pub fn content_equals(&self, other: &BlobBuilder) -> Result<bool> {
        if self.count() != other.count() {
            self.ensure_head()?;
            other.ensure_head()?;
            return Ok(false);
        }

        Ok(self.blobs()?.flatten().eq(other.blobs()?.flatten()))
    }

    /// Append the content of `suffix` to this builder without copying it.
    ///
    /// The chunks of `suffix` move into this builder and its writable chunk becomes this
    /// builder's writable chunk. Afterwards `suffix` is linked: it reports no content and
    /// rejects writes until it is cleared. Linking an empty `suffix` only releases its chunk
    /// and leaves it usable.
    ///
    /// The cost is one arena slot move per chunk of `suffix`; content bytes are never copied.
    /// An empty writable chunk of this builder gives its slot to the first incoming chunk.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if either builder has already been linked.
    pub fn link_suffix(&mut self, suffix: &mut BlobBuilder) -> Result<()> {
        self.ensure_head()?;
        suffix.ensure_head()?;

        if suffix.count() == 0 {
            suffix.clear();
            return Ok(());
        }

        let suffix_previous_length = suffix.previous_length;
        let mut incoming = suffix.take_chain().into_iter();

        let old_head = self.head;
        let old_head_written = self.chunks[old_head].written;
        let first = self.first();

        let mut tail = None;
        if old_head_written > 0 {
            tail = Some(old_head);
        } else if let Some(chunk) = incoming.next() {
            let released = std::mem::replace(&mut self.chunks[old_head], chunk);
            self.allocator.free(released.buffer);
            tail = Some(old_head);
            self.chunks[old_head].role = ChunkRole::Head { first };
        }

        for chunk in incoming {
            let index = self.chunks.len();
            self.chunks.push(Chunk {
                buffer: chunk.buffer,
                written: chunk.written,
                role: ChunkRole::Head { first },
            });
            if let Some(tail) = tail {
                self.chunks[tail].role = ChunkRole::Frozen { next: index };
            }
            tail = Some(index);
        }

        if let Some(head) = tail {
            self.head = head;
        }
        self.previous_length += old_head_written + suffix_previous_length;

        tracing::trace!(
            count = self.count(),
            chunks = self.chunk_count(),
            "linked suffix builder"
        );
        self.check_invariants();
        Ok(())
    }

    /// Insert the content of `prefix` in front of this builder's content without copying it.
    ///
    /// Mirror of [`BlobBuilder::link_suffix`]. The writable chunk of this builder stays in
    /// place, so its reservations remain valid. Afterwards `prefix` is linked.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if either builder has already been linked.
    pub fn link_prefix(&mut self, prefix: &mut BlobBuilder) -> Result<()> {
        self.ensure_head()?;
        prefix.ensure_head()?;

        let prefix_count = prefix.count();
        if prefix_count == 0 {
            prefix.clear();
            return Ok(());
        }

        let first = self.first();
        let mut new_first = None;
        let mut tail = None;
        for chunk in prefix.take_chain() {
            if chunk.written == 0 {
                self.allocator.free(chunk.buffer);
                continue;
            }

            let index = self.push_frozen(tail, chunk);
            new_first.get_or_insert(index);
            tail = Some(index);
        }

        if let Some(tail) = tail {
            self.chunks[tail].role = ChunkRole::Frozen { next: first };
        }
        self.chunks[self.head].role = ChunkRole::Head {
            first: new_first.unwrap_or(first),
        };
        self.previous_length += prefix_count;

        tracing::trace!(
            count = self.count(),
            chunks = self.chunk_count(),
            "linked prefix builder"
        );
        self.check_invariants();
        Ok(())
    }

    fn ensure_head(&self) -> Result<()> {
        if self.linked {
            return Err(invalid_operation!(
                "builder has been linked into another builder"
            ));
        }
        Ok(())
    }

    fn first(&self) -> usize {
        match self.chunks[self.head].role {
            ChunkRole::Head { first } => first,
            _ => self.head,
        }
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn push_frozen(&mut self, tail: Option<usize>, chunk: Chunk) -> usize {
        let index = self.chunks.len();
        self.chunks.push(Chunk {
            buffer: chunk.buffer,
            written: chunk.written,
            role: ChunkRole::Frozen { next: index },
        });
        if let Some(tail) = tail {
            self.chunks[tail].role = ChunkRole::Frozen { next: index };
        }
        index
    }

    /// Detach all chunks in content order and mark the builder as linked.
    fn take_chain(&mut self) -> Vec<Chunk> {
        let mut order = Vec::with_capacity(self.chunks.len());
        let mut current = self.first();
        loop {
            order.push(current);
            match self.chunks[current].role {
                ChunkRole::Frozen { next } => current = next,
                _ => break,
            }
        }

        let mut slots: Vec<Option<Chunk>> = self.chunks.drain(..).map(Some).collect();
        let taken = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        self.head = 0;
        self.previous_length = 0;
        self.linked = true;
        taken
    }

    /// Freeze the head in place and continue in a new chunk of at least `min_length` bytes.
    fn expand(&mut self, min_length: usize) {
        let capacity = self.chunk_size.max(min_length);
        let buffer = self.allocator.allocate(capacity);

        let head = self.head;
        if self.chunks[head].written == 0 {
            let old = std::mem::replace(&mut self.chunks[head].buffer, buffer);
            self.allocator.free(old);
            return;
        }

        let first = self.first();
        let new_head = self.chunks.len();
        self.chunks.push(Chunk {
            buffer,
            written: 0,
            role: ChunkRole::Head { first },
        });
        self.previous_length += self.chunks[head].written;
        self.chunks[head].role = ChunkRole::Frozen { next: new_head };
        self.head = new_head;

        tracing::trace!(
            capacity,
            previous_length = self.previous_length,
            "expanded blob builder"
        );
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        let mut total = 0;
        let mut current = self.first();
        let mut steps = 0;
        loop {
            let chunk = &self.chunks[current];
            total += chunk.written;
            steps += 1;
            debug_assert!(steps <= self.chunks.len(), "chunk chain does not reach the head");

            match chunk.role {
                ChunkRole::Frozen { next } => {
                    debug_assert!(chunk.written > 0, "frozen chunk without content");
                    current = next;
                }
                ChunkRole::Head { .. } => {
                    debug_assert_eq!(current, self.head);
                    break;
                }
            }
        }
        debug_assert_eq!(steps, self.chunks.len(), "arena holds chunks outside the chain");
        debug_assert_eq!(total, self.count());
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BlobBuilder {
    fn drop(&mut self) {
        let allocator = &self.allocator;
        for chunk in self.chunks.drain(..) {
            if !chunk.buffer.is_empty() {
                allocator.free(chunk.buffer);
            }
        }
    }
}

impl fmt::Debug for BlobBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobBuilder")
            .field("count", &self.count())
            .field("chunks", &self.chunk_count())
            .field("chunk_size", &self.chunk_size)
            .field("linked", &self.linked)
            .finish()
    }
}

/// Iterator over the written bytes of each chunk of a [`BlobBuilder`], in content order.
pub struct Blobs<'a> {
    builder: &'a BlobBuilder,
    next: Option<usize>,
}

impl<'a> Iterator for Blobs<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let chunk = &self.builder.chunks[index];
        self.next = match chunk.role {
            ChunkRole::Frozen { next } => Some(next),
            _ => None,
        };
        Some(&chunk.buffer[..chunk.written])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{blob::PooledAllocator, Error};

    fn builder_with(chunk_size: usize, content: &[u8]) -> BlobBuilder {
        let mut builder = BlobBuilder::with_capacity(chunk_size);
        builder.write_bytes(content).unwrap();
        builder
    }

    #[test]
    fn end_to_end_bytes() {
        let mut builder = BlobBuilder::new();
        builder.write_utf8("hi").unwrap();
        builder.write_compressed_integer(300).unwrap();
        builder.write_u8(0xFF).unwrap();

        assert_eq!(builder.to_vec().unwrap(), [0x68, 0x69, 0x81, 0x2C, 0xFF]);
        assert_eq!(builder.count(), 5);
    }

    #[test]
    fn chunk_size_does_not_change_content() {
        let write_all = |builder: &mut BlobBuilder| {
            for i in 0..200u32 {
                builder.write_le(i).unwrap();
                builder.write_compressed_integer(i * 97).unwrap();
                builder.write_utf8("chunked").unwrap();
                builder.write_fill(0xAB, (i % 5) as usize).unwrap();
            }
            builder.write_bytes(&[0x5A; 1000]).unwrap();
        };

        let mut small = BlobBuilder::with_capacity(16);
        let mut large = BlobBuilder::with_capacity(4096);
        write_all(&mut small);
        write_all(&mut large);

        assert_eq!(small.to_vec().unwrap(), large.to_vec().unwrap());
        assert!(small.content_equals(&large).unwrap());
        assert!(small.blobs().unwrap().count() > large.blobs().unwrap().count());
    }

    #[test]
    fn minimum_chunk_size() {
        let builder = BlobBuilder::with_capacity(1);
        assert_eq!(builder.chunk_capacity(), MIN_CHUNK_SIZE);
        assert_eq!(builder.free_bytes(), MIN_CHUNK_SIZE);
    }

    #[test]
    fn link_suffix() {
        let mut a = builder_with(16, b"ab");
        let mut b = builder_with(16, b"cd");

        a.link_suffix(&mut b).unwrap();
        assert_eq!(a.to_vec().unwrap(), b"abcd");
        assert_eq!(a.count(), 4);

        assert!(b.is_linked());
        assert_eq!(b.count(), 0);
        assert!(matches!(b.write_u8(1), Err(Error::InvalidOperation(_))));
        assert!(matches!(b.blobs(), Err(Error::InvalidOperation(_))));

        a.write_utf8("ef").unwrap();
        assert_eq!(a.to_vec().unwrap(), b"abcdef");
    }

    #[test]
    fn link_multi_chunk_builders() {
        let left: Vec<u8> = (0..50).collect();
        let right: Vec<u8> = (100..170).collect();
        let mut a = builder_with(16, &left);
        let mut b = builder_with(16, &right);

        a.link_suffix(&mut b).unwrap();

        let mut expected = left.clone();
        expected.extend_from_slice(&right);
        assert_eq!(a.to_vec().unwrap(), expected);
        assert_eq!(a.to_vec_range(45, 10).unwrap(), &expected[45..55]);
    }

    #[test]
    fn link_into_empty_builder() {
        let mut a = BlobBuilder::with_capacity(16);
        let mut b = builder_with(16, &[7; 40]);

        a.link_suffix(&mut b).unwrap();
        assert_eq!(a.to_vec().unwrap(), vec![7; 40]);
        assert_eq!(a.blobs().unwrap().count(), 2);
    }

    #[test]
    fn from_bytes_prefills_first_chunk() {
        let mut builder = BlobBuilder::from_bytes(16, &[9; 40]);
        assert_eq!(builder.count(), 40);
        assert_eq!(builder.chunk_count(), 1);
        assert_eq!(builder.chunk_capacity(), 16);

        builder.write_u8(1).unwrap();
        assert_eq!(builder.chunk_count(), 2);
        assert_eq!(builder.to_vec_range(39, 2).unwrap(), [9, 1]);

        let empty = BlobBuilder::from_bytes(16, &[]);
        assert!(empty.is_empty());
        assert_eq!(empty.free_bytes(), 16);
    }

    #[test]
    fn link_suffix_into_empty_head_after_prefix() {
        let mut a = BlobBuilder::with_capacity(16);
        let mut prefix = builder_with(16, &[1; 20]);
        let mut b = builder_with(16, &[2; 20]);

        a.link_prefix(&mut prefix).unwrap();
        assert_eq!(a.chunk_count(), 3);

        a.link_suffix(&mut b).unwrap();
        assert_eq!(a.chunk_count(), 4);

        let mut expected = vec![1; 20];
        expected.extend_from_slice(&[2; 20]);
        assert_eq!(a.to_vec().unwrap(), expected);

        a.write_u8(3).unwrap();
        assert_eq!(a.count(), 41);
        assert_eq!(a.to_vec_range(38, 3).unwrap(), [2, 2, 3]);
    }

    #[test]
    fn link_empty_suffix() {
        let mut a = builder_with(16, b"ab");
        let mut b = BlobBuilder::with_capacity(16);

        a.link_suffix(&mut b).unwrap();
        assert_eq!(a.to_vec().unwrap(), b"ab");
        assert!(!b.is_linked());
        b.write_u8(1).unwrap();
    }

    #[test]
    fn link_linked_builder() {
        let mut a = builder_with(16, b"ab");
        let mut b = builder_with(16, b"cd");
        let mut c = builder_with(16, b"ef");

        a.link_suffix(&mut b).unwrap();
        assert!(matches!(
            c.link_suffix(&mut b),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            b.link_suffix(&mut c),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(c.to_vec().unwrap(), b"ef");
    }

    #[test]
    fn link_prefix() {
        let mut a = builder_with(16, b"world");
        let reservation = a.reserve(2).unwrap();
        let mut p = builder_with(16, &[b'x'; 20]);

        a.link_prefix(&mut p).unwrap();
        a.reserved_writer(&reservation)
            .unwrap()
            .write_bytes(b"!!")
            .unwrap();

        let mut expected = vec![b'x'; 20];
        expected.extend_from_slice(b"world!!");
        assert_eq!(a.to_vec().unwrap(), expected);
        assert!(p.is_linked());
    }

    #[test]
    fn reservation_survives_expansion() {
        let mut builder = BlobBuilder::with_capacity(16);
        builder.write_utf8("head").unwrap();
        let reservation = builder.reserve(4).unwrap();
        builder.write_bytes(&[0x11; 64]).unwrap();

        builder
            .reserved_writer(&reservation)
            .unwrap()
            .write_le(0xDEAD_BEEFu32)
            .unwrap();

        let content = builder.to_vec().unwrap();
        assert_eq!(&content[..8], b"head\xEF\xBE\xAD\xDE");
        assert_eq!(content.len(), 72);
    }

    #[test]
    fn reserve_larger_than_chunk() {
        let mut builder = BlobBuilder::with_capacity(16);
        builder.write_u8(1).unwrap();
        let blob = builder.reserve(100).unwrap();
        assert_eq!(blob.len(), 100);
        assert_eq!(builder.count(), 101);
        assert!(builder.reserved_writer(&blob).unwrap().remaining() == 100);
    }

    #[test]
    fn to_vec_range_validation() {
        let builder = builder_with(16, b"abcdef");
        assert_eq!(builder.to_vec_range(2, 3).unwrap(), b"cde");
        assert_eq!(builder.to_vec_range(6, 0).unwrap(), b"");
        assert!(matches!(
            builder.to_vec_range(4, 3),
            Err(Error::ArgumentOutOfRange(_))
        ));
    }

    #[test]
    fn compressed_integer_limits() {
        let mut builder = BlobBuilder::new();
        builder.write_compressed_integer(0x1FFF_FFFF).unwrap();
        assert!(matches!(
            builder.write_compressed_integer(0x2000_0000),
            Err(Error::ArgumentOutOfRange(_))
        ));
        assert_eq!(builder.to_vec().unwrap(), [0xDF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn utf16_as_utf8() {
        let mut builder = BlobBuilder::new();
        builder
            .write_utf16_as_utf8(&[0x41, 0xD83D, 0xDE00], false)
            .unwrap();
        assert_eq!(builder.to_vec().unwrap(), [0x41, 0xF0, 0x9F, 0x98, 0x80]);

        let mut replaced = BlobBuilder::new();
        replaced.write_utf16_as_utf8(&[0xD800, 0x41], false).unwrap();
        assert_eq!(replaced.to_vec().unwrap(), [0xEF, 0xBF, 0xBD, 0x41]);

        let mut kept = BlobBuilder::new();
        kept.write_utf16_as_utf8(&[0xD800, 0x41], true).unwrap();
        assert_eq!(kept.to_vec().unwrap(), [0xED, 0xA0, 0x80, 0x41]);
    }

    #[test]
    fn user_and_serialized_strings() {
        let mut builder = BlobBuilder::new();
        builder.write_user_string("a'").unwrap();
        assert_eq!(builder.to_vec().unwrap(), [0x05, 0x61, 0x00, 0x27, 0x00, 0x01]);

        let mut builder = BlobBuilder::new();
        builder.write_serialized_string(None).unwrap();
        builder.write_serialized_string(Some("ok")).unwrap();
        assert_eq!(builder.to_vec().unwrap(), [0xFF, 0x02, b'o', b'k']);
    }

    #[test]
    fn align_and_pad() {
        let mut builder = builder_with(16, &[1, 2, 3]);
        builder.align(4).unwrap();
        assert_eq!(builder.count(), 4);
        builder.align(4).unwrap();
        assert_eq!(builder.count(), 4);
        assert!(builder.align(3).is_err());

        builder.pad_to(10).unwrap();
        assert_eq!(builder.to_vec().unwrap(), [1, 2, 3, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            builder.pad_to(5),
            Err(Error::ArgumentOutOfRange(_))
        ));
    }

    #[test]
    fn references() {
        let mut builder = BlobBuilder::new();
        builder.write_reference(0x1234, true).unwrap();
        builder.write_reference(0x1234, false).unwrap();
        assert_eq!(builder.to_vec().unwrap(), [0x34, 0x12, 0x34, 0x12, 0x00, 0x00]);
    }

    #[test]
    fn write_content_to_sink() {
        let builder = builder_with(16, &[9; 40]);
        let mut out = Vec::new();
        builder.write_content_to(&mut out).unwrap();
        assert_eq!(out, vec![9; 40]);

        let mut copy = BlobBuilder::new();
        copy.write_builder(&builder).unwrap();
        assert!(copy.content_equals(&builder).unwrap());
    }

    #[test]
    fn clear_resets() {
        let mut a = builder_with(16, &[1; 40]);
        a.clear();
        assert_eq!(a.count(), 0);
        assert_eq!(a.blobs().unwrap().count(), 1);

        let mut b = builder_with(16, b"x");
        a.write_u8(5).unwrap();
        a.link_suffix(&mut b).unwrap();
        b.clear();
        b.write_u8(2).unwrap();
        assert_eq!(b.to_vec().unwrap(), [2]);
    }

    #[test]
    fn pooled_chunks_are_recycled() {
        let pool = Arc::new(PooledAllocator::new(16, 16));
        {
            let mut builder = BlobBuilder::with_allocator(16, pool.clone());
            for _ in 0..3 {
                builder.write_bytes(&[3; 16]).unwrap();
            }
        }
        assert_eq!(pool.pooled(), 3);

        let mut builder = BlobBuilder::with_allocator(16, pool.clone());
        assert_eq!(pool.pooled(), 2);
        builder.write_bytes(&[0; 4]).unwrap();
        assert_eq!(builder.to_vec().unwrap(), [0; 4]);
    }
}
