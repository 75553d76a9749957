// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # metascope
//!
//! [![Crates.io](https://img.shields.io/crates/v/metascope.svg)](https://crates.io/crates/metascope)
//! [![Documentation](https://docs.rs/metascope/badge.svg)](https://docs.rs/metascope)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/metascope/blob/main/LICENSE-APACHE)
//!
//! Bit-exact reading and writing of ECMA-335 CLI metadata and standalone Portable PDBs, in pure
//! Rust. `metascope` is the byte-level core that compilers, linkers and analysis tools build on:
//! a chunked write buffer, a bounds-checked reader, the handle encoding shared by both sides,
//! deduplicating heap builders and the size computation that decides every reference width.
//!
//! ## Features
//!
//! - **📦 Chunked output** - [`BlobBuilder`] grows in chunks, links other builders in O(1) and
//!   reserves windows for late fix-ups
//! - **🔍 Bounded reading** - [`BlobReader`] never reads outside its block and leaves its cursor
//!   untouched when a read fails
//! - **🧩 Handles** - 32-bit handles with real and virtual forms, metadata tokens and coded indices
//! - **🗜️ Heap folding** - `#Strings` suffix sharing, deduplicated `#US` and `#Blob` heaps
//! - **📐 Layout** - 2 or 4 byte references per heap and table, EnC deltas, minimal deltas
//! - **🐞 Portable PDB** - `#Pdb` stream, external row counts and a deterministic content id
//!
//! ## Quick Start
//!
//! ```rust
//! use metascope::prelude::*;
//!
//! let mut metadata = MetadataBuilder::new();
//! let system = metadata.intern_string("System");
//! let object = metadata.intern_string("Object");
//! metadata.add_row(
//!     TableId::TypeRef,
//!     vec![
//!         RowValue::Entity(EntityHandle::nil(TableId::Module)),
//!         RowValue::String(object),
//!         RowValue::String(system),
//!     ],
//! )?;
//!
//! let root = MetadataRootBuilder::new(metadata, None, false)?;
//! let mut out = BlobBuilder::new();
//! root.serialize(&mut out)?;
//!
//! let bytes = out.to_vec()?;
//! let reader = MetadataReader::read(&bytes)?;
//! let type_ref = reader.tables().table(TableId::TypeRef).unwrap().row(1)?;
//! assert_eq!(reader.strings().resolve(type_ref.string(1)?)?, "Object");
//! # Ok::<(), metascope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`blob`] - [`BlobBuilder`], [`BlobReader`], [`blob::MemoryBlock`] and compressed integers
//! - [`metadata`] - Handles, table schema, reference sizes, stream readers and [`MetadataReader`]
//! - [`builder`] - Heap and table accumulation, metadata root and Portable PDB serialization
//! - [`file`] - Loading raw metadata images from disk or memory
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Standards Compliance
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Partition II, sections 22 to 24
//! - [Portable PDB v1.0](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md)
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Caller mistakes and damaged input are
//! kept apart:
//!
//! ```rust
//! use metascope::{BlobReader, Error};
//!
//! let mut reader = BlobReader::new(&[0xFF]);
//! match reader.read_compressed_integer() {
//!     Err(Error::Malformed { message, .. }) => println!("damaged input: {message}"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! assert_eq!(reader.offset(), 0);
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! cargo +nightly fuzz run metadata --release
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub(crate) mod utils;

pub mod blob;
pub mod builder;
pub mod file;
pub mod metadata;
pub mod prelude;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use metascope::{BlobReader, Result};
///
/// fn first_length(data: &[u8]) -> Result<u32> {
///     BlobReader::new(data).read_compressed_integer()
/// }
/// assert_eq!(first_length(&[0x81, 0x2C]).unwrap(), 0x12C);
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `metascope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Chunked write buffer and bounded reader, the two ends of every metadata byte stream.
///
/// # Example
///
/// ```rust
/// use metascope::{BlobBuilder, BlobReader};
///
/// let mut builder = BlobBuilder::new();
/// builder.write_compressed_integer(0x3FFF)?;
/// let bytes = builder.to_vec()?;
/// assert_eq!(BlobReader::new(&bytes).read_compressed_integer()?, 0x3FFF);
/// # Ok::<(), metascope::Error>(())
/// ```
pub use blob::{BlobBuilder, BlobReader};

/// Parsed view of a complete metadata image. See [`metadata::MetadataReader`].
pub use metadata::MetadataReader;

/// Owned metadata image loaded from disk or memory. See [`file::MetadataFile`].
pub use file::MetadataFile;
