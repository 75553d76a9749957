//! Bit layout of metadata handles.
//!
//! Every reference into metadata, whether to a table row or into a heap, is a 32-bit value:
//!
//! ```text
//!  31 30      24 23                     0
//! +--+----------+------------------------+
//! |V |   kind   |        row id          |   entity handle (24-bit row id)
//! +--+--+-------+------------------------+
//! |V |ST|          heap offset           |   heap handle (29-bit offset)
//! +--+--+--------------------------------+
//! ```
//!
//! `V` marks a virtual handle, one that is not backed by a real row or heap offset (projected
//! WinRT entities, strings whose offset is only known after serialization). `ST` is the string
//! sub-kind bit and only meaningful for [`StringHandle`].
//!
//! The packed value is what travels through tables and tokens. At the API surface the payload is
//! exposed as [`HandleValue`], which makes the real/virtual distinction explicit, and the kind as
//! [`HandleKind`]. Typed handles ([`EntityHandle`], [`StringHandle`], [`BlobHandle`],
//! [`GuidHandle`], [`UserStringHandle`], [`NamespaceHandle`]) convert into the general
//! [`Handle`] and back; converting back validates the kind.
//!
//! Constructing a handle whose payload does not fit its width is a programming error and is
//! caught by debug assertions: it would require a table with more than 2^24 rows or a heap larger
//! than 512 MiB.
//!
//! # Examples
//!
//! ```rust
//! use metascope::metadata::handles::{EntityHandle, Handle, HandleKind, HandleValue};
//! use metascope::metadata::tables::TableId;
//!
//! let method = EntityHandle::new(TableId::MethodDef, 7);
//! assert_eq!(method.to_token(), 0x0600_0007);
//!
//! let handle = Handle::from(method);
//! assert_eq!(handle.kind(), HandleKind::Entity(TableId::MethodDef));
//! assert_eq!(handle.value(), HandleValue::Real(7));
//! assert!(EntityHandle::nil(TableId::TypeDef).is_nil());
//! ```

use std::fmt;

use crate::{metadata::tables::TableId, Error, Result};

/// Marks a handle as virtual.
pub const VIRTUAL_BIT: u32 = 0x8000_0000;
/// Kind bits of a token.
pub const TYPE_MASK: u32 = 0x7F00_0000;
/// Row id bits of an entity handle.
pub const RID_MASK: u32 = 0x00FF_FFFF;
/// Offset bits of a heap handle.
pub const OFFSET_MASK: u32 = (1 << 29) - 1;

const STRING_SUBKIND_BIT: u32 = 0x2000_0000;

const VIRTUAL_TYPE_BIT: u8 = 0x80;
const USER_STRING_TYPE: u8 = 0x70;
const BLOB_TYPE: u8 = 0x71;
const GUID_TYPE: u8 = 0x72;
const STRING_TYPE: u8 = 0x78;
const STRING_TYPE_MASK: u8 = 0x7C;
const NAMESPACE_TYPE: u8 = 0x7C;

/// Payload of a handle as seen at the API boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HandleValue {
    /// Row id or heap offset backed by actual metadata
    Real(u32),
    /// Index of a synthesized entity or of a not yet serialized heap entry
    Virtual(u32),
}

impl HandleValue {
    fn pack(self, mask: u32) -> u32 {
        match self {
            HandleValue::Real(value) => {
                debug_assert!(value <= mask, "handle payload {value:#x} exceeds {mask:#x}");
                value & mask
            }
            HandleValue::Virtual(index) => {
                debug_assert!(index <= mask, "virtual index {index:#x} exceeds {mask:#x}");
                VIRTUAL_BIT | (index & mask)
            }
        }
    }

    /// The row id, offset or virtual index without the real/virtual distinction.
    #[must_use]
    pub fn payload(self) -> u32 {
        match self {
            HandleValue::Real(value) | HandleValue::Virtual(value) => value,
        }
    }

    fn unpack(packed: u32, mask: u32) -> Self {
        if packed & VIRTUAL_BIT != 0 {
            HandleValue::Virtual(packed & mask)
        } else {
            HandleValue::Real(packed & mask)
        }
    }
}

/// What a handle refers to. String sub-kinds are never observable here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HandleKind {
    /// A row of a metadata table
    Entity(TableId),
    /// An entry of the `#US` heap
    UserString,
    /// An entry of the `#Blob` heap
    Blob,
    /// An entry of the `#GUID` heap
    Guid,
    /// An entry of the `#Strings` heap
    String,
    /// A namespace definition
    Namespace,
}

/// Type-erased handle of any kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    vtype: u8,
    value: u32,
}

impl Handle {
    fn new(kind: u8, value: HandleValue, mask: u32) -> Self {
        let virtual_bit = if matches!(value, HandleValue::Virtual(_)) {
            VIRTUAL_TYPE_BIT
        } else {
            0
        };

        Handle {
            vtype: kind | virtual_bit,
            value: value.pack(mask) & !VIRTUAL_BIT,
        }
    }

    /// What this handle refers to.
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        let kind = self.vtype & !VIRTUAL_TYPE_BIT;
        match kind {
            USER_STRING_TYPE => HandleKind::UserString,
            BLOB_TYPE => HandleKind::Blob,
            GUID_TYPE => HandleKind::Guid,
            NAMESPACE_TYPE => HandleKind::Namespace,
            _ if kind & STRING_TYPE_MASK == STRING_TYPE => HandleKind::String,
            // Entity handles are only created from a valid TableId
            _ => TableId::from_u8(kind).map_or(HandleKind::Namespace, HandleKind::Entity),
        }
    }

    /// Row id, heap offset or virtual index.
    #[must_use]
    pub fn value(&self) -> HandleValue {
        let mask = match self.kind() {
            HandleKind::Entity(_) => RID_MASK,
            _ => OFFSET_MASK,
        };

        if self.is_virtual() {
            HandleValue::Virtual(self.value & mask)
        } else {
            HandleValue::Real(self.value & mask)
        }
    }

    /// True for virtual handles.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.vtype & VIRTUAL_TYPE_BIT != 0
    }

    /// True if the payload is zero and the handle is not virtual.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        !self.is_virtual() && self.value & OFFSET_MASK == 0
    }

    fn mismatch(&self, expected: &str) -> Error {
        invalid_operation!("{:?} handle cannot be converted to {}", self.kind(), expected)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?}, {:?})", self.kind(), self.value())
    }
}

/// Reference to a metadata table row.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    table: TableId,
    packed: u32,
}

impl EntityHandle {
    /// Handle of row `row_id` of `table`.
    #[must_use]
    pub fn new(table: TableId, row_id: u32) -> Self {
        EntityHandle {
            table,
            packed: HandleValue::Real(row_id).pack(RID_MASK),
        }
    }

    /// Like [`EntityHandle::new`], for row ids read from untrusted input.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `row_id` exceeds 24 bits.
    pub fn try_new(table: TableId, row_id: u32) -> Result<Self> {
        if row_id > RID_MASK {
            return Err(malformed_error!(
                "Row id {:#x} of {:?} exceeds 24 bits",
                row_id,
                table
            ));
        }
        Ok(Self::new(table, row_id))
    }

    /// The nil handle of `table`.
    #[must_use]
    pub fn nil(table: TableId) -> Self {
        Self::new(table, 0)
    }

    /// A virtual handle of `table`. Never nil.
    #[must_use]
    pub fn virtual_handle(table: TableId, index: u32) -> Self {
        EntityHandle {
            table,
            packed: HandleValue::Virtual(index).pack(RID_MASK),
        }
    }

    /// Decode a metadata token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token names an unknown table.
    pub fn from_token(token: u32) -> Result<Self> {
        #[allow(clippy::cast_possible_truncation)]
        let table = TableId::try_from(((token & TYPE_MASK) >> 24) as u8)?;
        Ok(EntityHandle {
            table,
            packed: token & (VIRTUAL_BIT | RID_MASK),
        })
    }

    /// Encode as a metadata token: table byte, row id and, for virtual handles, the virtual bit.
    #[must_use]
    pub fn to_token(&self) -> u32 {
        (self.packed & VIRTUAL_BIT) | (u32::from(self.table as u8) << 24) | (self.packed & RID_MASK)
    }

    /// The referenced table.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Row id, or the virtual index for virtual handles.
    #[must_use]
    pub fn row_id(&self) -> u32 {
        self.packed & RID_MASK
    }

    /// Payload with the real/virtual distinction.
    #[must_use]
    pub fn value(&self) -> HandleValue {
        HandleValue::unpack(self.packed, RID_MASK)
    }

    /// True for virtual handles.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.packed & VIRTUAL_BIT != 0
    }

    /// True for row id 0 of a non-virtual handle.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.packed == 0
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.table, self.value())
    }
}

impl From<EntityHandle> for Handle {
    fn from(handle: EntityHandle) -> Self {
        Handle::new(handle.table as u8, handle.value(), RID_MASK)
    }
}

impl TryFrom<Handle> for EntityHandle {
    type Error = Error;

    fn try_from(handle: Handle) -> Result<Self> {
        match (handle.kind(), handle.value()) {
            (HandleKind::Entity(table), HandleValue::Real(row)) => Ok(Self::new(table, row)),
            (HandleKind::Entity(table), HandleValue::Virtual(index)) => {
                Ok(Self::virtual_handle(table, index))
            }
            _ => Err(handle.mismatch("EntityHandle")),
        }
    }
}

/// How a `#Strings` reference is to be interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StringKind {
    /// NUL-terminated string at the offset
    Plain,
    /// The string at the offset, cut at its last `.`
    DotTerminated,
    /// Synthesized string, or a string interned but not yet serialized
    Virtual,
    /// The string at the offset with a WinRT projection prefix
    WinRtPrefixed,
}

/// Reference into the `#Strings` heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StringHandle(u32);

impl StringHandle {
    /// Plain string at heap offset `offset`.
    #[must_use]
    pub fn from_offset(offset: u32) -> Self {
        StringHandle(HandleValue::Real(offset).pack(OFFSET_MASK))
    }

    /// The prefix of the string at `offset` up to its last `.`.
    #[must_use]
    pub fn dot_terminated(offset: u32) -> Self {
        StringHandle(STRING_SUBKIND_BIT | HandleValue::Real(offset).pack(OFFSET_MASK))
    }

    /// Virtual string number `index`.
    #[must_use]
    pub fn from_virtual_index(index: u32) -> Self {
        StringHandle(HandleValue::Virtual(index).pack(OFFSET_MASK))
    }

    /// The string at `offset` with a WinRT prefix. Virtual, as the result exists in no heap.
    #[must_use]
    pub fn winrt_prefixed(offset: u32) -> Self {
        StringHandle(STRING_SUBKIND_BIT | HandleValue::Virtual(offset).pack(OFFSET_MASK))
    }

    /// Sub-kind of this reference.
    #[must_use]
    pub fn kind(&self) -> StringKind {
        match (self.is_virtual(), self.0 & STRING_SUBKIND_BIT != 0) {
            (false, false) => StringKind::Plain,
            (false, true) => StringKind::DotTerminated,
            (true, false) => StringKind::Virtual,
            (true, true) => StringKind::WinRtPrefixed,
        }
    }

    /// Heap offset, `None` for virtual strings.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        match self.value() {
            HandleValue::Real(offset) => Some(offset),
            HandleValue::Virtual(_) => None,
        }
    }

    /// Payload with the real/virtual distinction.
    #[must_use]
    pub fn value(&self) -> HandleValue {
        HandleValue::unpack(self.0, OFFSET_MASK)
    }

    /// True for virtual strings.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.0 & VIRTUAL_BIT != 0
    }

    /// True for the empty string at offset 0.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for StringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringHandle({:?}, {:?})", self.kind(), self.value())
    }
}

impl From<StringHandle> for Handle {
    fn from(handle: StringHandle) -> Self {
        let subkind = u8::from(handle.0 & STRING_SUBKIND_BIT != 0);
        Handle::new(STRING_TYPE | subkind, handle.value(), OFFSET_MASK)
    }
}

impl TryFrom<Handle> for StringHandle {
    type Error = Error;

    fn try_from(handle: Handle) -> Result<Self> {
        if handle.kind() != HandleKind::String {
            return Err(handle.mismatch("StringHandle"));
        }

        let subkind = if handle.vtype & 1 != 0 {
            STRING_SUBKIND_BIT
        } else {
            0
        };
        Ok(StringHandle(subkind | handle.value().pack(OFFSET_MASK)))
    }
}

macro_rules! heap_handle {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $variant:ident, $mask:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(u32);

        impl $name {
            /// Handle of the entry at heap offset (or index) `offset`.
            #[must_use]
            pub fn from_offset(offset: u32) -> Self {
                $name(HandleValue::Real(offset).pack($mask))
            }

            /// Heap offset (or index), `None` for virtual handles.
            #[must_use]
            pub fn offset(&self) -> Option<u32> {
                match self.value() {
                    HandleValue::Real(offset) => Some(offset),
                    HandleValue::Virtual(_) => None,
                }
            }

            /// Payload with the real/virtual distinction.
            #[must_use]
            pub fn value(&self) -> HandleValue {
                HandleValue::unpack(self.0, $mask)
            }

            /// True for virtual handles.
            #[must_use]
            pub fn is_virtual(&self) -> bool {
                self.0 & VIRTUAL_BIT != 0
            }

            /// True for offset 0 of a non-virtual handle.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.value())
            }
        }

        impl From<$name> for Handle {
            fn from(handle: $name) -> Self {
                Handle::new($kind, handle.value(), $mask)
            }
        }

        impl TryFrom<Handle> for $name {
            type Error = Error;

            fn try_from(handle: Handle) -> Result<Self> {
                if handle.kind() != HandleKind::$variant {
                    return Err(handle.mismatch(stringify!($name)));
                }
                Ok($name(handle.value().pack($mask)))
            }
        }
    };
}

heap_handle!(
    /// Reference into the `#Blob` heap.
    BlobHandle,
    BLOB_TYPE,
    Blob,
    OFFSET_MASK
);

heap_handle!(
    /// Reference into the `#GUID` heap. The offset is a 1-based index of 16-byte entries.
    GuidHandle,
    GUID_TYPE,
    Guid,
    OFFSET_MASK
);

heap_handle!(
    /// Reference into the `#US` heap. Tokens limit user string offsets to 24 bits.
    UserStringHandle,
    USER_STRING_TYPE,
    UserString,
    RID_MASK
);

heap_handle!(
    /// Namespace definition, identified by the `#Strings` offset of its full name.
    NamespaceHandle,
    NAMESPACE_TYPE,
    Namespace,
    OFFSET_MASK
);

impl BlobHandle {
    /// Virtual blob number `index`.
    #[must_use]
    pub fn from_virtual_index(index: u32) -> Self {
        BlobHandle(HandleValue::Virtual(index).pack(OFFSET_MASK))
    }
}

impl NamespaceHandle {
    /// Synthesized namespace number `index`.
    #[must_use]
    pub fn from_virtual_index(index: u32) -> Self {
        NamespaceHandle(HandleValue::Virtual(index).pack(OFFSET_MASK))
    }
}

impl UserStringHandle {
    /// The `#US` metadata token of this handle (table byte `0x70`).
    #[must_use]
    pub fn to_token(&self) -> u32 {
        (u32::from(USER_STRING_TYPE) << 24) | (self.0 & RID_MASK)
    }
}
