//! Column layout of every metadata table.
//!
//! Each table is a fixed sequence of columns. A column is either a constant-width integer, a
//! reference into a single table, a coded index into one of several tables, or a reference into
//! one of the heaps. The byte width of the last three kinds depends on the row counts and heap
//! sizes of the image and is resolved by [`crate::metadata::sizes::ReferenceSizes`].
//!
//! # Reference
//! * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)
//! * [Portable PDB v1.0](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md)

use crate::metadata::{
    sizes::HeapIndex,
    tables::{CodedIndexType, TableId},
};

/// A single column of a metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Integer of the given byte width (1, 2 or 4)
    Fixed(u8),
    /// Row id into the given table
    Table(TableId),
    /// Coded index of the given kind
    Coded(CodedIndexType),
    /// Offset into a heap, or a 1-based index for `#GUID`
    Heap(HeapIndex),
}

/// A column participating in a table's sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Column index within the row
    pub column: usize,
    /// True if this key is sorted in descending order
    pub descending: bool,
}

/// Required ordering of a sorted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    /// Keys, most significant first
    pub keys: &'static [SortKey],
    /// True if two rows may not share the same key
    pub unique: bool,
}

const fn asc(column: usize) -> SortKey {
    SortKey {
        column,
        descending: false,
    }
}

const fn desc(column: usize) -> SortKey {
    SortKey {
        column,
        descending: true,
    }
}

const U8: Column = Column::Fixed(1);
const U16: Column = Column::Fixed(2);
const U32: Column = Column::Fixed(4);
const STRING: Column = Column::Heap(HeapIndex::String);
const BLOB: Column = Column::Heap(HeapIndex::Blob);
const GUID: Column = Column::Heap(HeapIndex::Guid);

const fn table(id: TableId) -> Column {
    Column::Table(id)
}

const fn coded(kind: CodedIndexType) -> Column {
    Column::Coded(kind)
}

impl TableId {
    /// The columns of a row of this table, in storage order.
    #[must_use]
    #[rustfmt::skip]
    pub fn columns(self) -> &'static [Column] {
        use CodedIndexType as C;
        use TableId as T;

        match self {
            T::Module => const { &[U16, STRING, GUID, GUID, GUID] },
            T::TypeRef => const { &[coded(C::ResolutionScope), STRING, STRING] },
            T::TypeDef => const { &[U32, STRING, STRING, coded(C::TypeDefOrRef), table(T::Field), table(T::MethodDef)] },
            T::FieldPtr => const { &[table(T::Field)] },
            T::Field => const { &[U16, STRING, BLOB] },
            T::MethodPtr => const { &[table(T::MethodDef)] },
            T::MethodDef => const { &[U32, U16, U16, STRING, BLOB, table(T::Param)] },
            T::ParamPtr => const { &[table(T::Param)] },
            T::Param => const { &[U16, U16, STRING] },
            T::InterfaceImpl => const { &[table(T::TypeDef), coded(C::TypeDefOrRef)] },
            T::MemberRef => const { &[coded(C::MemberRefParent), STRING, BLOB] },
            T::Constant => const { &[U8, U8, coded(C::HasConstant), BLOB] },
            T::CustomAttribute => const { &[coded(C::HasCustomAttribute), coded(C::CustomAttributeType), BLOB] },
            T::FieldMarshal => const { &[coded(C::HasFieldMarshal), BLOB] },
            T::DeclSecurity => const { &[U16, coded(C::HasDeclSecurity), BLOB] },
            T::ClassLayout => const { &[U16, U32, table(T::TypeDef)] },
            T::FieldLayout => const { &[U32, table(T::Field)] },
            T::StandAloneSig => const { &[BLOB] },
            T::EventMap => const { &[table(T::TypeDef), table(T::Event)] },
            T::EventPtr => const { &[table(T::Event)] },
            T::Event => const { &[U16, STRING, coded(C::TypeDefOrRef)] },
            T::PropertyMap => const { &[table(T::TypeDef), table(T::Property)] },
            T::PropertyPtr => const { &[table(T::Property)] },
            T::Property => const { &[U16, STRING, BLOB] },
            T::MethodSemantics => const { &[U16, table(T::MethodDef), coded(C::HasSemantics)] },
            T::MethodImpl => const { &[table(T::TypeDef), coded(C::MethodDefOrRef), coded(C::MethodDefOrRef)] },
            T::ModuleRef => const { &[STRING] },
            T::TypeSpec => const { &[BLOB] },
            T::ImplMap => const { &[U16, coded(C::MemberForwarded), STRING, table(T::ModuleRef)] },
            T::FieldRVA => const { &[U32, table(T::Field)] },
            T::EncLog => const { &[U32, U32] },
            T::EncMap => const { &[U32] },
            T::Assembly => const { &[U32, U16, U16, U16, U16, U32, BLOB, STRING, STRING] },
            T::AssemblyProcessor => const { &[U32] },
            T::AssemblyOS => const { &[U32, U32, U32] },
            T::AssemblyRef => const { &[U16, U16, U16, U16, U32, BLOB, STRING, STRING, BLOB] },
            T::AssemblyRefProcessor => const { &[U32, table(T::AssemblyRef)] },
            T::AssemblyRefOS => const { &[U32, U32, U32, table(T::AssemblyRef)] },
            T::File => const { &[U32, STRING, BLOB] },
            T::ExportedType => const { &[U32, U32, STRING, STRING, coded(C::Implementation)] },
            T::ManifestResource => const { &[U32, U32, STRING, coded(C::Implementation)] },
            T::NestedClass => const { &[table(T::TypeDef), table(T::TypeDef)] },
            T::GenericParam => const { &[U16, U16, coded(C::TypeOrMethodDef), STRING] },
            T::MethodSpec => const { &[coded(C::MethodDefOrRef), BLOB] },
            T::GenericParamConstraint => const { &[table(T::GenericParam), coded(C::TypeDefOrRef)] },
            T::Document => const { &[BLOB, GUID, BLOB, GUID] },
            T::MethodDebugInformation => const { &[table(T::Document), BLOB] },
            T::LocalScope => const { &[table(T::MethodDef), table(T::ImportScope), table(T::LocalVariable), table(T::LocalConstant), U32, U32] },
            T::LocalVariable => const { &[U16, U16, STRING] },
            T::LocalConstant => const { &[STRING, BLOB] },
            T::ImportScope => const { &[table(T::ImportScope), BLOB] },
            T::StateMachineMethod => const { &[table(T::MethodDef), table(T::MethodDef)] },
            T::CustomDebugInformation => const { &[coded(C::HasCustomDebugInformation), GUID, BLOB] },
        }
    }

    /// The ordering rows of this table must follow, `None` for unsorted tables.
    #[must_use]
    pub fn sort_order(self) -> Option<SortOrder> {
        const fn order(keys: &'static [SortKey], unique: bool) -> Option<SortOrder> {
            Some(SortOrder { keys, unique })
        }

        match self {
            TableId::InterfaceImpl => order(const { &[asc(0), asc(1)] }, true),
            TableId::FieldMarshal | TableId::NestedClass | TableId::StateMachineMethod => {
                order(const { &[asc(0)] }, true)
            }
            TableId::CustomAttribute
            | TableId::CustomDebugInformation
            | TableId::MethodImpl
            | TableId::GenericParamConstraint => order(const { &[asc(0)] }, false),
            TableId::ImplMap | TableId::FieldLayout | TableId::FieldRVA => {
                order(const { &[asc(1)] }, true)
            }
            TableId::DeclSecurity => order(const { &[asc(1)] }, false),
            TableId::Constant | TableId::ClassLayout => order(const { &[asc(2)] }, true),
            TableId::MethodSemantics => order(const { &[asc(2)] }, false),
            TableId::GenericParam => order(const { &[asc(2), asc(1)] }, true),
            TableId::LocalScope => order(const { &[asc(0), asc(4), desc(5)] }, false),
            _ => None,
        }
    }
}
