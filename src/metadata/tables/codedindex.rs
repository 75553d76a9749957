use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{handles::EntityHandle, tables::TableId},
    Result,
};

/// The coded index kinds of ECMA-335 II.24.2.6 and the Portable PDB format.
///
/// A coded index is a table reference that may point into one of several tables. The low
/// [`CodedIndexType::tag_bits`] bits select the table, the remaining bits hold the row id.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Any table a custom attribute can be attached to
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute, `MethodDef` or `MemberRef`
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
    /// Any table custom debug information can be attached to
    HasCustomDebugInformation,
}

const HAS_CUSTOM_ATTRIBUTE: [Option<TableId>; 22] = [
    Some(TableId::MethodDef),
    Some(TableId::Field),
    Some(TableId::TypeRef),
    Some(TableId::TypeDef),
    Some(TableId::Param),
    Some(TableId::InterfaceImpl),
    Some(TableId::MemberRef),
    Some(TableId::Module),
    // Labeled 'Permission' in the standard, no such table exists
    Some(TableId::DeclSecurity),
    Some(TableId::Property),
    Some(TableId::Event),
    Some(TableId::StandAloneSig),
    Some(TableId::ModuleRef),
    Some(TableId::TypeSpec),
    Some(TableId::Assembly),
    Some(TableId::AssemblyRef),
    Some(TableId::File),
    Some(TableId::ExportedType),
    Some(TableId::ManifestResource),
    Some(TableId::GenericParam),
    Some(TableId::GenericParamConstraint),
    Some(TableId::MethodSpec),
];

const HAS_CUSTOM_DEBUG_INFORMATION: [Option<TableId>; 27] = [
    Some(TableId::MethodDef),
    Some(TableId::Field),
    Some(TableId::TypeRef),
    Some(TableId::TypeDef),
    Some(TableId::Param),
    Some(TableId::InterfaceImpl),
    Some(TableId::MemberRef),
    Some(TableId::Module),
    Some(TableId::DeclSecurity),
    Some(TableId::Property),
    Some(TableId::Event),
    Some(TableId::StandAloneSig),
    Some(TableId::ModuleRef),
    Some(TableId::TypeSpec),
    Some(TableId::Assembly),
    Some(TableId::AssemblyRef),
    Some(TableId::File),
    Some(TableId::ExportedType),
    Some(TableId::ManifestResource),
    Some(TableId::GenericParam),
    Some(TableId::GenericParamConstraint),
    Some(TableId::MethodSpec),
    Some(TableId::Document),
    Some(TableId::LocalScope),
    Some(TableId::LocalVariable),
    Some(TableId::LocalConstant),
    Some(TableId::ImportScope),
];

impl CodedIndexType {
    /// Candidate tables, indexed by tag. `None` marks tags the format leaves unused.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &HAS_CUSTOM_ATTRIBUTE,
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
            CodedIndexType::HasCustomDebugInformation => &HAS_CUSTOM_DEBUG_INFORMATION,
        }
    }

    /// The tables this index can reference, without unused tags.
    pub fn candidates(&self) -> impl Iterator<Item = TableId> {
        self.tables().iter().flatten().copied()
    }

    /// Number of low bits holding the tag.
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        match self {
            CodedIndexType::HasFieldMarshal
            | CodedIndexType::HasSemantics
            | CodedIndexType::MethodDefOrRef
            | CodedIndexType::MemberForwarded
            | CodedIndexType::TypeOrMethodDef => 1,
            CodedIndexType::TypeDefOrRef
            | CodedIndexType::HasConstant
            | CodedIndexType::HasDeclSecurity
            | CodedIndexType::Implementation
            | CodedIndexType::ResolutionScope => 2,
            CodedIndexType::MemberRefParent | CodedIndexType::CustomAttributeType => 3,
            CodedIndexType::HasCustomAttribute | CodedIndexType::HasCustomDebugInformation => 5,
        }
    }

    /// Largest row count of every candidate table that still fits a 2-byte index.
    #[must_use]
    pub fn small_row_limit(&self) -> u32 {
        (1u32 << (16 - self.tag_bits())) - 1
    }

    /// Encode `handle` as a coded index value. A nil handle encodes as 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the handle's table is not a candidate of
    /// this coded index, or the handle is virtual.
    pub fn encode(&self, handle: EntityHandle) -> Result<u32> {
        if handle.is_nil() {
            return Ok(0);
        }
        if handle.is_virtual() {
            return Err(invalid_operation!(
                "virtual {:?} handle cannot be stored in a {:?} coded index",
                handle.table(),
                self
            ));
        }

        let Some(tag) = self
            .tables()
            .iter()
            .position(|candidate| *candidate == Some(handle.table()))
        else {
            return Err(invalid_operation!(
                "{:?} is not a valid {:?} target",
                handle.table(),
                self
            ));
        };

        #[allow(clippy::cast_possible_truncation)]
        Ok((handle.row_id() << self.tag_bits()) | tag as u32)
    }

    /// Decode a coded index value into the handle it references.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag selects an unused or missing table, or the
    /// row id exceeds 24 bits.
    pub fn decode(&self, value: u32) -> Result<EntityHandle> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;

        let Some(Some(table)) = self.tables().get(tag) else {
            return Err(malformed_error!(
                "Invalid {:?} coded index tag - {}",
                self,
                tag
            ));
        };

        EntityHandle::try_new(*table, row)
    }
}
