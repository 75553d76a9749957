use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::Error;

/// Identifier of a metadata table, equal to its bit position in the table-stream masks.
///
/// Covers the ECMA-335 type-system tables (`0x00..=0x2C`), including the `Ptr` indirection and
/// edit-and-continue tables, and the Portable PDB debug tables (`0x30..=0x37`). The numeric value
/// is also the table byte of a metadata token.
///
/// ## Reference
/// * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables
/// * [Portable PDB v1.0](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md) - Debug tables
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRVA = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOS = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOS = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
    Document = 0x30,
    MethodDebugInformation = 0x31,
    LocalScope = 0x32,
    LocalVariable = 0x33,
    LocalConstant = 0x34,
    ImportScope = 0x35,
    StateMachineMethod = 0x36,
    CustomDebugInformation = 0x37,
}

/// One slot per possible table bit, the size of per-table arrays.
pub const TABLE_SLOTS: usize = 64;

impl TableId {
    /// Map a table byte to its identifier.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        use TableId::*;
        const TYPE_SYSTEM: [TableId; 45] = [
            Module, TypeRef, TypeDef, FieldPtr, Field, MethodPtr, MethodDef, ParamPtr, Param,
            InterfaceImpl, MemberRef, Constant, CustomAttribute, FieldMarshal, DeclSecurity,
            ClassLayout, FieldLayout, StandAloneSig, EventMap, EventPtr, Event, PropertyMap,
            PropertyPtr, Property, MethodSemantics, MethodImpl, ModuleRef, TypeSpec, ImplMap,
            FieldRVA, EncLog, EncMap, Assembly, AssemblyProcessor, AssemblyOS, AssemblyRef,
            AssemblyRefProcessor, AssemblyRefOS, File, ExportedType, ManifestResource, NestedClass,
            GenericParam, MethodSpec, GenericParamConstraint,
        ];
        const DEBUG: [TableId; 8] = [
            Document, MethodDebugInformation, LocalScope, LocalVariable, LocalConstant,
            ImportScope, StateMachineMethod, CustomDebugInformation,
        ];

        match value {
            0x00..=0x2C => Some(TYPE_SYSTEM[value as usize]),
            0x30..=0x37 => Some(DEBUG[(value - 0x30) as usize]),
            _ => None,
        }
    }

    /// The bit of this table in the valid, sorted and external table masks.
    #[must_use]
    pub fn mask(self) -> TableMask {
        TableMask::from_bits_retain(1u64 << (self as u8))
    }

    /// Index of this table in per-table arrays of [`TABLE_SLOTS`] entries.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// True for the Portable PDB debug tables.
    #[must_use]
    pub fn is_debug(self) -> bool {
        TableMask::DEBUG.contains(self.mask())
    }

    /// True for the `Ptr` indirection tables of unoptimized metadata.
    #[must_use]
    pub fn is_ptr(self) -> bool {
        TableMask::PTR.contains(self.mask())
    }

    /// True for `EncLog` and `EncMap`.
    #[must_use]
    pub fn is_enc(self) -> bool {
        TableMask::ENC.contains(self.mask())
    }
}

impl TryFrom<u8> for TableId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TableId::from_u8(value).ok_or_else(|| malformed_error!("Unknown table id - {:#04x}", value))
    }
}

bitflags! {
    /// A 64-bit set of tables, one bit per [`TableId`].
    ///
    /// Used for the valid and sorted masks of the table-stream header and the external table mask
    /// of the `#Pdb` stream. Only group constants are named; single tables convert through
    /// [`TableId::mask`].
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct TableMask: u64 {
        /// Every type-system table, `Module` through `GenericParamConstraint`
        const TYPE_SYSTEM = 0x0000_1FFF_FFFF_FFFF;
        /// Every Portable PDB debug table
        const DEBUG = 0x00FF_0000_0000_0000;
        /// `FieldPtr`, `MethodPtr`, `ParamPtr`, `EventPtr` and `PropertyPtr`
        const PTR = 0x0000_0000_0048_00A8;
        /// `EncLog` and `EncMap`
        const ENC = 0x0000_0000_C000_0000;
        /// Type-system tables that ECMA-335 requires to be sorted
        const SORTED_TYPE_SYSTEM = 0x0000_1600_3301_FA00;
        /// Debug tables that the Portable PDB format requires to be sorted
        const SORTED_DEBUG = 0x00C4_0000_0000_0000;
        /// Tables a standalone PDB may reference in its external metadata
        const VALID_EXTERNAL = Self::TYPE_SYSTEM.bits() & !Self::PTR.bits() & !Self::ENC.bits();
        /// Every table that exists
        const ALL = Self::TYPE_SYSTEM.bits() | Self::DEBUG.bits();
    }
}

impl TableMask {
    /// Iterate the tables in this mask in ascending table order. Bits without a table are skipped.
    pub fn tables(self) -> impl Iterator<Item = TableId> {
        (0u8..64)
            .filter(move |bit| self.bits() & (1u64 << bit) != 0)
            .filter_map(TableId::from_u8)
    }
}

impl From<TableId> for TableMask {
    fn from(table: TableId) -> Self {
        table.mask()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn from_u8_round_trip() {
        for table in TableId::iter() {
            assert_eq!(TableId::from_u8(table as u8), Some(table));
        }
        assert_eq!(TableId::COUNT, 53);
        assert_eq!(TableId::from_u8(0x2D), None);
        assert_eq!(TableId::from_u8(0x38), None);
        assert!(TableId::try_from(0x3Fu8).is_err());
    }

    #[test]
    fn groups() {
        assert!(TableId::FieldPtr.is_ptr());
        assert!(TableId::PropertyPtr.is_ptr());
        assert!(TableId::EventPtr.is_ptr());
        assert!(!TableId::Field.is_ptr());
        assert!(TableId::EncMap.is_enc());
        assert!(TableId::LocalScope.is_debug());
        assert!(!TableId::GenericParamConstraint.is_debug());
        assert_eq!(TableMask::PTR.tables().count(), 5);
    }

    #[test]
    fn sorted_tables() {
        let sorted: Vec<TableId> = TableMask::SORTED_TYPE_SYSTEM.tables().collect();
        assert_eq!(
            sorted,
            [
                TableId::InterfaceImpl,
                TableId::Constant,
                TableId::CustomAttribute,
                TableId::FieldMarshal,
                TableId::DeclSecurity,
                TableId::ClassLayout,
                TableId::FieldLayout,
                TableId::MethodSemantics,
                TableId::MethodImpl,
                TableId::ImplMap,
                TableId::FieldRVA,
                TableId::NestedClass,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
            ]
        );

        let debug: Vec<TableId> = TableMask::SORTED_DEBUG.tables().collect();
        assert_eq!(
            debug,
            [
                TableId::LocalScope,
                TableId::StateMachineMethod,
                TableId::CustomDebugInformation
            ]
        );
    }

    #[test]
    fn external_mask() {
        assert!(TableMask::VALID_EXTERNAL.contains(TableId::TypeDef.mask()));
        assert!(!TableMask::VALID_EXTERNAL.contains(TableId::MethodPtr.mask()));
        assert!(!TableMask::VALID_EXTERNAL.contains(TableId::EncLog.mask()));
        assert!(!TableMask::VALID_EXTERNAL.contains(TableId::Document.mask()));
    }
}
