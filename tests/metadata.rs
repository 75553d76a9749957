//! Metadata round-trip integration tests.
//!
//! Builds metadata through [`MetadataBuilder`], serializes it with [`MetadataRootBuilder`] and
//! verifies the bytes through [`MetadataReader`].

use metascope::prelude::*;

fn type_ref(metadata: &mut MetadataBuilder, namespace: &str, name: &str) -> Result<EntityHandle> {
    let namespace = metadata.intern_string(namespace);
    let name = metadata.intern_string(name);
    metadata.add_row(
        TableId::TypeRef,
        vec![
            RowValue::Entity(EntityHandle::nil(TableId::Module)),
            RowValue::String(name),
            RowValue::String(namespace),
        ],
    )
}

fn serialize(metadata: MetadataBuilder) -> Result<Vec<u8>> {
    let mut out = BlobBuilder::new();
    MetadataRootBuilder::new(metadata, None, false)?.serialize(&mut out)?;
    out.to_vec()
}

#[test]
fn build_serialize_read() -> Result<()> {
    let mut metadata = MetadataBuilder::new();
    let mvid = uguid::guid!("6f2b4f0d-3c8e-4a4e-9a8a-0c6d7e1f2a3b");
    let module_name = metadata.intern_string("Sample.dll");
    let mvid_handle = metadata.intern_guid(mvid)?;
    metadata.add_row(
        TableId::Module,
        vec![
            RowValue::Int(0),
            RowValue::String(module_name),
            RowValue::Guid(mvid_handle),
            RowValue::Guid(GuidHandle::default()),
            RowValue::Guid(GuidHandle::default()),
        ],
    )?;
    type_ref(&mut metadata, "System", "Object")?;
    let signature = metadata.intern_blob(&[0x06, 0x08])?;
    let greeting = metadata.intern_user_string("Hello")?;
    metadata.add_row(TableId::StandAloneSig, vec![RowValue::Blob(signature)])?;

    let bytes = serialize(metadata)?;
    let reader = MetadataReader::read(&bytes)?;

    assert_eq!(reader.metadata_version(), "v4.0.30319");
    assert!(!reader.is_standalone_debug());
    assert!(!reader.is_minimal_delta());
    assert!(!reader.is_uncompressed());

    let names: Vec<_> = reader
        .root()
        .stream_headers
        .iter()
        .map(|header| header.name.as_str())
        .collect();
    assert_eq!(names, ["#~", "#Strings", "#US", "#GUID", "#Blob"]);

    let tables = reader.tables();
    assert_eq!(tables.row_count(TableId::Module), 1);
    assert_eq!(tables.row_count(TableId::TypeRef), 1);
    assert_eq!(tables.row_count(TableId::StandAloneSig), 1);

    let module = tables.table(TableId::Module).unwrap().row(1)?;
    assert_eq!(reader.strings().resolve(module.string(1)?)?, "Sample.dll");
    assert_eq!(reader.guids().resolve(module.guid(2)?)?, mvid);
    assert!(module.guid(3)?.is_nil());

    let object = tables.table(TableId::TypeRef).unwrap().row(1)?;
    assert_eq!(object.entity(0)?, EntityHandle::nil(TableId::Module));
    assert_eq!(reader.strings().resolve(object.string(1)?)?, "Object");
    assert_eq!(reader.strings().resolve(object.string(2)?)?, "System");

    let sig = tables.table(TableId::StandAloneSig).unwrap().row(1)?;
    assert_eq!(reader.blobs().resolve(sig.blob(0)?)?, [0x06, 0x08]);

    assert_eq!(reader.user_strings().resolve(greeting)?, "Hello");

    Ok(())
}

#[test]
fn string_heap_folds_suffixes() -> Result<()> {
    let mut metadata = MetadataBuilder::new();
    type_ref(&mut metadata, "BarFoo", "Foo")?;

    let bytes = serialize(metadata)?;
    let reader = MetadataReader::read(&bytes)?;

    let heap = reader.root().stream_data(&bytes, "#Strings").unwrap();
    assert_eq!(&heap[..8], b"\0BarFoo\0");
    assert!(heap[8..].iter().all(|&byte| byte == 0));

    let row = reader.tables().table(TableId::TypeRef).unwrap().row(1)?;
    assert_eq!(row.string(1)?.offset(), Some(4));
    assert_eq!(row.string(2)?.offset(), Some(1));
    assert_eq!(reader.strings().resolve(row.string(1)?)?, "Foo");

    Ok(())
}

#[test]
fn deterministic_output() -> Result<()> {
    let build = || -> Result<Vec<u8>> {
        let mut metadata = MetadataBuilder::new();
        for (namespace, name) in [("System", "Object"), ("System", "String"), ("A.B", "C")] {
            type_ref(&mut metadata, namespace, name)?;
        }
        serialize(metadata)
    };

    assert_eq!(build()?, build()?);
    Ok(())
}

#[test]
fn table_reference_boundary() {
    let mut rows = [0u32; TABLE_SLOTS];

    rows[TableId::TypeDef.index()] = 0xFFFF;
    let small = ReferenceSizes::new(&rows, HeapSizeFlags::empty());
    assert_eq!(small.table_size(TableId::TypeDef), 2);

    rows[TableId::TypeDef.index()] = 0x1_0000;
    let large = ReferenceSizes::new(&rows, HeapSizeFlags::empty());
    assert_eq!(large.table_size(TableId::TypeDef), 4);
    assert_eq!(large.table_size(TableId::MethodDef), 2);
}

#[test]
fn coded_index_boundary() {
    assert_eq!(CodedIndexType::TypeOrMethodDef.tag_bits(), 1);
    assert_eq!(CodedIndexType::TypeOrMethodDef.small_row_limit(), 32767);

    let mut rows = [0u32; TABLE_SLOTS];
    rows[TableId::MethodDef.index()] = 32767;
    let small = ReferenceSizes::new(&rows, HeapSizeFlags::empty());
    assert_eq!(small.coded_index_size(CodedIndexType::TypeOrMethodDef), 2);

    rows[TableId::MethodDef.index()] = 32768;
    let large = ReferenceSizes::new(&rows, HeapSizeFlags::empty());
    assert_eq!(large.coded_index_size(CodedIndexType::TypeOrMethodDef), 4);
    assert_eq!(large.table_size(TableId::MethodDef), 2);

    rows[TableId::MethodDef.index()] = 0;
    rows[TableId::TypeDef.index()] = 0xFFFF;
    let one_large = ReferenceSizes::new(&rows, HeapSizeFlags::empty());
    assert_eq!(one_large.table_size(TableId::TypeDef), 2);
    assert_eq!(one_large.coded_index_size(CodedIndexType::TypeOrMethodDef), 4);
}

#[test]
fn heap_reference_boundary() {
    let rows = [0u32; TABLE_SLOTS];
    let mut heaps = [0usize; 4];

    heaps[HeapIndex::String.index()] = 0xFFFF;
    let small = MetadataSizes::new(&rows, &rows, heaps, "v4.0.30319", false);
    assert_eq!(small.references().heap_size(HeapIndex::String), 2);

    heaps[HeapIndex::String.index()] = 0x1_0000;
    let large = MetadataSizes::new(&rows, &rows, heaps, "v4.0.30319", false);
    assert_eq!(large.references().heap_size(HeapIndex::String), 4);
    assert!(large
        .references()
        .heap_flags()
        .contains(HeapSizeFlags::STRING_LARGE));
    assert_eq!(large.references().heap_size(HeapIndex::Blob), 2);
}

#[test]
fn enc_delta_uses_large_references() -> Result<()> {
    let mut metadata = MetadataBuilder::new();
    metadata.add_row(
        TableId::EncLog,
        vec![RowValue::Int(0x0600_0001), RowValue::Int(0)],
    )?;

    let bytes = serialize(metadata)?;
    let reader = MetadataReader::read(&bytes)?;

    assert!(reader.tables().is_enc_delta());
    assert!(reader.tables().references().is_enc_delta());
    assert_eq!(reader.tables().references().table_size(TableId::TypeDef), 4);
    assert_eq!(reader.tables().references().heap_size(HeapIndex::String), 4);
    assert_eq!(reader.tables().heap_flags.bits(), 0xA7);
    assert_eq!(reader.root().stream_headers[0].name, "#-");
    assert_eq!(reader.root().stream_headers.last().unwrap().name, "#JTD");
    assert!(reader.is_minimal_delta());
    assert!(reader.is_uncompressed());

    Ok(())
}

#[test]
fn handles_nil_and_virtual() -> Result<()> {
    let nil = EntityHandle::nil(TableId::TypeDef);
    assert!(nil.is_nil());
    assert!(!nil.is_virtual());
    assert_eq!(nil.to_token(), 0x0200_0000);

    let real = EntityHandle::from_token(0x0600_002A)?;
    assert_eq!(real.table(), TableId::MethodDef);
    assert_eq!(real.row_id(), 0x2A);
    assert_eq!(real.value(), HandleValue::Real(0x2A));

    let synthesized = EntityHandle::virtual_handle(TableId::TypeDef, 7);
    assert!(synthesized.is_virtual());
    assert_eq!(synthesized.value(), HandleValue::Virtual(7));
    assert_ne!(synthesized, EntityHandle::new(TableId::TypeDef, 7));

    let generic: Handle = real.into();
    assert_eq!(EntityHandle::try_from(generic)?, real);
    assert!(matches!(
        StringHandle::try_from(generic),
        Err(Error::InvalidOperation(_))
    ));

    assert!(StringHandle::from_virtual_index(3).is_virtual());
    assert!(StringHandle::default().is_nil());
    assert!(BlobHandle::from_offset(0).is_nil());

    Ok(())
}

#[test]
fn unsorted_tables_are_rejected() -> Result<()> {
    let build = || -> Result<MetadataBuilder> {
        let mut metadata = MetadataBuilder::new();
        for (nested, enclosing) in [(3, 1), (2, 1)] {
            metadata.add_row(
                TableId::NestedClass,
                vec![
                    RowValue::Entity(EntityHandle::new(TableId::TypeDef, nested)),
                    RowValue::Entity(EntityHandle::new(TableId::TypeDef, enclosing)),
                ],
            )?;
        }
        Ok(metadata)
    };

    assert!(matches!(
        MetadataRootBuilder::new(build()?, None, false),
        Err(Error::InvalidOperation(_))
    ));

    let root = MetadataRootBuilder::new(build()?, None, true)?;
    let mut out = BlobBuilder::new();
    root.serialize(&mut out)?;
    let bytes = out.to_vec()?;
    assert_eq!(
        MetadataReader::read(&bytes)?
            .tables()
            .row_count(TableId::NestedClass),
        2
    );

    Ok(())
}

#[test]
fn malformed_images() {
    assert!(MetadataReader::read(&[]).is_err());
    assert!(MetadataReader::read(b"BSJA\x01\x00\x01\x00\x00\x00\x00\x00").is_err());

    let mut out = BlobBuilder::new();
    MetadataRootBuilder::new(MetadataBuilder::new(), None, false)
        .unwrap()
        .serialize(&mut out)
        .unwrap();
    let bytes = out.to_vec().unwrap();
    for length in [4, 16, 32, bytes.len() - 1] {
        assert!(MetadataReader::read(&bytes[..length]).is_err());
    }
}
