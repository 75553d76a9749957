//! Portable PDB integration tests.
//!
//! Writes standalone debug metadata with [`PortablePdbBuilder`] and loads it back through
//! [`MetadataFile`].

use metascope::prelude::*;

fn type_system() -> [u32; TABLE_SLOTS] {
    let mut rows = [0u32; TABLE_SLOTS];
    rows[TableId::TypeDef.index()] = 12;
    rows[TableId::MethodDef.index()] = 40;
    rows
}

fn document(metadata: &mut MetadataBuilder, path: &str) -> Result<EntityHandle> {
    let name = metadata.intern_document_name(path)?;
    let csharp = metadata.intern_guid(uguid::guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1"))?;
    let sha256 = metadata.intern_guid(uguid::guid!("8829d00f-11b8-4213-878b-770e8597ac16"))?;
    let hash = metadata.intern_blob(&[0xAA; 32])?;
    metadata.add_row(
        TableId::Document,
        vec![
            RowValue::Blob(name),
            RowValue::Guid(sha256),
            RowValue::Blob(hash),
            RowValue::Guid(csharp),
        ],
    )
}

fn build_pdb() -> Result<(Vec<u8>, ContentId)> {
    let mut metadata = MetadataBuilder::new();
    let program = document(&mut metadata, "/src/app/Program.cs")?;
    document(&mut metadata, "C:\\src\\app\\Util.cs")?;

    for _ in 0..3 {
        metadata.add_row(
            TableId::MethodDebugInformation,
            vec![
                RowValue::Entity(program),
                RowValue::Blob(BlobHandle::default()),
            ],
        )?;
    }

    let pdb = PortablePdbBuilder::new(
        metadata,
        &type_system(),
        EntityHandle::new(TableId::MethodDef, 1),
    )?;

    let mut out = BlobBuilder::new();
    let id = pdb.serialize(&mut out)?;
    Ok((out.to_vec()?, id))
}

fn document_name(reader: &MetadataReader<'_>, row: u32) -> Result<String> {
    let document = reader.tables().table(TableId::Document).unwrap().row(row)?;
    let mut blob = BlobReader::new(reader.blobs().resolve(document.blob(0)?)?);

    let separator = char::from(blob.read_le::<u8>()?);
    let mut parts = Vec::new();
    while blob.has_more_data() {
        let part = blob.read_compressed_integer()?;
        parts.push(String::from_utf8(
            reader.blobs().get(part as usize)?.to_vec(),
        )
        .map_err(|error| Error::Error(error.to_string()))?);
    }
    Ok(parts.join(&separator.to_string()))
}

#[test]
fn pdb_round_trip() -> Result<()> {
    let (bytes, id) = build_pdb()?;
    let file = MetadataFile::from_mem(bytes)?;

    assert!(file.is_standalone_debug());
    assert_eq!(file.pdb_id(), Some(id.to_bytes()));
    assert_eq!(id.stamp & 0x8000_0000, 0x8000_0000);
    assert_eq!(id.to_bytes()[7] & 0xF0, 0x40);

    file.with_reader(|reader| -> Result<()> {
        assert_eq!(reader.metadata_version(), "PDB v1.0");
        assert_eq!(reader.root().stream_headers[0].name, "#Pdb");

        let pdb = reader.pdb().unwrap();
        assert_eq!(pdb.entry_point, EntityHandle::new(TableId::MethodDef, 1));
        assert_eq!(pdb.external_row_counts[TableId::MethodDef.index()], 40);
        assert_eq!(
            pdb.referenced_tables,
            TableId::TypeDef.mask() | TableId::MethodDef.mask()
        );

        assert_eq!(reader.tables().row_count(TableId::Document), 2);
        assert_eq!(reader.tables().row_count(TableId::MethodDebugInformation), 3);
        assert_eq!(reader.tables().row_count(TableId::MethodDef), 0);

        assert_eq!(document_name(reader, 1)?, "/src/app/Program.cs");
        assert_eq!(document_name(reader, 2)?, "C:\\src\\app\\Util.cs");

        let info = reader
            .tables()
            .table(TableId::MethodDebugInformation)
            .unwrap()
            .row(2)?;
        assert_eq!(info.entity(0)?, EntityHandle::new(TableId::Document, 1));

        Ok(())
    })?;

    Ok(())
}

#[test]
fn pdb_id_is_deterministic() -> Result<()> {
    let (first_bytes, first_id) = build_pdb()?;
    let (second_bytes, second_id) = build_pdb()?;

    assert_eq!(first_id, second_id);
    assert_eq!(first_bytes, second_bytes);
    Ok(())
}

#[test]
fn pdb_from_file() -> Result<()> {
    let (bytes, id) = build_pdb()?;
    let path = std::env::temp_dir().join(format!("metascope_pdb_{}.pdb", std::process::id()));
    std::fs::write(&path, &bytes)?;

    let file = MetadataFile::from_file(&path)?;
    assert_eq!(file.len(), bytes.len());
    assert_eq!(file.pdb_id(), Some(id.to_bytes()));
    drop(file);

    std::fs::remove_file(&path)?;
    Ok(())
}
