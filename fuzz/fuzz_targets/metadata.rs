#![no_main]

use libfuzzer_sys::fuzz_target;
use metascope::MetadataReader;

fuzz_target!(|data: &[u8]| {
    if let Ok(reader) = MetadataReader::read(data) {
        let tables = reader.tables();
        for id in tables.valid.tables() {
            let Some(table) = tables.table(id) else {
                continue;
            };
            for row in table.iter() {
                for column in 0..id.columns().len() {
                    let _ = row.column(column);
                }
            }
        }
    }
});
