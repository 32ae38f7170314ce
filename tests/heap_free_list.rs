use tabular_engine::{Field, FieldType, HeapFile, Record, Schema, Value};
use test_log::test;

// 4 (id) + 24 (name) + 4 (next) = 32 bytes per record
fn schema() -> Schema {
    Schema::new(
        "items",
        vec![
            Field::new("id", FieldType::I32),
            Field::new("name", FieldType::Str(24)),
        ],
        "id",
    )
    .expect("valid schema")
}

fn record(schema: &Schema, id: i32) -> Record {
    Record::new(schema, vec![Value::I32(id), Value::Str(format!("rec-{id}"))])
        .expect("schema-conformant")
}

#[test]
fn heap_reuses_freed_slots_lifo() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let schema = schema();
    assert_eq!(32, schema.record_size());

    let mut heap = HeapFile::open(
        folder.path().join("items.dat"),
        folder.path().join("items.head"),
        schema,
    )?;

    for id in 0..5 {
        heap.add_record(&record(heap.schema(), id))?;
    }

    assert!(heap.remove_record(1)?);
    assert!(heap.remove_record(3)?);

    // LIFO: slot 3 first, then slot 1
    assert_eq!(3, heap.add_record(&record(heap.schema(), 100))?);
    assert_eq!(1, heap.add_record(&record(heap.schema(), 101))?);

    assert_eq!(5, heap.file_size());

    let live = heap.live_records()?;
    assert_eq!(5, live.len());

    for record in live {
        let slot = record.pos().expect("scan assigns positions");
        let reread = heap.read_record(slot)?.expect("slot exists");
        assert_eq!(record.values(), reread.values());
    }

    Ok(())
}
