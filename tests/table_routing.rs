use tabular_engine::{
    Error, Field, FieldType, IndexKind, Record, Schema, TableConfig, Value,
};
use test_log::test;

fn schema() -> Schema {
    Schema::new(
        "accounts",
        vec![
            Field::new("id", FieldType::I32),
            Field::new("owner", FieldType::Str(12)),
            Field::new("balance", FieldType::F32),
        ],
        "id",
    )
    .expect("valid schema")
}

fn record(schema: &Schema, id: i32, owner: &str, balance: f32) -> Record {
    Record::new(
        schema,
        vec![
            Value::I32(id),
            Value::Str(owner.into()),
            Value::F32(balance),
        ],
    )
    .expect("schema-conformant")
}

fn keyed_kinds() -> [IndexKind; 3] {
    [
        IndexKind::BPlusTree,
        IndexKind::Isam,
        IndexKind::ExtendibleHash,
    ]
}

#[test]
fn add_record_upserts_by_key() -> tabular_engine::Result<()> {
    for kind in keyed_kinds() {
        let folder = tempfile::tempdir()?;
        let mut table = TableConfig::new(&folder, schema(), kind).open()?;

        table.add_record(&record(table.schema(), 1, "ada", 10.0))?;
        table.add_record(&record(table.schema(), 1, "ada", 25.0))?;

        let hit = table.get_record(&Value::I32(1))?.expect("key 1 exists");
        assert_eq!(&Value::F32(25.0), &hit.values()[2], "{kind}");

        // no second heap slot was allocated
        assert_eq!(1, table.get_all()?.len(), "{kind}");
    }

    Ok(())
}

#[test]
fn update_record_in_place() -> tabular_engine::Result<()> {
    for kind in keyed_kinds() {
        let folder = tempfile::tempdir()?;
        let mut table = TableConfig::new(&folder, schema(), kind).open()?;

        for id in 0..10 {
            table.add_record(&record(table.schema(), id, "x", 0.0))?;
        }

        assert!(table.update_record(
            &Value::I32(4),
            vec![Value::I32(4), Value::Str("y".into()), Value::F32(9.5)],
        )?);

        let hit = table.get_record(&Value::I32(4))?.expect("key 4 exists");
        assert_eq!(&Value::Str("y".into()), &hit.values()[1], "{kind}");

        assert!(
            !table.update_record(
                &Value::I32(99),
                vec![Value::I32(99), Value::Str("z".into()), Value::F32(0.0)],
            )?,
            "{kind}"
        );

        assert_eq!(10, table.get_all()?.len(), "{kind}");
    }

    Ok(())
}

#[test]
fn update_record_with_key_change() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut table = TableConfig::new(&folder, schema(), IndexKind::BPlusTree).open()?;

    table.add_record(&record(table.schema(), 1, "ada", 10.0))?;

    assert!(table.update_record(
        &Value::I32(1),
        vec![Value::I32(2), Value::Str("ada".into()), Value::F32(10.0)],
    )?);

    assert!(table.get_record(&Value::I32(1))?.is_none());
    assert!(table.get_record(&Value::I32(2))?.is_some());
    assert_eq!(1, table.get_all()?.len());

    Ok(())
}

#[test]
fn remove_then_reinsert_reuses_slot() -> tabular_engine::Result<()> {
    for kind in keyed_kinds() {
        let folder = tempfile::tempdir()?;
        let mut table = TableConfig::new(&folder, schema(), kind).open()?;

        for id in 0..5 {
            table.add_record(&record(table.schema(), id, "x", 0.0))?;
        }

        assert!(table.remove_record(&Value::I32(2))?);
        assert!(!table.remove_record(&Value::I32(2))?, "{kind}");
        assert!(table.get_record(&Value::I32(2))?.is_none());

        table.add_record(&record(table.schema(), 7, "new", 1.0))?;

        // the freed slot was recycled, the data file did not grow
        assert_eq!(5, table.get_all()?.len(), "{kind}");
        assert!(table.get_record(&Value::I32(7))?.is_some());

        let hits = table.range_search(&Value::I32(0), &Value::I32(10))?;
        assert_eq!(5, hits.len(), "{kind}");
    }

    Ok(())
}

#[test]
fn schema_mismatch_is_rejected() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut table = TableConfig::new(&folder, schema(), IndexKind::BPlusTree).open()?;

    let other_schema = Schema::new(
        "other",
        vec![Field::new("id", FieldType::I32)],
        "id",
    )
    .expect("valid schema");
    let foreign = Record::new(&other_schema, vec![Value::I32(1)]).expect("schema-conformant");

    assert!(matches!(
        table.add_record(&foreign),
        Err(Error::Schema(_)),
    ));

    Ok(())
}

#[test]
fn spatial_queries_need_an_rtree() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let table = TableConfig::new(&folder, schema(), IndexKind::BPlusTree).open()?;

    assert!(matches!(
        table.knn(0.0, 0.0, 3),
        Err(Error::Unsupported(_)),
    ));

    Ok(())
}

#[test]
fn float_keys_work_end_to_end() -> tabular_engine::Result<()> {
    let schema = Schema::new(
        "readings",
        vec![
            Field::new("value", FieldType::F32),
            Field::new("tag", FieldType::Str(4)),
        ],
        "value",
    )
    .expect("valid schema");

    let folder = tempfile::tempdir()?;
    let mut table = TableConfig::new(&folder, schema, IndexKind::BPlusTree).open()?;

    for v in [2.5_f32, -1.0, 0.0, 13.37] {
        let record = Record::new(
            table.schema(),
            vec![Value::F32(v), Value::Str("r".into())],
        )?;
        table.add_record(&record)?;
    }

    assert!(table.get_record(&Value::F32(-1.0))?.is_some());

    let hits = table.range_search(&Value::F32(0.0), &Value::F32(3.0))?;
    assert_eq!(2, hits.len(), "0.0 and 2.5");

    Ok(())
}
