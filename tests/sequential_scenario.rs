use tabular_engine::{Field, FieldType, IndexKind, Record, Schema, TableConfig, Value};
use test_log::test;

fn schema() -> Schema {
    Schema::new(
        "events",
        vec![
            Field::new("id", FieldType::I32),
            Field::new("tag", FieldType::Str(8)),
        ],
        "id",
    )
    .expect("valid schema")
}

fn key_of(record: &Record) -> i32 {
    match record.values()[0] {
        Value::I32(v) => v,
        _ => unreachable!(),
    }
}

#[test]
fn sequential_merge_and_upsert() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let mut table = TableConfig::new(&folder, schema(), IndexKind::Sequential)
        .aux_threshold(5)
        .open()?;

    for (i, id) in [3, 1, 4, 1, 5, 9, 2, 6].into_iter().enumerate() {
        let record = Record::new(
            table.schema(),
            vec![Value::I32(id), Value::Str(format!("t{i}"))],
        )?;
        table.add_record(&record)?;
    }

    // the duplicate key 1 was replaced, not duplicated
    let hit = table.get_record(&Value::I32(1))?.expect("key 1 is live");
    assert_eq!(&Value::Str("t3".into()), &hit.values()[1]);

    let hits = table.range_search(&Value::I32(2), &Value::I32(6))?;
    let mut keys: Vec<i32> = hits.iter().map(key_of).collect();
    keys.sort_unstable();
    assert_eq!(vec![2, 3, 4, 5, 6], keys);

    assert_eq!(8 - 1, table.get_all()?.len(), "seven distinct keys");

    Ok(())
}

#[test]
fn sequential_delete_then_reopen() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut table = TableConfig::new(&folder, schema(), IndexKind::Sequential)
            .aux_threshold(100)
            .open()?;

        for id in [10, 20, 30, 40] {
            let record =
                Record::new(table.schema(), vec![Value::I32(id), Value::Str("x".into())])?;
            table.add_record(&record)?;
        }

        assert!(table.remove_record(&Value::I32(20))?);
        assert!(!table.remove_record(&Value::I32(20))?, "idempotent delete");
    }

    {
        let table = TableConfig::new(&folder, schema(), IndexKind::Sequential)
            .aux_threshold(100)
            .open()?;

        assert!(table.get_record(&Value::I32(20))?.is_none());
        assert!(table.get_record(&Value::I32(30))?.is_some());
        assert_eq!(3, table.get_all()?.len());
    }

    Ok(())
}

#[test]
fn sequential_save_forces_merge() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let mut table = TableConfig::new(&folder, schema(), IndexKind::Sequential)
        .aux_threshold(100)
        .open()?;

    for id in [9, 4, 7, 1] {
        let record = Record::new(table.schema(), vec![Value::I32(id), Value::Str("x".into())])?;
        table.add_record(&record)?;
    }

    table.save_all()?;

    // after the merge the main file is the whole table, in key order
    let all = table.get_all()?;
    let keys: Vec<i32> = all.iter().map(key_of).collect();
    assert_eq!(vec![1, 4, 7, 9], keys);

    Ok(())
}

#[test]
fn sequential_update_semantics() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    let mut table = TableConfig::new(&folder, schema(), IndexKind::Sequential)
        .aux_threshold(100)
        .open()?;

    let record = Record::new(table.schema(), vec![Value::I32(1), Value::Str("a".into())])?;
    table.add_record(&record)?;

    assert!(table.update_record(&Value::I32(1), vec![Value::I32(1), Value::Str("b".into())])?);

    let hit = table.get_record(&Value::I32(1))?.expect("key 1 is live");
    assert_eq!(&Value::Str("b".into()), &hit.values()[1]);

    // updating a missing key is a not-found, not an insert
    assert!(!table.update_record(&Value::I32(2), vec![Value::I32(2), Value::Str("c".into())])?);
    assert!(table.get_record(&Value::I32(2))?.is_none());

    Ok(())
}
