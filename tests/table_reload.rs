use tabular_engine::{Field, FieldType, IndexKind, Record, Schema, TableConfig, Value};
use test_log::test;

const ITEM_COUNT: i32 = 200;

fn schema() -> Schema {
    Schema::new(
        "users",
        vec![
            Field::new("id", FieldType::I32),
            Field::new("name", FieldType::Str(12)),
            Field::new("score", FieldType::F32),
        ],
        "id",
    )
    .expect("valid schema")
}

fn fill(table: &mut tabular_engine::Table) -> tabular_engine::Result<()> {
    for id in 0..ITEM_COUNT {
        let record = Record::new(
            table.schema(),
            vec![
                Value::I32(id),
                Value::Str(format!("user-{id}")),
                Value::F32(id as f32 / 2.0),
            ],
        )?;
        table.add_record(&record)?;
    }
    Ok(())
}

fn reload_roundtrip(kind: IndexKind) -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let mut table = TableConfig::new(&folder, schema(), kind).open()?;
        fill(&mut table)?;

        assert!(table.remove_record(&Value::I32(77))?);
    }

    {
        let table = TableConfig::new(&folder, schema(), kind).open()?;

        for id in 0..ITEM_COUNT {
            let hit = table.get_record(&Value::I32(id))?;
            if id == 77 {
                assert!(hit.is_none());
            } else {
                let record = hit.expect("record survives reopen");
                assert_eq!(&Value::Str(format!("user-{id}")), &record.values()[1]);
            }
        }

        let hits = table.range_search(&Value::I32(70), &Value::I32(80))?;
        assert_eq!(10, hits.len(), "77 is gone");

        assert_eq!((ITEM_COUNT - 1) as usize, table.get_all()?.len());
    }

    Ok(())
}

#[test]
fn reload_bplus() -> tabular_engine::Result<()> {
    reload_roundtrip(IndexKind::BPlusTree)
}

#[test]
fn reload_isam() -> tabular_engine::Result<()> {
    reload_roundtrip(IndexKind::Isam)
}

#[test]
fn reload_ext_hash() -> tabular_engine::Result<()> {
    reload_roundtrip(IndexKind::ExtendibleHash)
}

#[test]
fn reload_sequential() -> tabular_engine::Result<()> {
    reload_roundtrip(IndexKind::Sequential)
}

#[test]
fn reload_empty_table() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let table = TableConfig::new(&folder, schema(), IndexKind::BPlusTree).open()?;
        assert!(table.get_all()?.is_empty());
    }

    {
        let table = TableConfig::new(&folder, schema(), IndexKind::BPlusTree).open()?;
        assert!(table.get_all()?.is_empty());
        assert!(table.get_record(&Value::I32(0))?.is_none());
    }

    Ok(())
}
