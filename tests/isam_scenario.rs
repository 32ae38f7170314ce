use tabular_engine::{IsamIndex, KeyIndex, Value};
use test_log::test;

#[test]
fn isam_overflow_promotion() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut index = IsamIndex::new(folder.path().join("i.idx"));

    for key in [10, 20, 30, 40, 50] {
        index.insert(Value::I32(key), key as u32)?;
    }

    index.insert(Value::I32(20), 999)?;
    assert_eq!(vec![20, 999], index.get_all_positions(&Value::I32(20)));

    // the base entry is deleted, the overflow slot takes its place
    assert!(index.delete(&Value::I32(20))?);
    assert_eq!(Some(999), index.search(&Value::I32(20)));
    assert_eq!(vec![999], index.get_all_positions(&Value::I32(20)));

    Ok(())
}

#[test]
fn isam_range_with_overflow() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let mut index = IsamIndex::new(folder.path().join("i.idx"));

    for key in [10, 20, 30, 40, 50] {
        index.insert(Value::I32(key), key as u32)?;
    }
    index.insert(Value::I32(20), 200)?;
    index.insert(Value::I32(40), 400)?;

    let hits = index.range_search(&Value::I32(20), &Value::I32(40));
    assert_eq!(
        vec![
            (Value::I32(20), 20),
            (Value::I32(20), 200),
            (Value::I32(30), 30),
            (Value::I32(40), 40),
            (Value::I32(40), 400),
        ],
        hits
    );

    Ok(())
}

#[test]
fn isam_reload_smoke_test() -> tabular_engine::Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("i.idx");

    {
        let mut index = IsamIndex::new(path.clone());
        for key in [10, 20, 30, 40, 50] {
            index.insert(Value::I32(key), key as u32)?;
        }
        index.insert(Value::I32(20), 999)?;
    }

    {
        let mut index = IsamIndex::open(path)?;
        assert_eq!(vec![20, 999], index.get_all_positions(&Value::I32(20)));

        assert!(index.delete(&Value::I32(20))?);
        assert_eq!(Some(999), index.search(&Value::I32(20)));
    }

    Ok(())
}
