use super::helpers::{open_users, user};
use crate::*;
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

#[test]
fn read_then_write_in_one_scope() -> Result<()> {
    let dir = tempdir()?;
    let table = open_users(&dir.path().join("users.db"))?;
    table.start_write(|tx| tx.add(&user("ian", "admins")))?;

    table.start_write(|tx| {
        let mut current = tx.get("ian")?.ok_or(Error::MissingRequiredValue("ian"))?;
        current.enabled = false;
        tx.update(&current)
    })?;

    let disabled = table.start_read(|tx| tx.get_index("enabled", &false, GetOptions::default()))?;
    assert_eq!(disabled.len(), 1);
    Ok(())
}

#[test]
fn earlier_operations_survive_a_failing_callback() -> Result<()> {
    let dir = tempdir()?;
    let table = open_users(&dir.path().join("users.db"))?;

    let result = table.start_write(|tx| {
        tx.add(&user("ian", "admins"))?;
        tx.add(&user("ian", "admins"))
    });
    assert!(matches!(result, Err(Error::DuplicatePrimaryKey)));
    assert!(table.start_read(|tx| tx.get("ian"))?.is_some());
    Ok(())
}

#[test]
fn callback_values_are_returned() -> Result<()> {
    let dir = tempdir()?;
    let table = open_users(&dir.path().join("users.db"))?;
    let count = table.start_write(|tx| {
        tx.add(&user("ian", "admins"))?;
        Ok(tx.get_all(GetOptions::default())?.len())
    })?;
    assert_eq!(count, 1);
    Ok(())
}

#[test]
fn concurrent_writers_and_readers() -> Result<()> {
    let dir = tempdir()?;
    let table = Arc::new(open_users(&dir.path().join("users.db"))?);

    let threads = 4;
    let per_thread = 25;
    let mut handles = Vec::new();
    for t in 0..threads {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || -> Result<()> {
            for i in 0..per_thread {
                let name = format!("user-{t}-{i}");
                table.start_write(|tx| tx.add(&user(&name, "load")))?;
                let found = table.start_read(|tx| tx.get(&name))?;
                assert!(found.is_some());
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let all = table.start_read(|tx| tx.get_all(GetOptions::sorted(false)))?;
    assert_eq!(all.len(), threads * per_thread);
    let load = table.start_read(|tx| tx.get_index("group", "load", GetOptions::default()))?;
    assert_eq!(load.len(), threads * per_thread);
    Ok(())
}

#[test]
fn close_waits_for_running_scope() -> Result<()> {
    let dir = tempdir()?;
    let table = Arc::new(open_users(&dir.path().join("users.db"))?);

    let reader = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            table.start_read(|tx| {
                thread::sleep(std::time::Duration::from_millis(50));
                tx.get_all(GetOptions::default())
            })
        })
    };
    thread::sleep(std::time::Duration::from_millis(10));
    table.close();

    // Either the read finished before close or it never started.
    match reader.join().expect("reader thread panicked") {
        Ok(records) => assert!(records.is_empty()),
        Err(e) => assert!(matches!(e, Error::Closed)),
    }
    assert!(matches!(
        table.start_read(|tx| tx.get("ian")),
        Err(Error::Closed)
    ));
    Ok(())
}
