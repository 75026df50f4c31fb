use super::helpers::{open_unsorted, open_users, remove_raw, user, usernames, User};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

fn seeded(path: &std::path::Path) -> Result<Table<User>> {
    let table = open_users(path)?;
    table.start_write(|tx| {
        for (name, group) in [
            ("ian", "admins"),
            ("bob", "staff"),
            ("eve", "admins"),
            ("amy", "admins"),
            ("joe", "staff"),
        ] {
            tx.add(&user(name, group))?;
        }
        Ok(())
    })?;
    Ok(table)
}

// --------------------- Point lookups ---------------------

#[test]
fn get_missing_key() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    assert!(table.start_read(|tx| tx.get("nobody"))?.is_none());
    Ok(())
}

#[test]
fn get_accepts_owned_and_borrowed_keys() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    let owned = table.start_read(|tx| tx.get(&"eve".to_string()))?;
    let borrowed = table.start_read(|tx| tx.get("eve"))?;
    assert_eq!(owned, borrowed);
    assert!(owned.is_some());
    Ok(())
}

#[test]
fn get_unique_finds_holder() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    let found = table.start_read(|tx| tx.get_unique("email", "amy@example.com"))?;
    assert_eq!(found, Some(user("amy", "admins")));
    assert!(table
        .start_read(|tx| tx.get_unique("email", "nobody@example.com"))?
        .is_none());
    Ok(())
}

#[test]
fn lookups_on_unregistered_fields_fail() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;

    let err = table
        .start_read(|tx| tx.get_index("password", "hunter2", GetOptions::default()))
        .unwrap_err();
    assert!(matches!(err, Error::FieldNotIndexed(ref f) if f == "password"));
    assert_eq!(err.kind(), ErrorKind::Constraint);

    let err = table.start_read(|tx| tx.get_unique("group", "admins")).unwrap_err();
    assert!(matches!(err, Error::FieldNotUnique(ref f) if f == "group"));
    Ok(())
}

// --------------------- Index reads ---------------------

#[test]
fn get_index_unsorted_follows_list_order() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    let admins = table.start_read(|tx| tx.get_index("group", "admins", GetOptions::default()))?;
    assert_eq!(usernames(&admins), ["ian", "eve", "amy"]);

    let enabled = table.start_read(|tx| tx.get_index("enabled", &true, GetOptions::default()))?;
    assert_eq!(enabled.len(), 5);
    let disabled = table.start_read(|tx| tx.get_index("enabled", &false, GetOptions::default()))?;
    assert!(disabled.is_empty());
    Ok(())
}

#[test]
fn get_index_sorted_directions() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;

    let newest_first =
        table.start_read(|tx| tx.get_index("group", "admins", GetOptions::sorted(true)))?;
    assert_eq!(usernames(&newest_first), ["amy", "eve", "ian"]);

    let oldest_first =
        table.start_read(|tx| tx.get_index("group", "admins", GetOptions::sorted(false)))?;
    assert_eq!(usernames(&oldest_first), ["ian", "eve", "amy"]);
    Ok(())
}

#[test]
fn get_index_respects_max() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;

    let first = table.start_read(|tx| {
        tx.get_index("group", "admins", GetOptions::sorted(true).max(2))
    })?;
    assert_eq!(usernames(&first), ["amy", "eve"]);

    let unsorted = table.start_read(|tx| {
        tx.get_index("group", "admins", GetOptions::default().max(1))
    })?;
    assert_eq!(usernames(&unsorted), ["ian"]);
    Ok(())
}

#[test]
fn sorted_max_after_deleting_all_but_one_match() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    table.start_write(|tx| {
        tx.delete(&user("ian", "admins"))?;
        tx.delete(&user("eve", "admins"))
    })?;

    let admins = table.start_read(|tx| {
        tx.get_index("group", "admins", GetOptions::sorted(true).max(2))
    })?;
    assert_eq!(usernames(&admins), ["amy"]);

    table.start_write(|tx| {
        tx.delete(&user("bob", "staff"))?;
        tx.delete(&user("joe", "staff"))
    })?;
    let all = table.start_read(|tx| tx.get_all(GetOptions::sorted(true).max(3)))?;
    assert_eq!(usernames(&all), ["amy"]);
    Ok(())
}

#[test]
fn get_index_skips_dead_entries() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    remove_raw(&table, "data", &codec::encode("eve")?)?;

    let admins = table.start_read(|tx| tx.get_index("group", "admins", GetOptions::default()))?;
    assert_eq!(usernames(&admins), ["ian", "amy"]);

    // The dead entry does not count against the limit.
    let capped = table.start_read(|tx| {
        tx.get_index("group", "admins", GetOptions::default().max(2))
    })?;
    assert_eq!(usernames(&capped), ["ian", "amy"]);
    assert!(table
        .start_read(|tx| tx.get_unique("email", "eve@example.com"))?
        .is_none());
    Ok(())
}

#[test]
fn missing_sequence_sorts_as_oldest() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;
    remove_raw(&table, "insert_order", &codec::encode("amy")?)?;

    let oldest_first =
        table.start_read(|tx| tx.get_index("group", "admins", GetOptions::sorted(false)))?;
    assert_eq!(usernames(&oldest_first), ["amy", "ian", "eve"]);
    Ok(())
}

// --------------------- Get all ---------------------

#[test]
fn get_all_unsorted_is_capped() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;

    let all = table.start_read(|tx| tx.get_all(GetOptions::default()))?;
    assert_eq!(all.len(), 5);
    let some = table.start_read(|tx| tx.get_all(GetOptions::default().max(3)))?;
    assert_eq!(some.len(), 3);
    Ok(())
}

#[test]
fn get_all_sorted() -> Result<()> {
    let dir = tempdir()?;
    let table = seeded(&dir.path().join("users.db"))?;

    let newest_first = table.start_read(|tx| tx.get_all(GetOptions::sorted(true)))?;
    assert_eq!(usernames(&newest_first), ["joe", "amy", "eve", "bob", "ian"]);

    let oldest_two = table.start_read(|tx| tx.get_all(GetOptions::sorted(false).max(2)))?;
    assert_eq!(usernames(&oldest_two), ["ian", "bob"]);
    Ok(())
}

#[test]
fn sorted_read_on_unsorted_table_falls_back() -> Result<()> {
    let dir = tempdir()?;
    let table = open_unsorted(&dir.path().join("users.db"))?;
    table.start_write(|tx| {
        tx.add(&user("ian", "admins"))?;
        tx.add(&user("bob", "admins"))
    })?;

    let all = table.start_read(|tx| tx.get_all(GetOptions::sorted(true)))?;
    assert_eq!(all.len(), 2);
    let admins =
        table.start_read(|tx| tx.get_index("group", "admins", GetOptions::sorted(true)))?;
    assert_eq!(usernames(&admins), ["ian", "bob"]);
    Ok(())
}

#[test]
fn empty_table_reads() -> Result<()> {
    let dir = tempdir()?;
    let table = open_users(&dir.path().join("users.db"))?;
    assert!(table.start_read(|tx| tx.get_all(GetOptions::sorted(true)))?.is_empty());
    assert!(table
        .start_read(|tx| tx.get_index("group", "admins", GetOptions::default()))?
        .is_empty());
    Ok(())
}
