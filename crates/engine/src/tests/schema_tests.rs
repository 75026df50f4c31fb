use super::helpers::{user, User};
use crate::*;
use anyhow::Result;

fn field(name: &str, tag: &str, ty: &str) -> Field {
    Field::new(name, tag, ty)
}

// --------------------- Derived descriptors ---------------------

#[test]
fn derive_lists_fields_in_declaration_order() {
    let fields = User::fields();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["username", "email", "group", "enabled", "password"]);

    assert_eq!(fields[0].tag, "primary");
    assert_eq!(fields[1].tag, "unique");
    assert_eq!(fields[2].tag, "index");
    assert_eq!(fields[4].tag, "");
    assert_eq!(fields[3].type_name, "bool");
    assert_eq!(User::type_name(), "User");
}

#[test]
fn derive_encodes_named_fields_only() -> Result<()> {
    let u = user("ian", "admins");
    assert_eq!(
        u.encode_field("group")?,
        Some(codec::encode("admins")?),
    );
    assert_eq!(u.encode_field("nope")?, None);
    Ok(())
}

#[test]
fn schema_sorts_fields_into_roles() -> Result<()> {
    let schema = Schema::of::<User>()?;
    assert_eq!(schema.primary_key, "username");
    assert_eq!(schema.indexes, ["group", "enabled"]);
    assert_eq!(schema.uniques, ["email"]);
    Ok(())
}

// --------------------- Extraction failures ---------------------

#[test]
fn no_fields_is_rejected() {
    let err = Schema::extract("Empty", Vec::new()).unwrap_err();
    assert!(matches!(err, Error::NoFields(ref name) if name == "Empty"));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn multiple_primary_keys_are_rejected() {
    let fields = vec![field("a", "primary", "u32"), field("b", "primary", "u32")];
    let err = Schema::extract("T", fields).unwrap_err();
    assert!(matches!(err, Error::MultiplePrimaryKeys));
}

#[test]
fn missing_primary_key_is_rejected() {
    let fields = vec![field("a", "index", "u32"), field("b", "", "String")];
    let err = Schema::extract("T", fields).unwrap_err();
    assert!(matches!(err, Error::MissingPrimaryKey));
}

#[test]
fn unknown_tag_is_rejected() {
    let fields = vec![field("a", "primary", "u32"), field("b", "sorted", "u32")];
    let err = Schema::extract("T", fields).unwrap_err();
    match err {
        Error::UnknownTag { field, tag } => {
            assert_eq!(field, "b");
            assert_eq!(tag, "sorted");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// --------------------- Compatibility ---------------------

#[test]
fn added_and_removed_fields_are_compatible() -> Result<()> {
    let existing = vec![field("id", "primary", "u32"), field("old", "", "String")];
    let requested = vec![field("id", "primary", "u32"), field("new", "index", "bool")];
    compare_fields(&existing, &requested, false)?;
    Ok(())
}

#[test]
fn changed_type_is_incompatible() {
    let existing = vec![field("id", "primary", "u32"), field("age", "", "u32")];
    let requested = vec![field("id", "primary", "u32"), field("age", "", "String")];
    let err = compare_fields(&existing, &requested, false).unwrap_err();
    assert!(matches!(err, Error::PropertyChanged(_)));
    assert_eq!(err.kind(), ErrorKind::Compatibility);
}

#[test]
fn changed_tag_is_incompatible_even_when_forced() {
    let existing = vec![field("id", "primary", "u32"), field("age", "", "u32")];
    let requested = vec![field("id", "primary", "u32"), field("age", "index", "u32")];
    assert!(compare_fields(&existing, &requested, true).is_err());
}

#[test]
fn renamed_primary_key_needs_force() -> Result<()> {
    let existing = vec![field("id", "primary", "u32")];
    let requested = vec![field("key", "primary", "u32")];
    assert!(matches!(
        compare_fields(&existing, &requested, false),
        Err(Error::PropertyChanged(_))
    ));
    compare_fields(&existing, &requested, true)?;
    Ok(())
}
