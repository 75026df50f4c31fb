/// Schema extraction and compatibility checks.
///
/// A schema is derived from a record type's field descriptors: exactly one
/// primary key, plus ordered lists of index and unique fields. When an
/// existing table is reopened, the stored field list is compared against the
/// requested one with [`compare_fields`].
use tracing::{debug, error};

use crate::record::{Field, FieldRole, Record};
use crate::{Error, Result};

/// Roles extracted from a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub primary_key: String,
    pub indexes: Vec<String>,
    pub uniques: Vec<String>,
}

impl Schema {
    /// Extracts the schema of `T`.
    pub fn of<T: Record>() -> Result<Self> {
        Self::extract(T::type_name(), T::fields())
    }

    /// Validates `fields` and sorts them into roles.
    ///
    /// # Errors
    ///
    /// Fails when there are no fields, zero or several primary keys, or a
    /// tag is not recognised.
    pub fn extract(type_name: &str, fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            error!(type_name, "type has no fields");
            return Err(Error::NoFields(type_name.to_string()));
        }

        let mut primary_key: Option<String> = None;
        let mut indexes = Vec::new();
        let mut uniques = Vec::new();

        for field in &fields {
            match field.role()? {
                FieldRole::None => continue,
                FieldRole::Primary => {
                    if primary_key.is_some() {
                        error!(type_name, "cannot specify multiple primary keys");
                        return Err(Error::MultiplePrimaryKeys);
                    }
                    debug!(type_name, field = %field.name, "primary key field");
                    primary_key = Some(field.name.clone());
                }
                FieldRole::Index => {
                    debug!(type_name, field = %field.name, "indexed field");
                    indexes.push(field.name.clone());
                }
                FieldRole::Unique => {
                    debug!(type_name, field = %field.name, "unique field");
                    uniques.push(field.name.clone());
                }
            }
        }

        let Some(primary_key) = primary_key else {
            error!(type_name, "a primary key is required");
            return Err(Error::MissingPrimaryKey);
        };

        Ok(Self {
            fields,
            primary_key,
            indexes,
            uniques,
        })
    }
}

/// Checks that `requested` can be used against a table created with
/// `existing`.
///
/// Fields present in both must keep their type and tag. Added and removed
/// fields are fine. The primary key field must keep its name unless `force`
/// is set.
pub fn compare_fields(existing: &[Field], requested: &[Field], force: bool) -> Result<()> {
    for new in requested {
        let Some(old) = existing.iter().find(|f| f.name == new.name) else {
            continue;
        };
        if old.type_name != new.type_name {
            return Err(Error::PropertyChanged(format!(
                "cannot change type of field '{}' without migration. old='{}' new='{}'",
                new.name, old.type_name, new.type_name
            )));
        }
        if old.tag != new.tag {
            return Err(Error::PropertyChanged(format!(
                "cannot change tag of field '{}' without migration. old='{}' new='{}'",
                new.name, old.tag, new.tag
            )));
        }
    }

    let primary = |fields: &[Field]| {
        fields
            .iter()
            .find(|f| f.tag == "primary")
            .map(|f| f.name.clone())
    };
    let old_primary = primary(existing);
    let new_primary = primary(requested);
    if old_primary != new_primary && !force {
        return Err(Error::PropertyChanged(format!(
            "cannot change name of primary field '{}'",
            old_primary.unwrap_or_default()
        )));
    }

    Ok(())
}
