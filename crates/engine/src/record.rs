use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Error, Result};

/// A type that can be stored in a [`Table`](crate::Table).
///
/// Usually implemented with `#[derive(Record)]`, which reads the
/// `#[ds(primary)]`, `#[ds(index)]` and `#[ds(unique)]` field attributes.
/// Hand-written impls are validated the same way when the table is
/// registered.
///
/// Records are stored by field name. A field added to a type that already
/// has stored records needs `#[serde(default)]` so older records decode.
pub trait Record: Serialize + DeserializeOwned + 'static {
    /// Name of the type, persisted in the table config.
    fn type_name() -> &'static str;

    /// Every field of the type in declaration order.
    fn fields() -> Vec<Field>;

    /// Encodes the value of field `name`, or `None` if the type has no such
    /// field.
    fn encode_field(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Descriptor of a single record field as persisted in the table config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Role tag: `""`, `"primary"`, `"index"` or `"unique"`.
    pub tag: String,
    /// Declared type, as written in source.
    pub type_name: String,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        tag: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            type_name: type_name.into(),
        }
    }

    /// Parses the role tag.
    pub fn role(&self) -> Result<FieldRole> {
        match self.tag.as_str() {
            "" => Ok(FieldRole::None),
            "primary" => Ok(FieldRole::Primary),
            "index" => Ok(FieldRole::Index),
            "unique" => Ok(FieldRole::Unique),
            other => Err(Error::UnknownTag {
                field: self.name.clone(),
                tag: other.to_string(),
            }),
        }
    }
}

/// Role of a field within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    None,
    Primary,
    Index,
    Unique,
}
