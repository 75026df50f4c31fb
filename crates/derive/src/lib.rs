//! # Engine derive - `#[derive(Record)]` for engine tables
//!
//! Generates the [`engine::Record`] implementation for a plain struct with
//! named fields. Field roles are declared with the `ds` attribute:
//!
//! ```text
//! #[ds(primary)]   exactly one per struct, the primary key
//! #[ds(index)]     non-unique secondary index
//! #[ds(unique)]    unique secondary index
//! ```
//!
//! ## Example
//!
//! ```text
//! #[derive(Debug, Serialize, Deserialize, Record)]
//! pub struct User {
//!     #[ds(primary)]
//!     pub username: String,
//!     #[ds(unique)]
//!     pub email: String,
//!     #[ds(index)]
//!     pub enabled: bool,
//!     pub password: String,
//! }
//! ```
//!
//! The generated code refers to the `engine` crate by absolute path, so the
//! deriving crate must depend on `engine` under that name.
mod record;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives `engine::Record` for a struct with named fields.
#[proc_macro_derive(Record, attributes(ds))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    match record::handle(ast) {
        Ok(codegen) => codegen.into(),
        Err(e) => e.to_compile_error().into(),
    }
}
