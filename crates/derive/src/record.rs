use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::{Data, DeriveInput, Error, Field, Fields, LitStr};

/// Role tags accepted inside `#[ds(..)]`.
const TAGS: [&str; 3] = ["primary", "index", "unique"];

struct RecordField<'a> {
    field: &'a Field,
    tag: Option<&'static str>,
}

impl RecordField<'_> {
    fn name(&self) -> String {
        self.field
            .ident
            .as_ref()
            .map(|ident| ident.to_string())
            .unwrap_or_default()
    }

    /// Type name as written, whitespace stripped (`Vec<String>`, `u64`).
    fn type_name(&self) -> String {
        self.field
            .ty
            .to_token_stream()
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }
}

fn parse_tag(field: &Field) -> Result<Option<&'static str>, Error> {
    let mut tag = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("ds") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let Some(known) = TAGS.iter().find(|t| meta.path.is_ident(t)) else {
                return Err(meta.error("unknown ds tag, expected `primary`, `index` or `unique`"));
            };
            if tag.is_some() {
                return Err(meta.error("a field can carry only one ds tag"));
            }
            tag = Some(*known);
            Ok(())
        })?;
    }
    Ok(tag)
}

pub(crate) fn handle(ast: DeriveInput) -> Result<TokenStream, Error> {
    let struct_name = &ast.ident;

    let Data::Struct(data_struct) = &ast.data else {
        return Err(Error::new_spanned(
            struct_name,
            "Record can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data_struct.fields else {
        return Err(Error::new_spanned(
            struct_name,
            "Record requires a struct with named fields",
        ));
    };
    if !ast.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &ast.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = named
        .named
        .iter()
        .map(|field| {
            Ok(RecordField {
                field,
                tag: parse_tag(field)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let primary_count = fields.iter().filter(|f| f.tag == Some("primary")).count();
    if primary_count > 1 {
        return Err(Error::new_spanned(
            struct_name,
            "cannot specify multiple primary keys",
        ));
    }
    if primary_count == 0 && !fields.is_empty() {
        return Err(Error::new_spanned(
            struct_name,
            "a primary key is required, mark one field with #[ds(primary)]",
        ));
    }

    let type_name = LitStr::new(&struct_name.to_string(), struct_name.span());

    let descriptors = fields.iter().map(|f| {
        let name = f.name();
        let tag = f.tag.unwrap_or("");
        let ty = f.type_name();
        quote! {
            ::engine::Field::new(#name, #tag, #ty)
        }
    });

    let encode_arms = fields.iter().map(|f| {
        let name = f.name();
        let ident = &f.field.ident;
        quote! {
            #name => ::engine::codec::encode(&self.#ident).map(::std::option::Option::Some),
        }
    });

    Ok(quote! {
        impl ::engine::Record for #struct_name {
            fn type_name() -> &'static str {
                #type_name
            }

            fn fields() -> ::std::vec::Vec<::engine::Field> {
                ::std::vec![#(#descriptors),*]
            }

            fn encode_field(
                &self,
                name: &str,
            ) -> ::engine::Result<::std::option::Option<::std::vec::Vec<u8>>> {
                match name {
                    #(#encode_arms)*
                    _ => ::std::result::Result::Ok(::std::option::Option::None),
                }
            }
        }
    })
}
