use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprArray, Fields, Ident, Lit, LitChar, LitStr, Type,
    parse_macro_input, spanned::Spanned,
};

#[proc_macro_derive(Entity, attributes(entity, composite, index))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityOptions {
    name: Option<String>,
    table: Option<String>,
    hash: Option<String>,
    range: Option<String>,
}

struct CompositeOptions {
    name: String,
    sources: Vec<String>,
    separator: char,
}

#[derive(Default)]
struct IndexOptions {
    name: Option<String>,
    hash: Option<String>,
    range: Option<String>,
    projection: Option<String>,
    include: Vec<String>,
}

struct FieldSpec {
    ident: Ident,
    ty: Type,
    attribute: String,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let options = parse_entity_options(&input.attrs)?;
    let composites = parse_composite_options(&input.attrs)?;
    let indexes = parse_index_options(&input.attrs)?;

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields,
            _ => {
                return Err(syn::Error::new(
                    struct_name.span(),
                    "Entity requires named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let mut fields = Vec::<FieldSpec>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Entity requires named fields"))?;
        let attribute = parse_field_rename(&field.attrs)?.unwrap_or_else(|| ident.to_string());
        fields.push(FieldSpec {
            ident,
            ty: field.ty,
            attribute,
        });
    }

    if fields.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Entity requires at least one field",
        ));
    }

    let known = |name: &str| {
        fields.iter().any(|f| f.attribute == name) || composites.iter().any(|c| c.name == name)
    };

    let hash = options.hash.clone().ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "missing #[entity(hash = \"...\")] primary key attribute",
        )
    })?;
    for key_part in std::iter::once(&hash).chain(options.range.iter()) {
        if !known(key_part) {
            return Err(syn::Error::new(
                struct_name.span(),
                format!("primary key attribute '{key_part}' is not a field or composite"),
            ));
        }
    }

    for composite in &composites {
        for source in &composite.sources {
            if !fields.iter().any(|f| &f.attribute == source) {
                return Err(syn::Error::new(
                    struct_name.span(),
                    format!(
                        "composite '{}' source '{}' is not a field",
                        composite.name, source
                    ),
                ));
            }
        }
    }

    let entity_name = options.name.clone().unwrap_or_else(|| struct_name.to_string());
    let table_call = options.table.as_ref().map(|table| quote!(.table(#table)));
    let range_expr = option_str(options.range.as_deref());

    let attribute_calls = fields.iter().map(|field| {
        let attribute = &field.attribute;
        let ty = &field.ty;
        quote! {
            .attribute(
                #attribute,
                <#ty as ::schemakv::FieldValue>::SCALAR,
                <#ty as ::schemakv::FieldValue>::REQUIRED,
            )
        }
    });

    let composite_calls = composites.iter().map(|composite| {
        let name = &composite.name;
        let sources = &composite.sources;
        let separator = composite.separator;
        quote!(.composite(#name, &[#(#sources),*], #separator))
    });

    let mut index_calls = Vec::<TokenStream2>::new();
    for index in &indexes {
        let name = index
            .name
            .as_ref()
            .ok_or_else(|| syn::Error::new(struct_name.span(), "#[index] requires name = \"...\""))?;
        let index_hash = index.hash.as_ref().ok_or_else(|| {
            syn::Error::new(
                struct_name.span(),
                format!("#[index(name = \"{name}\")] requires hash = \"...\""),
            )
        })?;
        for key_part in std::iter::once(index_hash).chain(index.range.iter()) {
            if !known(key_part) {
                return Err(syn::Error::new(
                    struct_name.span(),
                    format!("index '{name}' key attribute '{key_part}' is not a field or composite"),
                ));
            }
        }

        let index_range = option_str(index.range.as_deref());
        let projection = match (index.projection.as_deref(), index.include.is_empty()) {
            (None | Some("all"), true) => quote!(::schemakv::Projection::All),
            (Some("keys_only"), true) => quote!(::schemakv::Projection::KeysOnly),
            (None | Some("include"), false) => {
                let include = &index.include;
                quote!(::schemakv::Projection::Include(vec![#(#include.to_string()),*]))
            }
            _ => {
                return Err(syn::Error::new(
                    struct_name.span(),
                    format!(
                        "index '{name}': projection must be \"all\", \"keys_only\" or include = [..]"
                    ),
                ));
            }
        };

        index_calls.push(quote! {
            .index(
                ::schemakv::IndexDef::new(#name, #index_hash, #index_range).projection(#projection)
            )
        });
    }

    let put_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let attribute = &field.attribute;
        quote!(::schemakv::schema::put_field(&mut record, #attribute, &self.#ident);)
    });

    let take_fields = fields.iter().map(|field| {
        let ident = &field.ident;
        let attribute = &field.attribute;
        quote!(#ident: ::schemakv::schema::take_field(&mut record, #attribute)?,)
    });

    Ok(quote! {
        impl ::schemakv::Entity for #struct_name {
            fn descriptor() -> &'static ::schemakv::EntityDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<::schemakv::EntityDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    ::schemakv::EntityDescriptor::builder(#entity_name)
                        #table_call
                        #(#attribute_calls)*
                        .primary_key(#hash, #range_expr)
                        #(#composite_calls)*
                        #(#index_calls)*
                        .build()
                        .unwrap_or_else(|err| {
                            panic!("invalid entity descriptor for {}: {}", #entity_name, err)
                        })
                })
            }

            fn to_record(&self) -> ::schemakv::Record {
                let mut record = ::schemakv::Record::new();
                #(#put_fields)*
                record
            }

            fn from_record(mut record: ::schemakv::Record) -> ::schemakv::Result<Self> {
                Ok(Self {
                    #(#take_fields)*
                })
            }
        }
    })
}

fn option_str(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(value) => quote!(::std::option::Option::Some(#value)),
        None => quote!(::std::option::Option::None),
    }
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("name") {
                &mut options.name
            } else if meta.path.is_ident("table") {
                &mut options.table
            } else if meta.path.is_ident("hash") {
                &mut options.hash
            } else if meta.path.is_ident("range") {
                &mut options.range
            } else {
                return Err(meta.error(
                    "Unsupported entity attribute. Supported: name, table, hash, range",
                ));
            };
            let lit: LitStr = meta.value()?.parse()?;
            *slot = Some(lit.value());
            Ok(())
        })?;
    }

    Ok(options)
}

fn parse_composite_options(attrs: &[syn::Attribute]) -> syn::Result<Vec<CompositeOptions>> {
    let mut composites = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("composite") {
            continue;
        }

        let mut name = None;
        let mut sources = Vec::new();
        let mut separator = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("sources") {
                let array: ExprArray = meta.value()?.parse()?;
                sources = string_array(&array)?;
                return Ok(());
            }

            if meta.path.is_ident("separator") {
                let lit: LitChar = meta.value()?.parse()?;
                separator = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported composite attribute. Supported: name, sources = [..], separator = '..'",
            ))
        })?;

        let (Some(name), Some(separator)) = (name, separator) else {
            return Err(syn::Error::new(
                attr.span(),
                "#[composite] requires name = \"...\" and separator = '.'",
            ));
        };
        if sources.is_empty() {
            return Err(syn::Error::new(
                attr.span(),
                "#[composite] requires at least one source",
            ));
        }
        composites.push(CompositeOptions {
            name,
            sources,
            separator,
        });
    }

    Ok(composites)
}

fn parse_index_options(attrs: &[syn::Attribute]) -> syn::Result<Vec<IndexOptions>> {
    let mut indexes = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("index") {
            continue;
        }

        let mut index = IndexOptions::default();
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("include") {
                let array: ExprArray = meta.value()?.parse()?;
                index.include = string_array(&array)?;
                return Ok(());
            }

            let slot = if meta.path.is_ident("name") {
                &mut index.name
            } else if meta.path.is_ident("hash") {
                &mut index.hash
            } else if meta.path.is_ident("range") {
                &mut index.range
            } else if meta.path.is_ident("projection") {
                &mut index.projection
            } else {
                return Err(meta.error(
                    "Unsupported index attribute. Supported: name, hash, range, projection, include = [..]",
                ));
            };
            let lit: LitStr = meta.value()?.parse()?;
            *slot = Some(lit.value());
            Ok(())
        })?;
        indexes.push(index);
    }

    Ok(indexes)
}

/// `#[entity(rename = "...")]` on a field.
fn parse_field_rename(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                rename = Some(lit.value());
                return Ok(());
            }
            Err(meta.error("Unsupported field attribute. Supported: rename = \"...\""))
        })?;
    }

    Ok(rename)
}

fn string_array(array: &ExprArray) -> syn::Result<Vec<String>> {
    array
        .elems
        .iter()
        .map(|elem| match elem {
            Expr::Lit(expr) => match &expr.lit {
                Lit::Str(lit) => Ok(lit.value()),
                other => Err(syn::Error::new(other.span(), "expected a string literal")),
            },
            other => Err(syn::Error::new(other.span(), "expected a string literal")),
        })
        .collect()
}
