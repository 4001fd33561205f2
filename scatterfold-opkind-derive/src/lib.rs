//! A derive macro for the `OpKind` trait.
//!
//! This construction enables operations to be serialized and executed by a
//! remote worker in an opaque manner. The registry is an enum whose variants
//! are single-field tuple variants wrapping an operation type. Each variant
//! declares the job kinds it may run under:
//!
//! ```ignore
//! #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! enum Ops {
//!     #[op(map)]
//!     AddOne(AddOne),
//!     #[op(filter)]
//!     IsEven(IsEven),
//!     #[op(map, reduce)]
//!     Max(Max),
//! }
//! ```
//!
//! # Implementation details
//!
//! For every variant, a `From<Variant>` impl is generated for the registry so
//! the driver can wrap an operation before serializing it. `execute_chunk`
//! matches on the `(variant, kind)` pair and forwards the chunk to the
//! scatterfold chunk executor for that kind (`map_chunk`, `filter_chunk` or
//! `reduce_chunk`). Each executor requires the matching trait (`Operation`,
//! `Predicate` or `Monoid`), so declaring a kind the operation doesn't
//! implement is a compile error. Any undeclared pair falls through to an
//! `UnsupportedOperation` error.
extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Error, Fields, Ident, Result};

/// Check if the `internal` attribute is present on the derive macro.
///
/// Quoted paths need to be slightly modified if the macro is being
/// called from the `scatterfold` crate itself.
fn get_is_internal(attrs: &mut Vec<Attribute>) -> Result<bool> {
    let mut is_internal = None;
    let mut errors: Option<Error> = None;

    attrs.retain(|attr| {
        if !attr.path().is_ident("scatterfold") {
            return true;
        }
        if let Err(err) = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("internal") {
                if is_internal.is_some() {
                    return Err(meta.error("duplicate scatterfold crate attribute"));
                }

                is_internal = Some(true);
                Ok(())
            } else {
                Err(meta.error("unsupported scatterfold attribute"))
            }
        }) {
            match &mut errors {
                None => errors = Some(err),
                Some(errors) => errors.combine(err),
            }
        }
        false
    });

    match errors {
        None => Ok(is_internal.unwrap_or(false)),
        Some(errors) => Err(errors),
    }
}

/// Job kinds a variant may run under, parsed from `#[op(...)]`.
#[derive(Default)]
struct Kinds {
    map: bool,
    filter: bool,
    reduce: bool,
}

fn get_kinds(variant: &Ident, attrs: &[Attribute]) -> Result<Kinds> {
    let mut kinds = Kinds::default();
    let mut seen = false;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("op")) {
        seen = true;
        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("map") {
                &mut kinds.map
            } else if meta.path.is_ident("filter") {
                &mut kinds.filter
            } else if meta.path.is_ident("reduce") {
                &mut kinds.reduce
            } else {
                return Err(meta.error("expected one of `map`, `filter`, `reduce`"));
            };
            if *slot {
                return Err(meta.error("duplicate job kind"));
            }
            *slot = true;
            Ok(())
        })?;
    }

    if !seen {
        return Err(Error::new(
            variant.span(),
            "missing `#[op(...)]` attribute declaring the job kinds of this operation",
        ));
    }

    Ok(kinds)
}

fn expand(mut input: DeriveInput) -> Result<TokenStream2> {
    let is_internal = get_is_internal(&mut input.attrs)?;

    // The path to the `scatterfold` crate.
    // If the derive macro is being called from the `scatterfold` crate itself,
    // then the path is `crate`, otherwise it is `::scatterfold`.
    let path = if is_internal {
        quote! { crate }
    } else {
        quote! { ::scatterfold }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let data = match &input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(Error::new(
                name.span(),
                "OpKind can only be derived for enums",
            ))
        }
    };

    let mut from_impls = Vec::new();
    let mut name_arms = Vec::new();
    let mut execute_arms = Vec::new();

    for variant in &data.variants {
        let ident = &variant.ident;
        let ty = match &variant.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => &fields.unnamed[0].ty,
            _ => {
                return Err(Error::new(
                    ident.span(),
                    "OpKind variants must be single-field tuple variants wrapping an operation",
                ))
            }
        };
        let kinds = get_kinds(ident, &variant.attrs)?;
        let label = ident.to_string();

        from_impls.push(quote! {
            impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                fn from(op: #ty) -> Self {
                    Self::#ident(op)
                }
            }
        });

        name_arms.push(quote! {
            Self::#ident(_) => #label,
        });

        if kinds.map {
            execute_arms.push(quote! {
                (Self::#ident(op), #path::job::JobKind::Map) => {
                    #path::job::map_chunk(&op, serializer, chunk, offset)
                }
            });
        }
        if kinds.filter {
            execute_arms.push(quote! {
                (Self::#ident(op), #path::job::JobKind::Filter) => {
                    #path::job::filter_chunk(&op, serializer, chunk, offset)
                }
            });
        }
        if kinds.reduce {
            execute_arms.push(quote! {
                (Self::#ident(op), #path::job::JobKind::Reduce) => {
                    #path::job::reduce_chunk(&op, serializer, chunk, offset)
                }
            });
        }
    }

    Ok(quote! {
        #(#from_impls)*

        impl #impl_generics #path::operation::OpKind for #name #ty_generics #where_clause {
            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }

            #[allow(unreachable_patterns)]
            fn execute_chunk(
                self,
                kind: #path::job::JobKind,
                serializer: #path::serializer::Serializer,
                chunk: &[u8],
                offset: usize,
            ) -> #path::error::Result<::std::vec::Vec<u8>> {
                match (self, kind) {
                    #(#execute_arms)*
                    (op, kind) => Err(#path::error::Error::UnsupportedOperation {
                        op: #path::operation::OpKind::name(&op),
                        kind,
                    }),
                }
            }
        }
    })
}

/// See the [module level documentation](crate) for more information.
#[proc_macro_derive(OpKind, attributes(op, scatterfold))]
pub fn opkind_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}
