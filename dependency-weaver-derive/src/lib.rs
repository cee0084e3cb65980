//! Derive macro for dependency-weaver
//!
//! `#[derive(Component)]` generates the `Component` implementation of a struct
//! with named fields from attributes:
//!
//! - `#[inject]` - inject the binding named like the field
//! - `#[inject(name = "db")]` - inject the binding `db`
//! - `#[inject(pattern = "^plugin\\.")]` - inject every matching binding
//! - `#[inject(name = "session", alias = "shared")]` - template under an alias
//! - `#[joinpoints]` - the field holding the `Joinpoints` table
//!
//! and a struct-level attribute:
//!
//! ```text
//! #[component(
//!     methods(fetch, store),
//!     intercept(marker = TIMED, methods(fetch)),
//!     intercept(marker = LOGGED, pattern = "^st"),
//!     post_init = after_wiring,
//! )]
//! ```
//!
//! Name requests go into `Option<Arc<T>>` fields, pattern requests into
//! `Vec<Arc<T>>` fields. Every field starts out as `Default::default()`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dependency_weaver::{Component, Joinpoints, Marker, Result};
//! use once_cell::sync::Lazy;
//! use std::sync::Arc;
//!
//! static TIMED: Lazy<Marker> = Lazy::new(|| Marker::new("timed"));
//!
//! #[derive(Default, Component)]
//! #[component(methods(fetch), intercept(marker = TIMED, methods(fetch)))]
//! struct UserService {
//!     #[inject(name = "database")]
//!     db: Option<Arc<Database>>,
//!     #[inject(pattern = "^plugin\\.")]
//!     plugins: Vec<Arc<Plugin>>,
//!     #[joinpoints]
//!     joinpoints: Joinpoints,
//!     // Not injected
//!     request_count: u64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, Path, parse_macro_input};

/// Derive macro for the `Component` trait.
///
/// See the crate documentation for the supported attributes.
#[proc_macro_derive(Component, attributes(inject, joinpoints, component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Named-field and unit structs only
    let empty = syn::punctuated::Punctuated::new();
    let (fields, unit) = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => (&fields.named, false),
            Fields::Unit => (&empty, true),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Component can only be derived for structs with named fields or unit structs",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Component can only be derived for structs",
            ));
        }
    };

    let options = ComponentOptions::from_attrs(&input.attrs)?;

    let mut requests = Vec::new();
    let mut field_inits = Vec::new();
    let mut assign_arms = Vec::new();
    let mut joinpoints: Option<&Ident> = None;

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let key = field_name.to_string();

        field_inits.push(quote! {
            #field_name: ::std::default::Default::default()
        });

        if has_attr(&field.attrs, "joinpoints") {
            if joinpoints.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may be marked #[joinpoints]",
                ));
            }
            joinpoints = Some(field_name);
        }

        let Some(inject) = InjectAttr::from_attrs(&field.attrs)? else {
            continue;
        };

        match inject {
            InjectAttr::Name { name, alias: None } => {
                let name = name.unwrap_or_else(|| key.clone());
                requests.push(quote! {
                    let descriptor = descriptor.inject_named(#key, #name);
                });
                assign_arms.push(quote! {
                    #key => self.#field_name = value.one()?,
                });
            }
            InjectAttr::Name { name, alias: Some(alias) } => {
                let name = name.unwrap_or_else(|| key.clone());
                requests.push(quote! {
                    let descriptor = descriptor.inject_aliased(#key, #name, #alias);
                });
                assign_arms.push(quote! {
                    #key => self.#field_name = value.one()?,
                });
            }
            InjectAttr::Pattern(pattern) => {
                requests.push(quote! {
                    let descriptor = descriptor.inject_matching(#key, #pattern)?;
                });
                assign_arms.push(quote! {
                    #key => self.#field_name = value.many()?,
                });
            }
        }
    }

    let members = options.methods.iter().map(|method| {
        let method = method.to_string();
        quote! { let descriptor = descriptor.method(#method); }
    });

    let pointcuts = options.intercepts.iter().map(|intercept| {
        let marker = &intercept.marker;
        match &intercept.target {
            PointcutAttr::Methods(methods) => {
                let methods = methods.iter().map(Ident::to_string);
                quote! {
                    let descriptor = descriptor.intercept(*#marker, [#(#methods),*]);
                }
            }
            PointcutAttr::Pattern(pattern) => quote! {
                let descriptor = descriptor.intercept_matching(*#marker, #pattern)?;
            },
        }
    });

    let assign = if assign_arms.is_empty() {
        quote! {}
    } else {
        quote! {
            fn assign(
                &mut self,
                key: &str,
                value: ::dependency_weaver::Resolved,
            ) -> ::dependency_weaver::Result<()> {
                match key {
                    #(#assign_arms)*
                    _ => {}
                }
                Ok(())
            }
        }
    };

    let joinpoints = joinpoints.map(|field| {
        quote! {
            fn joinpoints(&mut self) -> ::std::option::Option<&mut ::dependency_weaver::Joinpoints> {
                Some(&mut self.#field)
            }
        }
    });

    let post_init = options.post_init.as_ref().map(|hook| {
        quote! {
            fn post_init(&mut self) -> ::dependency_weaver::Result<()> {
                self.#hook()
            }
        }
    });

    let construct = if unit {
        quote! { Self }
    } else {
        quote! { Self { #(#field_inits),* } }
    };

    Ok(quote! {
        impl #impl_generics ::dependency_weaver::Component for #name #ty_generics #where_clause {
            fn descriptor() -> ::dependency_weaver::Result<::dependency_weaver::Descriptor> {
                let descriptor = ::dependency_weaver::Descriptor::new();
                #(#requests)*
                #(#members)*
                #(#pointcuts)*
                Ok(descriptor)
            }

            fn construct(_args: ::dependency_weaver::Args) -> ::dependency_weaver::Result<Self> {
                Ok(#construct)
            }

            #assign
            #joinpoints
            #post_init
        }
    })
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

// =============================================================================
// Field attributes
// =============================================================================

enum InjectAttr {
    Name {
        name: Option<String>,
        alias: Option<String>,
    },
    Pattern(String),
}

impl InjectAttr {
    /// Find and parse the #[inject] attribute
    fn from_attrs(attrs: &[Attribute]) -> syn::Result<Option<Self>> {
        let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("inject")) else {
            return Ok(None);
        };

        if attr.meta.require_path_only().is_ok() {
            return Ok(Some(InjectAttr::Name {
                name: None,
                alias: None,
            }));
        }

        let mut name = None;
        let mut alias = None;
        let mut pattern = None;
        attr.parse_nested_meta(|meta| {
            let value = || -> syn::Result<String> { Ok(meta.value()?.parse::<LitStr>()?.value()) };
            if meta.path.is_ident("name") {
                name = Some(value()?);
            } else if meta.path.is_ident("alias") {
                alias = Some(value()?);
            } else if meta.path.is_ident("pattern") {
                pattern = Some(value()?);
            } else {
                return Err(meta.error("expected `name`, `alias` or `pattern`"));
            }
            Ok(())
        })?;

        match (name, alias, pattern) {
            (None, None, Some(pattern)) => Ok(Some(InjectAttr::Pattern(pattern))),
            (_, _, Some(_)) => Err(syn::Error::new_spanned(
                attr,
                "`pattern` cannot be combined with `name` or `alias`",
            )),
            (name, alias, None) => Ok(Some(InjectAttr::Name { name, alias })),
        }
    }
}

// =============================================================================
// Struct attribute
// =============================================================================

enum PointcutAttr {
    Methods(Vec<Ident>),
    Pattern(LitStr),
}

struct InterceptAttr {
    marker: Path,
    target: PointcutAttr,
}

#[derive(Default)]
struct ComponentOptions {
    methods: Vec<Ident>,
    intercepts: Vec<InterceptAttr>,
    post_init: Option<Ident>,
}

impl ComponentOptions {
    fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut options = ComponentOptions::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("component")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("methods") {
                    options.methods.extend(parse_idents(&meta)?);
                } else if meta.path.is_ident("intercept") {
                    options.intercepts.push(parse_intercept(&meta)?);
                } else if meta.path.is_ident("post_init") {
                    options.post_init = Some(meta.value()?.parse()?);
                } else {
                    return Err(meta.error("expected `methods`, `intercept` or `post_init`"));
                }
                Ok(())
            })?;
        }

        Ok(options)
    }
}

fn parse_idents(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<Vec<Ident>> {
    let mut idents = Vec::new();
    meta.parse_nested_meta(|nested| {
        idents.push(nested.path.require_ident()?.clone());
        Ok(())
    })?;
    Ok(idents)
}

fn parse_intercept(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<InterceptAttr> {
    let mut marker = None;
    let mut target = None;

    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("marker") {
            marker = Some(nested.value()?.parse::<Path>()?);
        } else if nested.path.is_ident("methods") {
            target = Some(PointcutAttr::Methods(parse_idents(&nested)?));
        } else if nested.path.is_ident("pattern") {
            target = Some(PointcutAttr::Pattern(nested.value()?.parse()?));
        } else {
            return Err(nested.error("expected `marker`, `methods` or `pattern`"));
        }
        Ok(())
    })?;

    match (marker, target) {
        (Some(marker), Some(target)) => Ok(InterceptAttr { marker, target }),
        (None, _) => Err(meta.error("intercept requires `marker = PATH`")),
        (_, None) => Err(meta.error("intercept requires `methods(..)` or `pattern = \"..\"`")),
    }
}
