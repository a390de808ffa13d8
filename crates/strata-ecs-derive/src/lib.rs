//! Derive macros for Strata ECS components and tags.
//!
//! `#[derive(Component)]` implements `strata_ecs::Component` and rejects field types
//! that would make the component something other than a flat, copyable value.
//! `#[derive(Tag)]` implements `strata_ecs::Tag` for data-less marker types.
//!
//! # Forbidden field types
//!
//! - `Vec<T>`, `VecDeque<T>`, `LinkedList<T>`, `BinaryHeap<T>` - one entity per item, linked
//!   with a link-indexed component or placed under a tree parent
//! - `HashMap`, `HashSet`, `BTreeMap`, `BTreeSet` - same as above
//! - `String` - fixed-size arrays or interned ids
//! - `Box<T>`, `Rc<T>`, `Arc<T>` - entity references or scripts
//! - `Mutex`, `RwLock`, `Cell`, `RefCell` - the store owns mutation
//! - channel `Sender` / `Receiver` - change events
//! - references, raw pointers, trait objects, `impl Trait`
//!
//! # Allowed field types
//!
//! - Primitives: `i8`..`i128`, `u8`..`u128`, `f32`, `f64`, `bool`, `char`
//! - Fixed arrays `[T; N]`, tuples and `Option<T>` of allowed types
//! - Other `#[derive(Component)]` types and `EntityId`

use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::{Data, DeriveInput, Fields, GenericArgument, Path, PathArguments, Type, spanned::Spanned};

/// Forbidden type names and the message shown for each.
const FORBIDDEN_TYPES: &[(&str, &str)] = &[
    (
        "Vec",
        "Vec<T> is not allowed in components.\n\
         - Create one entity per item and point it back with a link-indexed component\n\
         - Or attach the items as children with store.add_child(parent, item)",
    ),
    (
        "VecDeque",
        "VecDeque<T> is not allowed in components.\n\
         - Create one entity per item with a sequence field for ordering\n\
         - Or keep the items as ordered children of this entity",
    ),
    (
        "LinkedList",
        "LinkedList<T> is not allowed in components. Use ordered child entities instead.",
    ),
    (
        "BinaryHeap",
        "BinaryHeap<T> is not allowed in components.\n\
         - Store items as entities with a range-indexed priority component\n\
         - Query them with store.entities_in_range::<Priority>(..)",
    ),
    (
        "HashMap",
        "HashMap<K, V> is not allowed in components.\n\
         - Store each entry as an entity with a value-indexed key component\n\
         - Look entries up with store.entities_with_value(&key)",
    ),
    (
        "HashSet",
        "HashSet<T> is not allowed in components. Use tags or value-indexed components instead.",
    ),
    (
        "BTreeMap",
        "BTreeMap<K, V> is not allowed in components.\n\
         - Store each entry as an entity with a range-indexed key component",
    ),
    (
        "BTreeSet",
        "BTreeSet<T> is not allowed in components. Use a range-indexed component instead.",
    ),
    (
        "String",
        "String is not allowed in components.\n\
         - Use a fixed-size array such as [u8; 32]\n\
         - Or an interned id such as NameId(u64)",
    ),
    (
        "Box",
        "Box<T> is not allowed in components.\n\
         - Split large data into several components\n\
         - For behaviour objects, attach a script with store.add_script(entity, script)",
    ),
    (
        "Rc",
        "Rc<T> is not allowed in components. Store shared data on its own entity and reference its EntityId.",
    ),
    (
        "Arc",
        "Arc<T> is not allowed in components. Store shared data on its own entity and reference its EntityId.",
    ),
    (
        "Mutex",
        "Mutex<T> is not allowed in components. The store owns all component mutation.",
    ),
    (
        "RwLock",
        "RwLock<T> is not allowed in components. The store owns all component mutation.",
    ),
    (
        "RefCell",
        "RefCell<T> is not allowed in components. Use store.get_component_mut or set_component.",
    ),
    (
        "Cell",
        "Cell<T> is not allowed in components. Use store.get_component_mut or set_component.",
    ),
    (
        "Sender",
        "Channel Sender is not allowed in components. Subscribe to store change events instead.",
    ),
    (
        "Receiver",
        "Channel Receiver is not allowed in components. Subscribe to store change events instead.",
    ),
];

/// Derive macro for ECS components.
///
/// The type must also implement `Default` and `Clone`.
///
/// ```ignore
/// #[derive(Component, Default, Clone, Copy)]
/// struct Position { x: f32, y: f32 }
/// ```
#[proc_macro_derive(Component)]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let mut errors = Vec::new();

    match &input.data {
        Data::Struct(data) => {
            check_fields(&data.fields, &mut errors);
        }
        Data::Enum(data) => {
            for variant in &data.variants {
                check_fields(&variant.fields, &mut errors);
            }
        }
        Data::Union(_) => {
            errors.push(quote_spanned! {
                input.span() =>
                compile_error!("Unions cannot derive Component. Use a struct or enum instead.");
            });
        }
    }

    if !errors.is_empty() {
        return TokenStream::from(errors.into_iter().collect::<proc_macro2::TokenStream>());
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::strata_ecs::Component for #name #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

/// Derive macro for ECS tags.
///
/// Tags classify entities and carry no data, so only unit structs and structs
/// without fields are accepted.
///
/// ```ignore
/// #[derive(Tag)]
/// struct Selected;
/// ```
#[proc_macro_derive(Tag)]
pub fn derive_tag(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let has_fields = match &input.data {
        Data::Struct(data) => !data.fields.is_empty(),
        Data::Enum(_) | Data::Union(_) => true,
    };

    if has_fields {
        return TokenStream::from(quote_spanned! {
            input.span() =>
            compile_error!("Tags cannot carry data. Use a unit struct, or derive Component instead.");
        });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::strata_ecs::Tag for #name #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

fn check_fields(fields: &Fields, errors: &mut Vec<proc_macro2::TokenStream>) {
    for field in fields {
        check_type(&field.ty, errors);
    }
}

fn check_type(ty: &Type, errors: &mut Vec<proc_macro2::TokenStream>) {
    match ty {
        Type::Path(type_path) => {
            check_type_path(&type_path.path, ty.span(), errors);
        }
        Type::Array(array) => {
            check_type(&array.elem, errors);
        }
        Type::Tuple(tuple) => {
            for elem in &tuple.elems {
                check_type(elem, errors);
            }
        }
        Type::Paren(paren) => {
            check_type(&paren.elem, errors);
        }
        Type::Group(group) => {
            check_type(&group.elem, errors);
        }
        Type::Reference(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("References are not allowed in components. Components are owned values.");
            });
        }
        Type::Ptr(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Raw pointers are not allowed in components. Reference other entities by EntityId.");
            });
        }
        Type::TraitObject(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Trait objects (dyn Trait) are not allowed in components.\n\
                               Use tags for classification or attach a script for behaviour.");
            });
        }
        Type::ImplTrait(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("impl Trait is not allowed in component fields. Use concrete types.");
            });
        }
        _ => {}
    }
}

fn check_type_path(
    path: &Path,
    span: proc_macro2::Span,
    errors: &mut Vec<proc_macro2::TokenStream>,
) {
    let Some(segment) = path.segments.last() else {
        return;
    };
    let type_name = segment.ident.to_string();

    if let Some((_, message)) = FORBIDDEN_TYPES
        .iter()
        .find(|(forbidden, _)| type_name == *forbidden)
    {
        let error_msg = format!("Component field uses forbidden type `{type_name}`.\n\n{message}");
        errors.push(quote_spanned! {
            span =>
            compile_error!(#error_msg);
        });
        return;
    }

    if let PathArguments::AngleBracketed(args) = &segment.arguments {
        for arg in &args.args {
            if let GenericArgument::Type(inner_ty) = arg {
                check_type(inner_ty, errors);
            }
        }
    }
}
