//! Derive macros for `pgseal`.
//!
//! `#[derive(Encryptable)]` turns `#[encryptable(...)]` declarations into a
//! schema and typed accessors for each encrypted attribute.

#![warn(clippy::pedantic, clippy::nursery)]

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, DeriveInput, Ident, Token};

/// Derive macro declaring encrypted attributes on a record type.
///
/// The type must implement `pgseal::attribute::EncryptedRecord`. For every
/// declared attribute `name` the derive generates:
///
/// - `async fn name(&mut self, engine)`: reads and decrypts the value
/// - `async fn set_name(&mut self, engine, value)`: encrypts and assigns
/// - `async fn has_name(&mut self, engine)`: presence check
/// - `fn find_by_name(config, value)`: equality search filter
///
/// Attributes may be declared across several `#[encryptable]` lines; a name
/// declared twice is kept once.
///
/// The schema is built on first use of the type. Call
/// `pgseal::filter::register_type::<T>()` at start-up so the declared names
/// are filtered from logged parameters before any record is touched.
///
/// # Example
///
/// ```rust,ignore
/// use pgseal::Encryptable;
///
/// #[derive(Encryptable)]
/// #[encryptable(message, something_else)]
/// #[encryptable(foo)]
/// struct Message {
///     columns: HashMap<String, Option<String>>,
///     cache: DecryptedCache,
/// }
/// ```
#[proc_macro_derive(Encryptable, attributes(encryptable))]
pub fn derive_encryptable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn declared_names(input: &DeriveInput) -> syn::Result<Vec<Ident>> {
    let mut names: Vec<Ident> = Vec::new();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("encryptable")) {
        let list = attr.parse_args_with(Punctuated::<Ident, Token![,]>::parse_terminated)?;
        if list.is_empty() {
            return Err(syn::Error::new_spanned(attr, "expected at least one attribute name"));
        }
        for ident in list {
            if !names.iter().any(|seen| seen.unraw() == ident.unraw()) {
                names.push(ident);
            }
        }
    }

    if names.is_empty() {
        return Err(syn::Error::new(
            Span::call_site(),
            "#[derive(Encryptable)] requires #[encryptable(name, ...)]",
        ));
    }
    Ok(names)
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let names = declared_names(input)?;
    let ty = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let literals: Vec<String> = names.iter().map(|n| n.unraw().to_string()).collect();
    let accessors = names.iter().zip(&literals).map(|(ident, literal)| {
        let plain = ident.unraw();
        let setter = format_ident!("set_{}", plain);
        let predicate = format_ident!("has_{}", plain);
        let finder = format_ident!("find_by_{}", plain);
        let read_doc = format!("Returns the decrypted `{literal}`.");
        let write_doc = format!("Assigns `{literal}`.");
        let has_doc = format!("Returns `true` if `{literal}` holds a present value.");
        let find_doc = format!("Builds the filter matching records whose `{literal}` equals `value`.");

        quote! {
            #[doc = #read_doc]
            ///
            /// # Errors
            ///
            /// Returns error if decryption fails.
            pub async fn #ident<C>(
                &mut self,
                engine: &::pgseal::engine::Engine<'_, C>,
            ) -> ::core::result::Result<::pgseal::value::Value, ::pgseal::error::Error>
            where
                C: ::pgseal::connection::Connection + ?Sized,
            {
                let attribute = Self::__pgseal_attribute(#literal);
                engine.read(self, &attribute).await
            }

            #[doc = #write_doc]
            ///
            /// # Errors
            ///
            /// Returns error if encryption or hashing fails.
            pub async fn #setter<C>(
                &mut self,
                engine: &::pgseal::engine::Engine<'_, C>,
                value: impl ::core::convert::Into<::pgseal::value::Value>,
            ) -> ::core::result::Result<(), ::pgseal::error::Error>
            where
                C: ::pgseal::connection::Connection + ?Sized,
            {
                let attribute = Self::__pgseal_attribute(#literal);
                engine.write(self, &attribute, value.into()).await
            }

            #[doc = #has_doc]
            ///
            /// # Errors
            ///
            /// Returns error if decryption fails.
            pub async fn #predicate<C>(
                &mut self,
                engine: &::pgseal::engine::Engine<'_, C>,
            ) -> ::core::result::Result<bool, ::pgseal::error::Error>
            where
                C: ::pgseal::connection::Connection + ?Sized,
            {
                let attribute = Self::__pgseal_attribute(#literal);
                engine.is_present(self, &attribute).await
            }

            #[doc = #find_doc]
            ///
            /// # Errors
            ///
            /// Returns error if the value cannot be serialized.
            pub fn #finder(
                config: &::pgseal::config::Config,
                value: impl ::core::convert::Into<::pgseal::value::Value>,
            ) -> ::core::result::Result<::pgseal::scope::Filter, ::pgseal::error::Error> {
                let attribute = Self::__pgseal_attribute(#literal);
                ::pgseal::search::find_by(config, &attribute, value)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::pgseal::attribute::Encryptable for #ty #ty_generics #where_clause {
            fn schema() -> &'static ::pgseal::attribute::Schema {
                static SCHEMA: ::std::sync::OnceLock<::pgseal::attribute::Schema> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| ::pgseal::attribute::Schema::new().declare([#(#literals),*]))
            }
        }

        impl #impl_generics #ty #ty_generics #where_clause {
            fn __pgseal_attribute(name: &str) -> ::pgseal::attribute::EncryptedAttribute {
                let schema = <Self as ::pgseal::attribute::Encryptable>::schema();
                schema
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| ::pgseal::attribute::EncryptedAttribute::new(name))
            }

            #(#accessors)*
        }
    })
}
