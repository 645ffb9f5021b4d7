//! Procedural macros for modelcheck
//!
//! This crate provides the macros used to declare async validators:
//!
//! - `#[async_validators]` - on an inherent `impl` block
//! - `#[field_validator("field", ...)]` - marks a field validator method
//! - `#[model_validator]` - marks a model validator method
//! - `#[derive(ModelFields)]` - field access by Rust field name
//!
//! The marker attributes are consumed by `#[async_validators]` and are not
//! macros of their own.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, ExprLit, FnArg, Ident, ImplItem,
    ImplItemFn, Index, ItemImpl, Lit, LitBool, LitStr, Meta, Pat, ReturnType, Token, Type,
};

/// Declare async validators on an inherent `impl` block.
///
/// Methods marked `#[field_validator(...)]` or `#[model_validator(...)]` become
/// the type's validators, in declaration order. The macro implements
/// `AsyncModel` (and therefore `AsyncValidate`) for the type, which must also
/// derive `ModelFields`.
///
/// Field names are the Rust field names. A name the struct does not have is
/// looked up in the serialized form instead and reads as `null` when absent.
///
/// # Validator parameters
///
/// Validators take `&self` and declare only the parameters they need, by name:
///
/// | name     | field validators                        | model validators |
/// |----------|-----------------------------------------|------------------|
/// | `value`  | field value (`&str`, `&Value` or any deserializable type) | - |
/// | `field`  | field name (`&str` or `String`)         | -                |
/// | `config` | `&ValidatorRecord`                      | `&ValidatorRecord` |
/// | `args`   | `FieldArgs`                             | `ModelArgs`      |
///
/// Validators return `Result<(), E>` with `E: Into<ValidatorError>`, and may be
/// `async` or not.
///
/// # Model options
///
/// - `base(field: Type, ...)` - inherit the validators of embedded base models.
///   Inherited field validators read the base's own fields; embed bases with
///   `#[serde(flatten)]` so model validators see them in the serialized input.
/// - `nested(field, ...)` - attributes holding nested models (directly, in
///   sequences, sets, maps, `Option`, `Box` or `Arc`).
///
/// # Example
///
/// ```rust,ignore
/// #[async_validators(base(person: Person), nested(address, pets))]
/// impl User {
///     /// Names must be unique.
///     #[field_validator("name", "nickname", table = "users")]
///     async fn unique(&self, value: &str, config: &ValidatorRecord) -> Result<(), ValidatorError> {
///         ensure!(value != "taken");
///         Ok(())
///     }
///
///     #[model_validator(skip_on_failure)]
///     async fn consistent(&self) -> Result<(), ValidatorError> {
///         ensure!(self.nickname.len() <= self.name.len(), "nickname too long");
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn async_validators(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = parse_macro_input!(attr as ModelOptions);
    let input = parse_macro_input!(item as ItemImpl);

    match expand(options, input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

/// Derive `ModelFields`: read struct fields by their Rust name.
///
/// Tuple struct fields are named by index. Fields whose type does not
/// implement `Serialize` are reported as unknown.
///
/// ```rust,ignore
/// #[derive(Serialize, ModelFields)]
/// #[serde(rename_all = "camelCase")]
/// struct Signup {
///     user_name: String,
///     #[serde(skip)]
///     referrer: Option<String>,
/// }
/// ```
#[proc_macro_derive(ModelFields)]
pub fn derive_model_fields(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    match expand_model_fields(input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

// ============================================
// Attribute arguments
// ============================================

struct BaseSpec {
    field: Ident,
    ty: Type,
}

impl Parse for BaseSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let field = input.parse()?;
        input.parse::<Token![:]>()?;
        let ty = input.parse()?;
        Ok(Self { field, ty })
    }
}

#[derive(Default)]
struct ModelOptions {
    bases: Vec<BaseSpec>,
    nested: Vec<Ident>,
}

impl Parse for ModelOptions {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut options = ModelOptions::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            let content;
            syn::parenthesized!(content in input);
            match key.to_string().as_str() {
                "base" => {
                    options.bases.extend(Punctuated::<BaseSpec, Token![,]>::parse_terminated(&content)?);
                }
                "nested" => {
                    options.nested.extend(Punctuated::<Ident, Token![,]>::parse_terminated(&content)?);
                }
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown option `{}`, expected `base(...)` or `nested(...)`", other),
                    ));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(options)
    }
}

/// One argument of a validator declaration.
enum DeclArg {
    Field(LitStr),
    Extra(Ident, Expr),
    Flag(Ident),
}

impl Parse for DeclArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(DeclArg::Field(input.parse()?));
        }
        let key: Ident = input.parse()?;
        if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Ok(DeclArg::Extra(key, input.parse()?))
        } else {
            Ok(DeclArg::Flag(key))
        }
    }
}

fn decl_args(attr: &Attribute) -> syn::Result<Vec<DeclArg>> {
    match &attr.meta {
        Meta::Path(_) => Ok(Vec::new()),
        Meta::List(list) => Ok(list
            .parse_args_with(Punctuated::<DeclArg, Token![,]>::parse_terminated)?
            .into_iter()
            .collect()),
        Meta::NameValue(nv) => Err(syn::Error::new(
            nv.span(),
            "expected `#[field_validator(\"field\", ...)]` or `#[model_validator(...)]`",
        )),
    }
}

// ============================================
// Validator declarations
// ============================================

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Field,
    Model,
}

impl Kind {
    fn attr_name(self) -> &'static str {
        match self {
            Kind::Field => "field_validator",
            Kind::Model => "model_validator",
        }
    }

    fn of(attr: &Attribute) -> Option<Kind> {
        // Loose matching on the last segment handles qualified paths
        let ident = attr.path().segments.last().map(|s| s.ident.to_string())?;
        match ident.as_str() {
            "field_validator" => Some(Kind::Field),
            "model_validator" => Some(Kind::Model),
            _ => None,
        }
    }
}

struct Declaration {
    kind: Kind,
    method: Ident,
    fields: Vec<LitStr>,
    extras: Vec<(String, Expr)>,
    skip_on_failure: bool,
    doc: Option<String>,
    call: TokenStream2,
}

fn parse_declaration(
    kind: Kind,
    attr: &Attribute,
    method: &ImplItemFn,
    self_ty: &Type,
) -> syn::Result<Declaration> {
    let name = &method.sig.ident;
    let mut fields = Vec::new();
    let mut extras = Vec::new();
    let mut skip_on_failure = false;

    let args = decl_args(attr)?;
    match kind {
        Kind::Field => {
            if args.is_empty() {
                return Err(syn::Error::new(
                    attr.span(),
                    format!(
                        "field validator `{}` must name at least one field, e.g. `#[field_validator(\"name\")]`",
                        name
                    ),
                ));
            }
            if !matches!(args[0], DeclArg::Field(_)) {
                return Err(syn::Error::new(
                    attr.span(),
                    "the first argument of `#[field_validator]` must be a field name",
                ));
            }
            for arg in args {
                match arg {
                    DeclArg::Field(lit) => {
                        if lit.value().trim().is_empty() {
                            return Err(syn::Error::new(lit.span(), "field name must not be empty"));
                        }
                        fields.push(lit);
                    }
                    DeclArg::Extra(key, value) => extras.push((key.to_string(), value)),
                    DeclArg::Flag(key) => {
                        return Err(syn::Error::new(
                            key.span(),
                            format!("unexpected `{}`, field validators take field names and `key = value` options", key),
                        ));
                    }
                }
            }
        }
        Kind::Model => {
            for arg in args {
                match arg {
                    DeclArg::Flag(key) if key == "skip_on_failure" => skip_on_failure = true,
                    DeclArg::Extra(key, value) if key == "skip_on_failure" => match value {
                        Expr::Lit(ExprLit {
                            lit: Lit::Bool(LitBool { value, .. }),
                            ..
                        }) => skip_on_failure = value,
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "`skip_on_failure` expects `true` or `false`",
                            ));
                        }
                    },
                    DeclArg::Extra(key, value) => extras.push((key.to_string(), value)),
                    DeclArg::Flag(key) => {
                        return Err(syn::Error::new(
                            key.span(),
                            format!("unexpected `{}`, model validators take `skip_on_failure` and `key = value` options", key),
                        ));
                    }
                    DeclArg::Field(lit) => {
                        return Err(syn::Error::new(
                            lit.span(),
                            "model validators do not take field names, use `#[field_validator]`",
                        ));
                    }
                }
            }
        }
    }

    Ok(Declaration {
        kind,
        method: name.clone(),
        fields,
        extras,
        skip_on_failure,
        doc: doc_text(&method.attrs),
        call: forwarding_call(kind, method, self_ty)?,
    })
}

fn doc_text(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit), ..
                }) => Some(lit.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    let doc = lines.join("\n").trim().to_string();
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

// ============================================
// Signature adapter
// ============================================

#[derive(Clone, Copy, PartialEq)]
enum Param {
    Value,
    Field,
    Config,
    Args,
}

impl Param {
    fn from_name(name: &str, kind: Kind) -> Option<Param> {
        match (name.trim_start_matches('_'), kind) {
            ("value", Kind::Field) => Some(Param::Value),
            ("field", Kind::Field) => Some(Param::Field),
            ("config", _) => Some(Param::Config),
            ("args", _) => Some(Param::Args),
            _ => None,
        }
    }
}

fn is_str_ref(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) => {
            matches!(&*reference.elem, Type::Path(path) if path.qself.is_none() && path.path.is_ident("str"))
        }
        _ => false,
    }
}

/// Build the expression calling `method` from the canonical arguments
/// `__model` and `__args`.
fn forwarding_call(kind: Kind, method: &ImplItemFn, self_ty: &Type) -> syn::Result<TokenStream2> {
    let sig = &method.sig;
    let name = &sig.ident;

    match sig.receiver() {
        None => {
            return Err(syn::Error::new(
                sig.span(),
                format!(
                    "validator `{}` must take `&self`; type-level validators are not supported",
                    name
                ),
            ));
        }
        Some(receiver) => {
            if receiver.mutability.is_some() {
                return Err(syn::Error::new(
                    receiver.span(),
                    format!("validator `{}` must take `&self`, not `&mut self`", name),
                ));
            }
            if receiver.reference.is_none() {
                return Err(syn::Error::new(
                    receiver.span(),
                    format!("validator `{}` must take `&self`", name),
                ));
            }
        }
    }

    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            format!("validator `{}` must not be generic", name),
        ));
    }

    if let ReturnType::Default = sig.output {
        return Err(syn::Error::new(
            sig.span(),
            format!(
                "validator `{}` must return `Result<(), E>` where `E: Into<ValidatorError>`",
                name
            ),
        ));
    }

    let mut seen = Vec::new();
    let mut bindings = Vec::new();
    let mut call_args = Vec::new();

    for (index, input) in sig.inputs.iter().enumerate() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let ident = match &*pat_type.pat {
            Pat::Ident(pat) => pat.ident.to_string(),
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "validator parameters must be plain names",
                ));
            }
        };
        let param = Param::from_name(&ident, kind).ok_or_else(|| {
            let allowed = match kind {
                Kind::Field => "`value`, `field`, `config` or `args`",
                Kind::Model => "`config` or `args`",
            };
            syn::Error::new(
                pat_type.pat.span(),
                format!(
                    "unrecognized parameter `{}` on {} `{}`, expected {}",
                    ident,
                    kind.attr_name().replace('_', " "),
                    name,
                    allowed
                ),
            )
        })?;
        if seen.contains(&param) {
            return Err(syn::Error::new(
                pat_type.pat.span(),
                format!("parameter `{}` is declared twice", ident),
            ));
        }
        seen.push(param);

        let local = format_ident!("__arg{}", index);
        let ty = &pat_type.ty;
        let binding = match param {
            Param::Value if is_str_ref(ty) => quote! { let #local = __args.decode_str()?; },
            Param::Value => match &**ty {
                Type::Reference(_) => quote! { let #local = __args.value(); },
                owned => quote! { let #local = __args.decode::<#owned>()?; },
            },
            Param::Field => quote! { let #local = ::core::convert::Into::into(__args.field()); },
            Param::Config => quote! { let #local = __args.config(); },
            Param::Args => quote! { let #local = __args; },
        };
        bindings.push(binding);
        call_args.push(local);
    }

    let awaited = sig.asyncness.map(|_| quote!(.await));
    Ok(quote! {
        #(#bindings)*
        <#self_ty>::#name(__model #(, #call_args)*) #awaited
            .map_err(::core::convert::Into::<::modelcheck::ValidatorError>::into)
    })
}

// ============================================
// Expansion
// ============================================

fn push_error(errors: &mut Option<syn::Error>, err: syn::Error) {
    match errors {
        Some(existing) => existing.combine(err),
        None => *errors = Some(err),
    }
}

fn strip_markers(method: &mut ImplItemFn) {
    method.attrs.retain(|attr| Kind::of(attr).is_none());
}

fn expand(options: ModelOptions, mut input: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "`#[async_validators]` goes on an inherent impl block, not a trait impl",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "`#[async_validators]` does not support generic models",
        ));
    }

    let self_ty = (*input.self_ty).clone();
    let mut declarations = Vec::new();
    let mut errors: Option<syn::Error> = None;

    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let mut field_seen = false;
        for attr in &method.attrs {
            let Some(kind) = Kind::of(attr) else {
                continue;
            };
            if kind == Kind::Field {
                if field_seen {
                    push_error(
                        &mut errors,
                        syn::Error::new(
                            attr.span(),
                            "name all fields in a single `#[field_validator(...)]`",
                        ),
                    );
                    continue;
                }
                field_seen = true;
            }
            match parse_declaration(kind, attr, method, &self_ty) {
                Ok(declaration) => declarations.push(declaration),
                Err(err) => push_error(&mut errors, err),
            }
        }
        strip_markers(method);
    }

    if let Some(err) = errors {
        return Err(err);
    }

    let mut wrappers = Vec::new();
    let mut descriptors = Vec::new();
    for declaration in &declarations {
        let method_name = declaration.method.to_string();
        let call = &declaration.call;
        let extras = declaration.extras.iter().map(|(key, value)| {
            quote! { .extra(#key, ::modelcheck::__private::serde_json::json!(#value)) }
        });
        let doc = declaration.doc.as_ref().map(|doc| quote! { .doc(#doc) });

        match declaration.kind {
            Kind::Field => {
                let wrapper = format_ident!("__field_validator_{}", declaration.method);
                let fields = &declaration.fields;
                wrappers.push(quote! {
                    fn #wrapper<'a>(
                        __model: &'a #self_ty,
                        __args: ::modelcheck::FieldArgs<'a>,
                    ) -> ::modelcheck::ValidatorFuture<'a> {
                        ::std::boxed::Box::pin(async move { #call })
                    }
                });
                descriptors.push(quote! {
                    ::modelcheck::FieldValidator::new(#method_name, #wrapper)
                        .fields([#(#fields),*])
                        #(#extras)*
                        #doc
                });
            }
            Kind::Model => {
                let wrapper = format_ident!("__model_validator_{}", declaration.method);
                let skip = declaration.skip_on_failure;
                wrappers.push(quote! {
                    fn #wrapper<'a>(
                        __model: &'a #self_ty,
                        __args: ::modelcheck::ModelArgs<'a>,
                    ) -> ::modelcheck::ValidatorFuture<'a> {
                        ::std::boxed::Box::pin(async move { #call })
                    }
                });
                descriptors.push(quote! {
                    ::modelcheck::ModelValidator::new(#method_name, #wrapper)
                        .skip_on_failure(#skip)
                        #(#extras)*
                        #doc
                });
            }
        }
    }

    let mut projections = Vec::new();
    let mut inherits = Vec::new();
    let mut base_children = Vec::new();
    for base in &options.bases {
        let field = &base.field;
        let ty = &base.ty;
        let project = format_ident!("__project_{}", field);
        projections.push(quote! {
            fn #project(model: &#self_ty) -> &#ty {
                &model.#field
            }
        });
        inherits.push(quote! {
            .inherit(<#ty as ::modelcheck::AsyncModel>::registry(), #project)
        });
        base_children.push(quote! {
            children.extend(<#ty as ::modelcheck::AsyncModel>::children(&self.#field));
        });
    }

    let nested = options.nested.iter().map(|field| {
        let name = field.to_string();
        quote! { children.nested(#name, &self.#field); }
    });

    let type_name = quote!(#self_ty).to_string();

    Ok(quote! {
        #input

        impl ::modelcheck::AsyncModel for #self_ty {
            fn registry() -> &'static ::modelcheck::ValidatorRegistry<Self> {
                #(#wrappers)*
                #(#projections)*

                static REGISTRY: ::std::sync::OnceLock<::modelcheck::ValidatorRegistry<#self_ty>> =
                    ::std::sync::OnceLock::new();
                REGISTRY.get_or_init(|| {
                    ::modelcheck::ValidatorRegistry::<#self_ty>::builder()
                        .read_fields(<#self_ty as ::modelcheck::ModelFields>::field_value)
                        #(#inherits)*
                        #(.declare(#descriptors))*
                        .build()
                        .unwrap_or_else(|err| {
                            panic!("invalid async validators on `{}`: {}", #type_name, err)
                        })
                })
            }

            fn children(&self) -> ::modelcheck::Children<'_> {
                #[allow(unused_mut)]
                let mut children = ::modelcheck::Children::new();
                #(#base_children)*
                #(#nested)*
                children
            }
        }

        impl ::modelcheck::Nested for #self_ty {
            fn collect_into<'a>(
                &'a self,
                path: ::modelcheck::Location,
                children: &mut ::modelcheck::Children<'a>,
            ) {
                children.push(path, self);
            }
        }
    })
}

fn expand_model_fields(input: DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.ident.span(),
            "`ModelFields` can only be derived for structs",
        ));
    };

    let arms = data.fields.iter().enumerate().map(|(index, field)| {
        let (name, member) = match &field.ident {
            Some(ident) => (ident.unraw().to_string(), quote!(#ident)),
            None => {
                let index = Index::from(index);
                (index.index.to_string(), quote!(#index))
            }
        };
        quote! {
            #name => (&::modelcheck::__private::FieldRef(&self.#member)).read_value(),
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::modelcheck::ModelFields for #ident #ty_generics #where_clause {
            fn field_value(&self, name: &str) -> ::modelcheck::FieldValue {
                #[allow(unused_imports)]
                use ::modelcheck::__private::{ReadOpaque as _, ReadSerialized as _};
                match name {
                    #(#arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}
