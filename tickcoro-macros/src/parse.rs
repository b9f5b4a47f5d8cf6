use proc_macro2::{Span, TokenStream, TokenTree};
use quote::ToTokens;
use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Signature, Visibility, braced};

pub(crate) fn parse_string(lit: &syn::Lit, span: Span, field: &str) -> Result<String, syn::Error> {
    match lit {
        syn::Lit::Str(s) => Ok(s.value()),
        _ => Err(syn::Error::new(
            span,
            format!("`{field}` expects a string literal."),
        )),
    }
}

pub(crate) fn parse_u64(lit: &syn::Lit, span: Span, field: &str) -> Result<u64, syn::Error> {
    let syn::Lit::Int(int) = lit else {
        return Err(syn::Error::new(
            span,
            format!("`{field}` expects an integer literal."),
        ));
    };

    int.base10_parse::<u64>()
        .map_err(|e| syn::Error::new(span, format!("invalid value for `{field}`: {e}")))
}

/// Matches `#[test]`, `#[core::prelude::*::test]` and `#[std::prelude::*::test]`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let syn::Meta::Path(path) = &attr.meta else {
        return false;
    };

    if path.leading_colon.is_none() && path.is_ident("test") {
        return true;
    }

    let segments: Vec<_> = path.segments.iter().collect();
    if segments.len() != 4 || segments.iter().any(|s| !s.arguments.is_none()) {
        return false;
    }

    (segments[0].ident == "core" || segments[0].ident == "std")
        && segments[1].ident == "prelude"
        && segments[3].ident == "test"
}

pub(crate) fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}

/// Function item whose body is kept as raw statements.
///
/// Only statement boundaries are parsed, so a body that does not compile still
/// expands to something close to what the user wrote.
pub(crate) struct ItemFn {
    pub(crate) outer_attrs: Vec<Attribute>,
    pub(crate) inner_attrs: Vec<Attribute>,
    pub(crate) vis: Visibility,
    pub(crate) sig: Signature,
    pub(crate) brace_token: syn::token::Brace,

    /// Each with its terminating `;`, if any.
    pub(crate) stmts: Vec<TokenStream>,
}

impl ItemFn {
    pub(crate) fn attrs(&self) -> impl Iterator<Item = &Attribute> {
        self.outer_attrs.iter().chain(&self.inner_attrs)
    }

    /// The original body, braces included.
    pub(crate) fn body(&self) -> TokenStream {
        let mut tokens = TokenStream::new();
        self.brace_token.surround(&mut tokens, |tokens| {
            tokens.extend(self.stmts.iter().cloned());
        });
        tokens
    }

    /// Span of the first and last token of the last statement.
    pub(crate) fn last_stmt_spans(&self) -> (Span, Span) {
        let mut tokens = self.stmts.last().cloned().unwrap_or_default().into_iter();
        let start = tokens.next().map_or_else(Span::call_site, |t| t.span());
        let end = tokens.last().map_or(start, |t| t.span());
        (start, end)
    }

    /// Re-emits the function with `generated_attrs` added and `block` as its
    /// body.
    pub(crate) fn into_tokens(self, generated_attrs: TokenStream, block: TokenStream) -> TokenStream {
        let mut tokens = TokenStream::new();
        for attr in self.outer_attrs {
            attr.to_tokens(&mut tokens);
        }

        // Inner attributes cannot stay on the generated block.
        for mut attr in self.inner_attrs {
            attr.style = syn::AttrStyle::Outer;
            attr.to_tokens(&mut tokens);
        }

        generated_attrs.to_tokens(&mut tokens);
        self.vis.to_tokens(&mut tokens);
        self.sig.to_tokens(&mut tokens);
        self.brace_token
            .surround(&mut tokens, |tokens| block.to_tokens(tokens));

        tokens
    }
}

impl Parse for ItemFn {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let outer_attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;
        let sig: Signature = input.parse()?;

        let content;
        let brace_token = braced!(content in input);
        let inner_attrs = Attribute::parse_inner(&content)?;

        let mut stmts = Vec::new();
        let mut current = TokenStream::new();
        while !content.is_empty() {
            if let Some(semi) = content.parse::<Option<syn::Token![;]>>()? {
                semi.to_tokens(&mut current);
                stmts.push(std::mem::take(&mut current));
                continue;
            }
            current.extend([content.parse::<TokenTree>()?]);
        }
        if !current.is_empty() {
            stmts.push(current);
        }

        Ok(ItemFn {
            outer_attrs,
            inner_attrs,
            vis,
            sig,
            brace_token,
            stmts,
        })
    }
}
