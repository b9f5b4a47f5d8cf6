use crate::parse::*;
use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::parse::Parser;
use syn::spanned::Spanned;

type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

const KNOWN_ARGS: &str = "`tick_interval_ms`, `thread_name`";

#[derive(Default)]
struct Config {
    tick_interval_ms: Option<u64>,
    thread_name: Option<String>,
}

impl Config {
    fn set_tick_interval_ms(&mut self, lit: &syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.tick_interval_ms.is_some() {
            return Err(syn::Error::new(span, "`tick_interval_ms` set multiple times."));
        }
        self.tick_interval_ms = Some(parse_u64(lit, span, "tick_interval_ms")?);
        Ok(())
    }

    fn set_thread_name(&mut self, lit: &syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.thread_name.is_some() {
            return Err(syn::Error::new(span, "`thread_name` set multiple times."));
        }
        self.thread_name = Some(parse_string(lit, span, "thread_name")?);
        Ok(())
    }
}

pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        Err(syn::Error::new_spanned(
            &input.sig.ident,
            "the main function cannot accept arguments",
        ))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args))
    };

    // Still expand on error, so IDEs keep working on the body.
    match config {
        Ok(config) => expand(input, false, config),
        Err(e) => token_stream_with_error(expand(input, false, Config::default()), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if let Some(attr) = input.attrs().find(|attr| is_test_attribute(attr)) {
        Err(syn::Error::new_spanned(
            attr,
            "second test attribute is supplied, consider removing it",
        ))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args))
    };

    match config {
        Ok(config) => expand(input, true, config),
        Err(e) => token_stream_with_error(expand(input, true, Config::default()), e),
    }
}

fn build_config(input: &ItemFn, args: AttributeArgs) -> Result<Config, syn::Error> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            input.sig.fn_token,
            "the `async` keyword is missing from the function declaration",
        ));
    }

    let mut config = Config::default();
    for arg in args {
        let namevalue = match arg {
            syn::Meta::NameValue(namevalue) => namevalue,
            other => {
                let msg = format!("expected `name = value`, one of: {KNOWN_ARGS}");
                return Err(syn::Error::new_spanned(other, msg));
            }
        };

        let Some(ident) = namevalue.path.get_ident().map(ToString::to_string) else {
            return Err(syn::Error::new_spanned(&namevalue, "Must have specified ident"));
        };
        let syn::Expr::Lit(syn::ExprLit { lit, .. }) = &namevalue.value else {
            return Err(syn::Error::new_spanned(&namevalue.value, "Must be a literal"));
        };

        match ident.as_str() {
            "tick_interval_ms" => config.set_tick_interval_ms(lit, lit.span())?,
            "thread_name" => config.set_thread_name(lit, lit.span())?,
            name => {
                let msg = format!("Unknown attribute {name} is specified; expected one of: {KNOWN_ARGS}");
                return Err(syn::Error::new_spanned(&namevalue, msg));
            }
        }
    }

    Ok(config)
}

fn expand(mut input: ItemFn, is_test: bool, config: Config) -> TokenStream {
    input.sig.asyncness = None;

    // Type mismatches get reported on the last statement.
    let (start_span, end_span) = input.last_stmt_spans();

    let mut world = quote_spanned! {start_span=> tickcoro::runtime::Builder::new() };
    if let Some(ms) = config.tick_interval_ms {
        world = quote_spanned! {start_span=>
            #world.tick_interval(::std::time::Duration::from_millis(#ms))
        };
    } else if is_test {
        // Tests tick as fast as they can.
        world = quote_spanned! {start_span=>
            #world.tick_interval(::std::time::Duration::ZERO)
        };
    }
    if let Some(name) = config.thread_name {
        world = quote_spanned! {start_span=> #world.thread_name(#name) };
    }

    let generated_attrs = if is_test {
        quote! { #[::core::prelude::v1::test] }
    } else {
        quote! {}
    };

    let output_type = match &input.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => quote! { #ty },
    };

    // The body runs as the root coroutine, which may hop threads.
    let body = input.body();
    let block = quote_spanned! {end_span=>
        let body: ::std::pin::Pin<
            ::std::boxed::Box<dyn ::std::future::Future<Output = #output_type> + ::std::marker::Send + 'static>
        > = ::std::boxed::Box::pin(async move #body);

        #[allow(clippy::expect_used, clippy::needless_return)]
        {
            return #world
                .try_build()
                .expect("Failed building the World")
                .block_on(body);
        }
    };

    input.into_tokens(generated_attrs, block)
}
