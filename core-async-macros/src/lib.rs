use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, ItemFn, Lit, Meta, Token};

/// Runs an `async fn` test on a fresh runtime.
///
/// `#[core_async::test]` uses a current-thread runtime;
/// `#[core_async::test(worker_threads = 4)]` uses a multi-threaded one.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    let worker_threads = match parse_worker_threads(TokenStream2::from(attr)) {
        Ok(value) => value,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sig = input.sig.clone();
    sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let body = match worker_threads {
        Some(threads) => quote! {
            core_async::runtime::block_on_multi_thread(#threads, async move #block)
        },
        None => quote! {
            core_async::runtime::block_on(async move #block)
        },
    };

    let test_attr = match kind {
        MacroKind::Test => quote!(#[test]),
        MacroKind::Main => quote!(),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            #body
        }
    }
    .into()
}

fn parse_worker_threads(attr: TokenStream2) -> syn::Result<Option<usize>> {
    if attr.is_empty() {
        return Ok(None);
    }

    let args = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(attr)?;
    let mut worker_threads = None;

    for arg in args {
        match arg {
            Meta::NameValue(pair) if pair.path.is_ident("worker_threads") => {
                let Expr::Lit(expr) = &pair.value else {
                    return Err(syn::Error::new_spanned(
                        &pair.value,
                        "worker_threads expects an integer literal",
                    ));
                };
                let Lit::Int(value) = &expr.lit else {
                    return Err(syn::Error::new_spanned(
                        &expr.lit,
                        "worker_threads expects an integer literal",
                    ));
                };
                worker_threads = Some(value.base10_parse::<usize>()?);
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "unsupported argument; only `worker_threads = N` is accepted",
                ))
            }
        }
    }

    Ok(worker_threads)
}
