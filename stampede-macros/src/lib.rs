use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ItemFn;

/// Proc macro to denote a Transaction
///
/// Wraps the body of an `async fn` returning `Result<T, E>` so that its latency and outcome are
/// recorded under `stampede_<fn name>_{success,error,latency}` and counted towards the run of the
/// calling virtual user.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// struct Shopper {
///     client: reqwest::Client,
/// }
///
/// impl Shopper {
///     #[transaction]
///     async fn browse(&mut self) -> Result<(), reqwest::Error> {
///         self.client.get("http://localhost:3000/").send().await?;
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn transaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    transaction_internal(attr, item).into()
}

fn transaction_internal(_attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[transaction] requires an async fn")
            .to_compile_error();
    }

    let name = &sig.ident;
    let stmts = &block.stmts;

    quote! {
        #(#attrs)* #vis #sig {
            ::stampede::transaction::transaction_hook(
                ::stampede::core::generate_labels!(#name),
                async move {
                    #(#stmts)*
                },
            )
            .await
        }
    }
}
