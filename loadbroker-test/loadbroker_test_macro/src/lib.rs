/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Runs an `async fn` test on a multi-threaded Tokio runtime inside a tracing
/// span named after the test, failing it if it runs past its deadline.
///
/// ```rust,ignore
/// #[loadbroker_test(timeout_ms = 5_000)]
/// async fn routes_reply() -> anyhow::Result<()> { Ok(()) }
/// ```
#[proc_macro_attribute]
pub fn loadbroker_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut timeout_ms = DEFAULT_TIMEOUT_MS;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("timeout_ms") {
            let value: LitInt = meta.value()?.parse()?;
            timeout_ms = value.base10_parse()?;
            Ok(())
        } else {
            Err(meta.error("unsupported loadbroker_test property"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    let async_name = syn::Ident::new(&format!("__{name}_async"), name.span());

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use ::loadbroker_test::__private::{tokio, tracing};

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build test runtime");

            let result = runtime.block_on(async {
                let test_span = tracing::info_span!("loadbroker_test", name = stringify!(#name));
                let deadline = ::std::time::Duration::from_millis(#timeout_ms);
                match tokio::time::timeout(
                    deadline,
                    tracing::Instrument::instrument(#async_name(), test_span),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => panic!(
                        "test {} did not finish within {} ms",
                        stringify!(#name),
                        #timeout_ms
                    ),
                }
            });

            ::loadbroker_test::__private::TestResult::into_outcome(result);
        }

        async fn #async_name(#inputs) #output #body
    };

    expanded.into()
}
