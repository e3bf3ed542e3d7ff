use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

// Derives the CSV column header used by the flight log schema.
// Fields marked #[telemetry(timestamp)] are written by the log framing itself
// and are left out of the header; #[telemetry(skip)] drops a field entirely.
// Usage: #[derive(TelemetryPayload)] then `MyType::CSV_HEADER`.

#[proc_macro_derive(TelemetryPayload, attributes(telemetry))]
pub fn telemetry_payload(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new_spanned(
                    name,
                    "TelemetryPayload needs a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "TelemetryPayload only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let mut columns = Vec::new();
    for field in fields {
        let mut excluded = false;
        for attr in &field.attrs {
            if !attr.path().is_ident("telemetry") {
                continue;
            }
            let parsed = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("timestamp") || meta.path.is_ident("skip") {
                    excluded = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `timestamp` or `skip`"))
                }
            });
            if let Err(e) = parsed {
                return e.to_compile_error().into();
            }
        }
        if excluded {
            continue;
        }
        if let Some(ident) = &field.ident {
            columns.push(ident.to_string());
        }
    }

    let header = LitStr::new(&columns.join(","), name.span());
    let output = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            /// Comma separated payload column names, in declaration order.
            pub const CSV_HEADER: &'static str = #header;
        }
    };

    output.into()
}
