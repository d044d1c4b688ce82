extern crate proc_macro;
mod field_parser;
mod macro_utils;
mod record;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;
use syn::{parse_macro_input, DeriveInput};

/// Derives `docstore::Record` for a struct with named fields.
///
/// The first field is the primary key. The struct must name its catalog variant:
///
/// ```ignore
/// #[derive(Record)]
/// #[record(table = Table::Articles)]
/// pub struct Article { pub article_id: String, /* ... */ }
/// ```
#[proc_macro_derive(Record, attributes(record, column))]
#[proc_macro_error]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let struct_ident = &ast.ident;
    let stream = match field_parser::parse_record(&ast) {
        Ok(record_def) => record::expand(&record_def),
        Err(e) => return e.to_compile_error().into(),
    };
    macro_utils::emit_expansion(stream, "record", struct_ident)
}
