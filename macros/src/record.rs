use crate::field_parser::RecordDef;
use proc_macro2::TokenStream;
use quote::quote;

pub fn expand(def: &RecordDef) -> TokenStream {
    let ident = &def.ident;
    let table = &def.table;
    let catalog = &def.catalog;
    let key_type = &def.key.tpe;
    let key_name = def.key.name.to_string();

    let column_defs = def.all_fields().map(|f| {
        let column = &f.column;
        let tpe = &f.tpe;
        quote! {
            ::docstore::Column::new(#column, <#tpe as ::docstore::ColumnValue>::KIND, <#tpe as ::docstore::ColumnValue>::NULLABLE)
        }
    });

    let to_fields = def.all_fields().map(|f| {
        let column = &f.column;
        let name = &f.name;
        quote! { .with(#column, ::docstore::ColumnValue::to_value(&self.#name)) }
    });

    let from_fields = def.all_fields().map(|f| {
        let column = &f.column;
        let name = &f.name;
        let tpe = &f.tpe;
        quote! { #name: <#tpe as ::docstore::ColumnValue>::from_value(fields.take(#column))? }
    });

    let key_message = format!("primary key `{}` of {} must be a text or integer column", key_name, ident);

    quote! {
        const _: () = assert!(
            matches!(<#key_type as ::docstore::ColumnValue>::KIND, ::docstore::ColumnKind::Text | ::docstore::ColumnKind::Integer),
            #key_message
        );

        impl ::docstore::Record for #ident {
            type Catalog = #catalog;
            const TABLE: #catalog = #table;

            fn schema() -> &'static ::docstore::Schema {
                static SCHEMA: ::docstore::once_cell::sync::Lazy<::docstore::Schema> = ::docstore::once_cell::sync::Lazy::new(|| {
                    ::docstore::Schema::new(
                        <#catalog as ::docstore::Catalog>::name(#table),
                        vec![ #(#column_defs),* ],
                    )
                });
                &SCHEMA
            }

            fn to_fields(&self) -> ::docstore::Fields {
                ::docstore::Fields::new() #(#to_fields)*
            }

            fn from_fields(mut fields: ::docstore::Fields) -> ::std::result::Result<Self, ::docstore::AppError> {
                ::std::result::Result::Ok(#ident {
                    #(#from_fields),*
                })
            }
        }
    }
}
