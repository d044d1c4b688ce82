use proc_macro2::Ident;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Fields, LitStr, Path, Type};

#[derive(Clone)]
pub struct FieldDef {
    pub name: Ident,
    pub column: String,
    pub tpe: Type,
}

pub struct RecordDef {
    pub ident: Ident,
    /// Catalog variant, e.g. `Table::Articles`.
    pub table: Path,
    /// Catalog enum, i.e. `table` without its last segment.
    pub catalog: Path,
    pub key: FieldDef,
    pub columns: Vec<FieldDef>,
}

impl RecordDef {
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDef> {
        std::iter::once(&self.key).chain(self.columns.iter())
    }
}

fn parse_table_attr(ast: &DeriveInput) -> Result<Path, syn::Error> {
    let mut table: Option<Path> = None;
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|nested| {
            if nested.path.is_ident("table") {
                table = Some(nested.value()?.parse()?);
                Ok(())
            } else {
                Err(nested.error("Unsupported record attribute, expected `table = Catalog::Variant`"))
            }
        })?;
    }
    table.ok_or_else(|| syn::Error::new(ast.ident.span(), "`#[record(table = Catalog::Variant)]` attribute is required"))
}

fn catalog_of(table: &Path) -> Result<Path, syn::Error> {
    if table.segments.len() < 2 {
        return Err(syn::Error::new(table.span(), "Table must be a catalog variant path like `Table::Articles`"));
    }
    let segments = table.segments.iter().take(table.segments.len() - 1).cloned().collect();
    Ok(Path { leading_colon: table.leading_colon, segments })
}

fn parse_field(field: &syn::Field) -> Result<FieldDef, syn::Error> {
    let name = field.ident.clone().ok_or_else(|| syn::Error::new(field.span(), "Unnamed fields not supported"))?;
    let mut column = name.to_string();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|nested| {
            if nested.path.is_ident("name") {
                let lit: LitStr = nested.value()?.parse()?;
                column = lit.value();
                Ok(())
            } else {
                Err(nested.error("Unsupported column attribute, expected `name = \"...\"`"))
            }
        })?;
    }
    Ok(FieldDef { name, column, tpe: field.ty.clone() })
}

pub fn parse_record(ast: &DeriveInput) -> Result<RecordDef, syn::Error> {
    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new(ast.generics.span(), "`#[derive(Record)]` does not support generic structs"));
    }
    let named = match &ast.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => return Err(syn::Error::new(ast.span(), "`#[derive(Record)]` only supports structs with named fields.")),
        },
        _ => return Err(syn::Error::new(ast.span(), "`#[derive(Record)]` only supports structs.")),
    };

    let table = parse_table_attr(ast)?;
    let catalog = catalog_of(&table)?;
    let mut fields = named.iter().map(parse_field).collect::<Result<Vec<_>, _>>()?;
    if fields.is_empty() {
        return Err(syn::Error::new(ast.ident.span(), "A record needs at least its primary key field"));
    }

    let mut seen = std::collections::HashSet::new();
    for field in &fields {
        if !seen.insert(field.column.clone()) {
            return Err(syn::Error::new(field.name.span(), format!("Column `{}` is declared twice", field.column)));
        }
    }

    let key = fields.remove(0);
    Ok(RecordDef { ident: ast.ident.clone(), table, catalog, key, columns: fields })
}
