use proc_macro::TokenStream;
use proc_macro2::Ident;
use std::path::{Path, PathBuf};

/// Pretty-printed expansion, or the raw token text when it does not parse as a file.
fn pretty_source(stream: &proc_macro2::TokenStream) -> String {
    match syn::parse2::<syn::File>(stream.clone()) {
        Ok(ast) => prettyplease::unparse(&ast),
        Err(_) => stream.to_string(),
    }
}

fn expansion_path(root: &Path, macro_name: &str, ident: &Ident) -> PathBuf {
    root.join("target").join("macros").join(macro_name).join(format!("{}.rs", ident))
}

/// Records the expansion of `ident` under `target/macros/<macro_name>/` and hands it to the compiler.
/// Failing to record is reported on stderr and never fails the build.
pub fn emit_expansion(stream: proc_macro2::TokenStream, macro_name: &str, ident: &Ident) -> TokenStream {
    #[cfg(not(test))]
    {
        let recorded = std::env::current_dir().and_then(|root| {
            let path = expansion_path(&root, macro_name, ident);
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&path, pretty_source(&stream))
        });
        if let Err(e) = recorded {
            eprintln!("Expansion of {} not recorded: {}", ident, e);
        }
    }
    stream.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::{format_ident, quote};

    #[test]
    fn expansion_lands_under_target_macros() {
        let ident = format_ident!("Article");
        let path = expansion_path(Path::new("/work"), "record", &ident);
        assert_eq!(path, PathBuf::from("/work/target/macros/record/Article.rs"));
    }

    #[test]
    fn items_are_pretty_printed() {
        let source = pretty_source(&quote! { impl Article { fn key(&self) -> u8 { 1 } } });
        assert!(source.starts_with("impl Article {\n"));
        assert_eq!(pretty_source(&quote! { 1 + }), "1 +");
    }
}
