use crate::error::AppError;
use crate::schema::Schema;
use std::fmt::Debug;
use std::hash::Hash;

/// Closed set of tables a store manages. Usually declared with [`catalog!`](crate::catalog!).
pub trait Catalog: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn all() -> &'static [Self];
    fn name(self) -> &'static str;
    fn schema(self) -> &'static Schema;

    fn from_name(name: &str) -> Result<Self, AppError> {
        Self::all()
            .iter()
            .copied()
            .find(|table| table.name() == name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown table {}", name)))
    }
}

/// Declares a catalog enum whose variants map to record types and table names.
///
/// ```ignore
/// catalog! {
///     pub enum Table {
///         Articles => Article = "articles",
///         Users => User = "users",
///     }
/// }
/// ```
#[macro_export]
macro_rules! catalog {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident => $record:ty = $table:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $variant ),+
        }

        impl $crate::Catalog for $name {
            fn all() -> &'static [Self] {
                &[ $( $name::$variant ),+ ]
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $table ),+
                }
            }

            fn schema(self) -> &'static $crate::Schema {
                match self {
                    $( $name::$variant => <$record as $crate::Record>::schema() ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::Catalog::name(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::AppError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                <$name as $crate::Catalog>::from_name(s)
            }
        }

        impl $crate::serde::Serialize for $name {
            fn serialize<S: $crate::serde::Serializer>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str($crate::Catalog::name(*self))
            }
        }

        impl<'de> $crate::serde::Deserialize<'de> for $name {
            fn deserialize<D: $crate::serde::Deserializer<'de>>(deserializer: D) -> ::std::result::Result<Self, D::Error> {
                let name = <::std::string::String as $crate::serde::Deserialize>::deserialize(deserializer)?;
                <$name as $crate::Catalog>::from_name(&name).map_err($crate::serde::de::Error::custom)
            }
        }
    };
}
