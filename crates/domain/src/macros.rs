//! Macro for implementing Display and FromStr for wire-named enums
//!
//! Generates a lowercase `Display` and a case-insensitive `FromStr` from a
//! single variant-to-name table.
//!
//! # Example
//!
//! ```rust
//! use tally_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Encoding {
//!     Identity,
//!     Gzip,
//! }
//!
//! impl_wire_name_conversions!(Encoding {
//!     Identity => "identity",
//!     Gzip => "gzip",
//! });
//!
//! assert_eq!("GZIP".parse::<Encoding>().unwrap(), Encoding::Gzip);
//! ```

/// Implements Display and FromStr traits for wire-named enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase wire
///   names
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => ::std::result::Result::Ok(Self::$variant),)+
                    _ => ::std::result::Result::Err(::std::format!("Invalid {}: {}", ::std::stringify!($enum_name), s)),
                }
            }
        }
    };
}
