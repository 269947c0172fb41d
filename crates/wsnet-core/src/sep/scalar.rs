//! Raw scalar values carried in SEP ids and payloads.
//!
//! Ids may be text, any fixed-width integer, or a GUID.  Scalar payloads may
//! additionally be `bool`.  Scalars are parsed directly from the message text
//! and never go through a content-type decoder.

use uuid::Uuid;

/// The scalar kinds a route can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Text,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    Guid,
}

/// A type that can be parsed from raw SEP text.
pub trait Scalar: Sized + Send + 'static {
    const KIND: ScalarKind;

    /// Parses `text`, returning a human-readable reason on failure.
    fn parse_scalar(text: &str) -> Result<Self, String>;
}

impl Scalar for String {
    const KIND: ScalarKind = ScalarKind::Text;

    fn parse_scalar(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }
}

impl Scalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn parse_scalar(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if text.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(format!("'{text}' is not a bool"))
        }
    }
}

impl Scalar for Uuid {
    const KIND: ScalarKind = ScalarKind::Guid;

    fn parse_scalar(text: &str) -> Result<Self, String> {
        Uuid::parse_str(text.trim()).map_err(|e| format!("'{text}' is not a GUID: {e}"))
    }
}

macro_rules! integer_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;

                fn parse_scalar(text: &str) -> Result<Self, String> {
                    text.trim()
                        .parse::<$ty>()
                        .map_err(|e| format!("'{text}' is not a valid {}: {e}", stringify!($ty)))
                }
            }
        )*
    };
}

integer_scalar! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
}
