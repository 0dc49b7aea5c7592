//! Built-in user message type tags.
//!
//! Types `> 0` are user payloads and are opaque to the transport; types
//! `≤ 0` are reserved for internal and error traffic. Applications may
//! define their own tags above [`CUSTOM`].

/// Application-level error payload.
pub const ERROR: i32 = 1;

/// UTF-8 string payload.
pub const STRING: i32 = 2;

/// Integer payload.
pub const INT: i32 = 3;

/// Floating-point payload.
pub const FLOAT: i32 = 4;

/// Structured/serialized payload.
pub const STRUCT: i32 = 5;

/// Application-defined payload.
pub const CUSTOM: i32 = 6;

/// Returns a human-readable name for a message type tag.
pub fn msg_type_name(msg_type: i32) -> &'static str {
    match msg_type {
        ERROR => "Error",
        STRING => "String",
        INT => "Int",
        FLOAT => "Float",
        STRUCT => "Struct",
        CUSTOM => "Custom",
        t if t <= 0 => "Reserved",
        _ => "User",
    }
}

/// Returns true if the tag is reserved for internal use.
pub fn is_reserved(msg_type: i32) -> bool {
    msg_type <= 0
}
