//! Token resolution for step configs.
//!
//! Step configs reference upstream outputs with `{{steps.<key>.<path>}}`
//! tokens. Loop inner invocations additionally see `{{$item}}`, `{{$index}}`,
//! `{{$total}}` and `{{$batchIndex}}`.

pub mod mask;
pub mod path;
pub mod token;

pub use mask::{is_sensitive_key, mask_sensitive, MASK};
pub use path::{get_path, parse_path, set_path, PathSegment};
pub use token::{
    extract_tokens, is_pure_token, referenced_steps, resolve, resolve_str, stringify_value,
    TokenContext,
};
