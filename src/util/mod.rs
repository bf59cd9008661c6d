//! Utility functions shared across the pipeline.
//!
//! - **Text processing**: HTML-to-text conversion, truncation, control-character stripping
//! - **Secret masking**: scrubbing webhook tokens and URL credentials from log output
//! - **URL validation**: accepting only absolute http(s) URLs at config time

mod mask;
mod text;
mod url_validator;

pub use mask::mask_secrets;
pub use text::{html_to_text, strip_control_chars, take_chars, truncate_chars};
pub use url_validator::{validate_http_url, UrlValidationError};
