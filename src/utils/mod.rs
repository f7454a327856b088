pub mod error;
pub mod retry;
pub mod text;

pub use error::{ApiError, ApiResult, CoreError};
pub use retry::with_retries;
pub use text::{content_words, normalize_for_matching, strip_diacritics};
