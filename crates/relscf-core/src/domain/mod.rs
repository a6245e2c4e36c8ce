pub mod errors;

pub use errors::{Categorized, ErrorCategory, RelScfError, RelScfResult};
