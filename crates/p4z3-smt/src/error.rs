//! Errors the term context can raise when asked to build an ill-sorted
//! term. Surfaced to callers as `BackendError` (§7).

use thiserror::Error;

use crate::term::Sort;

#[derive(Debug, Error)]
pub enum TermError {
    #[error("sort mismatch in {op}: expected {expected}, found {found}")]
    SortMismatch { op: &'static str, expected: Sort, found: Sort },

    #[error("invalid extract: hi={hi} lo={lo} on a {width}-bit term")]
    InvalidExtract { hi: u32, lo: u32, width: u32 },

    #[error("cannot parse '{text}' as a decimal integer literal")]
    InvalidDecimalLiteral { text: String },
}
