//! LCG content validation.
//!
//! The validator runs at submit time only: drafts may be saved in any state
//! of completeness. Structural failures block the submit with field-level
//! detail; lint findings are advisory unless they carry `error` severity.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod lint;
mod structural;

pub use lint::{DefaultLintRules, LintRules};
pub use structural::{ContentValidator, ValidationError};
