//! Foundation types for the MoML toolchain.
//!
//! This module provides fundamental types used throughout the crate:
//! - [`TextSize`] - Byte offsets into a MoML document
//! - [`LineCol`], [`LineIndex`] - Line/column conversion
//! - [`Position`] - Line/column positions for diagnostics
//!
//! This module has NO dependencies on other moml modules.

mod position;
mod span;

pub use position::Position;
pub use span::{LineCol, LineIndex, TextSize};

// Re-export text-size types for convenience
pub use text_size;
