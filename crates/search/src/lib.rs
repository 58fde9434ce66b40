//! Full-text search for Monarch
//!
//! Tokenization, posting lists, and TF-IDF scoring. The storage layer
//! owns one `TextIndex` per text-flagged secondary index; the `$text`
//! query operator consults the same structure.

pub mod index;
pub mod tokenizer;

pub use index::{Posting, TextIndex, TextMatch};
pub use tokenizer::{tokenize, tokenize_unique};
