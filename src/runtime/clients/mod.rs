//! Concrete `ClientWrapper` implementations, one module per wire dialect.

pub mod anthropic;
pub mod common;
pub mod openai;
