//! Tests for the two-pass parser
//!
//! Organized by concern: the declaration pass and symbol tables, the
//! content pass and token stream, name and expression resolution,
//! section scope rules, and the document outline.

mod helpers;

mod scope_tests;
