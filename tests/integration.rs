//! Integration tests for tracecore.

#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod suite;
