//! Shared helpers for tl-testkit integration tests

#![allow(dead_code)]

pub mod toy;

pub use toy::ToyCompiler;
