//! Core types shared by every Conveyor crate.
//!
//! This crate is deliberately small: the unified error type, the result
//! alias, and pagination primitives. Anything heavier lives in the crate
//! that owns the concern.

pub mod error;
pub mod pagination;
pub mod result;

pub use error::{CoreError, ErrorResponse};
pub use pagination::{Page, PageRequest};
pub use result::CoreResult;
