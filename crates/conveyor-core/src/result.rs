//! Result alias used across the workspace.

use crate::error::CoreError;

/// Result type carrying a [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
