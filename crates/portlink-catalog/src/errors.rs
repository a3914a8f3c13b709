//! Catalogue construction errors.

use thiserror::Error;

/// Failure building a typed channel or catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A declared wire name uses the reserved `:response` / `:error` suffix,
    /// which is owned by the request/response reply convention.
    #[error("event name '{name}' collides with the reserved reply-name convention")]
    ReservedName {
        /// The offending wire name.
        name: String,
    },
}
