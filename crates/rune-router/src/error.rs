//! Error types for the page router.

use thiserror::Error;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Failures that abandon a single navigation intent or a restore request.
///
/// None of these are fatal: the intent is dropped and the router queue moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The 64-slot page id pool is exhausted.
    #[error("no page id available")]
    InvalidPageId,

    /// Another page is still loading.
    #[error("a staging page is still loading")]
    StagingPageExist,

    /// The manifest has no entry page to start from.
    #[error("manifest has no entry page")]
    ParseManifestFailed,

    /// The url does not resolve to a page script.
    #[error("uri is not registered in the manifest: {0}")]
    UriNotFound(String),

    /// A snapshot could not be restored.
    #[error("invalid router snapshot: {0}")]
    WrongPageRouter(String),

    /// The router was used before being wired to its collaborators.
    #[error("router is not attached")]
    NullPageRouter,
}

impl RouterError {
    pub fn content_code(&self) -> ContentErrorCode {
        match self {
            RouterError::InvalidPageId => ContentErrorCode::InvalidPageId,
            RouterError::StagingPageExist => ContentErrorCode::StagingPageExist,
            RouterError::ParseManifestFailed | RouterError::UriNotFound(_) => {
                ContentErrorCode::ParseManifestFailed
            }
            RouterError::WrongPageRouter(_) => ContentErrorCode::WrongPageRouter,
            RouterError::NullPageRouter => ContentErrorCode::NullPageRouter,
        }
    }
}

/// Result codes returned by `run_page` and `restore_router_stack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentErrorCode {
    NoErrors,
    InvalidPageId,
    StagingPageExist,
    ParseManifestFailed,
    WrongPageRouter,
    NullPageRouter,
}

impl ContentErrorCode {
    pub fn is_ok(self) -> bool {
        self == ContentErrorCode::NoErrors
    }
}

impl From<&RouterError> for ContentErrorCode {
    fn from(err: &RouterError) -> Self {
        err.content_code()
    }
}

/// Codes handed to a navigation intent's error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RouterErrorCode {
    NoError = 0,
    InternalError = 100001,
    UriError = 100002,
    PageStackFull = 100003,
    UriErrorLite = 200002,
}

impl RouterErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Message delivered alongside the code.
    pub fn message(self) -> &'static str {
        match self {
            RouterErrorCode::NoError => "",
            RouterErrorCode::InternalError => "Internal error.",
            RouterErrorCode::UriError | RouterErrorCode::UriErrorLite => {
                "The uri of router is not exist."
            }
            RouterErrorCode::PageStackFull => "The pages are pushed too much.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_codes_keep_their_wire_values() {
        assert_eq!(RouterErrorCode::NoError.code(), 0);
        assert_eq!(RouterErrorCode::UriError.code(), 100002);
        assert_eq!(RouterErrorCode::PageStackFull.code(), 100003);
        assert_eq!(RouterErrorCode::UriErrorLite.code(), 200002);
        assert_eq!(
            RouterErrorCode::PageStackFull.message(),
            "The pages are pushed too much."
        );
    }

    #[test]
    fn router_errors_map_to_content_codes() {
        assert_eq!(
            ContentErrorCode::from(&RouterError::WrongPageRouter("x".into())),
            ContentErrorCode::WrongPageRouter
        );
        assert_eq!(
            RouterError::StagingPageExist.content_code(),
            ContentErrorCode::StagingPageExist
        );
        assert!(ContentErrorCode::NoErrors.is_ok());
    }
}
