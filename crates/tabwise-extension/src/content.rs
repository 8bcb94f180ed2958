//! The page-content seam served by the content-script side.
//!
//! The real extension reads the live DOM; inside this repository the
//! provider trait is the boundary, and [`StaticPageProvider`] carries fixed
//! page state for service wiring and tests. Whatever the provider, the
//! values it returns are opaque strings and metadata to everything above it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tabwise_rpc::HandlerError;

/// Metadata describing the page a question is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDetails {
    /// Address of the page.
    pub url: String,
    /// Favicon address; empty when the page offers none worth showing.
    pub icon: String,
    /// Document title.
    pub title: String,
    /// Content of the page's description meta tag, when present.
    pub description: String,
}

impl PageDetails {
    /// Builds page details, discarding unusable favicons.
    ///
    /// Plain `.ico` favicons render poorly in the popup, so they are dropped
    /// the same way an absent favicon is.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        icon: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let icon = icon.into();
        let icon = if icon.is_empty() || icon.ends_with(".ico") {
            String::new()
        } else {
            icon
        };
        Self {
            url: url.into(),
            icon,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Failure to read page state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    /// The page (or the part of it asked for) is not available.
    #[error("page content unavailable: {message}")]
    Unavailable {
        /// What was being read and why it failed.
        message: String,
    },
}

impl ContentError {
    /// Creates an unavailable-content error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<ContentError> for HandlerError {
    fn from(error: ContentError) -> Self {
        Self::new(error.to_string())
    }
}

/// Supplies page text, the current selection, and page metadata.
pub trait PageContentProvider: Send + Sync {
    /// Full page markup or text.
    ///
    /// # Errors
    ///
    /// Returns a [`ContentError`] when the page cannot be read.
    fn page_content(&self) -> Result<String, ContentError>;

    /// Currently selected text; empty when nothing is selected.
    ///
    /// # Errors
    ///
    /// Returns a [`ContentError`] when the selection cannot be read.
    fn page_selection(&self) -> Result<String, ContentError>;

    /// Page metadata (url, favicon, title, description).
    ///
    /// # Errors
    ///
    /// Returns a [`ContentError`] when the metadata cannot be read.
    fn page_details(&self) -> Result<PageDetails, ContentError>;
}

/// Provider over fixed page state.
#[derive(Debug, Clone, Default)]
pub struct StaticPageProvider {
    content: String,
    selection: String,
    details: PageDetails,
}

impl StaticPageProvider {
    /// Creates a provider serving the given page state.
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        selection: impl Into<String>,
        details: PageDetails,
    ) -> Self {
        Self {
            content: content.into(),
            selection: selection.into(),
            details,
        }
    }
}

impl PageContentProvider for StaticPageProvider {
    fn page_content(&self) -> Result<String, ContentError> {
        Ok(self.content.clone())
    }

    fn page_selection(&self) -> Result<String, ContentError> {
        Ok(self.selection.clone())
    }

    fn page_details(&self) -> Result<PageDetails, ContentError> {
        Ok(self.details.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_ico_favicons() {
        let details = PageDetails::new("https://example.org", "https://example.org/favicon.ico", "Example", "");
        assert_eq!(details.icon, "");
    }

    #[test]
    fn keeps_other_favicons() {
        let details = PageDetails::new("https://example.org", "https://example.org/icon.png", "Example", "");
        assert_eq!(details.icon, "https://example.org/icon.png");
    }

    #[test]
    fn static_provider_serves_fixed_state() {
        let provider = StaticPageProvider::new(
            "<p>body</p>",
            "picked text",
            PageDetails::new("https://example.org", "", "Example", "demo page"),
        );
        assert_eq!(provider.page_content().expect("content"), "<p>body</p>");
        assert_eq!(provider.page_selection().expect("selection"), "picked text");
        assert_eq!(provider.page_details().expect("details").title, "Example");
    }

    #[test]
    fn content_error_converts_to_handler_error() {
        let error = ContentError::unavailable("frame detached");
        let handler_error = HandlerError::from(error);
        assert_eq!(
            handler_error.to_value()["message"],
            "page content unavailable: frame detached"
        );
    }
}
