//! Browser-launch seam.

use crate::error::AuthError;

/// Opens a URL in the user's browser.
pub trait BrowserOpener: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), AuthError>;
}

/// Opens URLs with the platform's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open_url(&self, url: &str) -> Result<(), AuthError> {
        open::that(url).map_err(|e| AuthError::Io(format!("failed to open browser: {e}")))
    }
}
