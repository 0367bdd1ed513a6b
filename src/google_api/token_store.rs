//! token.json storage.
//!
//! The file is the only token backend; it is rewritten atomically after a
//! refresh and kept owner-readable on unix.

use std::path::Path;

use super::{GoogleApiError, GoogleToken};

/// Load the Google OAuth token at `path`.
pub fn load_token(path: &Path) -> Result<GoogleToken, GoogleApiError> {
    if !path.exists() {
        return Err(GoogleApiError::TokenNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        GoogleApiError::InvalidCredentials(format!("{}: {}", path.display(), e))
    })
}

/// Persist a Google OAuth token to `path`.
pub fn save_token(path: &Path, token: &GoogleToken) -> Result<(), GoogleApiError> {
    let content = serde_json::to_string_pretty(token)?;
    crate::util::atomic_write_str(path, &content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
