//! Secure storage for API credential secrets using the system keyring.
//!
//! Secrets live in the OS's native secret storage:
//! - Linux: libsecret (GNOME Keyring/KDE Wallet)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Security notes:
//! - Never log a secret value
//! - Always use masked display in logs and UI
//! - Secrets are encrypted at rest by the OS

use keyring::Entry;

const SERVICE_NAME: &str = "polyglot-voice";

/// Retrieve a stored credential secret by nickname, if any.
/// Returns None if not configured or on error (errors are logged).
pub fn get_credential_secret(nickname: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, nickname) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Keystore: failed to create keyring entry: {}", e);
            return None;
        }
    };

    match entry.get_password() {
        Ok(secret) => {
            if secret.is_empty() {
                None
            } else {
                Some(secret)
            }
        }
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("Keystore: failed to retrieve secret for '{}': {}", nickname, e);
            None
        }
    }
}

/// Store a credential secret under a nickname.
/// Pass None to delete the entry.
pub fn set_credential_secret(nickname: &str, secret: Option<&str>) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, nickname)
        .map_err(|e| format!("Failed to create keyring entry: {}", e))?;

    match secret {
        Some(s) if !s.is_empty() => {
            entry
                .set_password(s)
                .map_err(|e| format!("Failed to store secret: {}", e))?;
            // Log the action without the secret value
            log::info!("Keystore: stored secret for '{}'", nickname);
        }
        _ => {
            match entry.delete_credential() {
                Ok(()) => log::info!("Keystore: deleted secret for '{}'", nickname),
                Err(keyring::Error::NoEntry) => {
                    // Already deleted, that's fine
                }
                Err(e) => return Err(format!("Failed to delete secret: {}", e)),
            }
        }
    }

    Ok(())
}

/// Masked form of a secret for display (e.g., "AIz...xyz123").
pub fn mask_secret(secret: &str) -> String {
    if secret.len() <= 8 {
        "*".repeat(secret.len())
    } else {
        format!("{}...{}", &secret[..3], &secret[secret.len() - 6..])
    }
}
