//! Username rules shared by login and contact management.

/// Minimum username length in characters.
pub const MIN_USERNAME_LEN: usize = 3;

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Names that can never be used, by either the local user or a contact.
pub const RESERVED_NAMES: &[&str] = &["Notes"];

/// Reasons a username is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Fewer than [`MIN_USERNAME_LEN`] characters.
    #[error("username should be at least {MIN_USERNAME_LEN} characters long")]
    TooShort,
    /// More than [`MAX_USERNAME_LEN`] characters.
    #[error("username should be at most {MAX_USERNAME_LEN} characters long")]
    TooLong,
    /// Contains a space, tab or other whitespace character.
    #[error("username must not contain whitespace")]
    Whitespace,
    /// One of [`RESERVED_NAMES`].
    #[error("\"{0}\" is a reserved name")]
    Reserved(String),
    /// A contact name equal to the local user's own name.
    #[error("you can't add yourself")]
    SelfContact,
}

/// Checks the format rules every username must satisfy.
///
/// # Errors
///
/// Returns the first [`NameError`] the name violates.
pub fn validate_username(name: &str) -> Result<(), NameError> {
    if name.chars().any(char::is_whitespace) {
        return Err(NameError::Whitespace);
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(NameError::Reserved(name.to_string()));
    }
    let len = name.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(NameError::TooShort);
    }
    if len > MAX_USERNAME_LEN {
        return Err(NameError::TooLong);
    }
    Ok(())
}

/// Checks a contact name on behalf of `local`.
///
/// # Errors
///
/// Returns [`NameError::SelfContact`] if `contact == local`, otherwise
/// whatever [`validate_username`] reports.
pub fn validate_contact(local: &str, contact: &str) -> Result<(), NameError> {
    validate_username(contact)?;
    if contact == local {
        return Err(NameError::SelfContact);
    }
    Ok(())
}
