use crate::error::SessionError;

/// Returns true if `name` can key a socket or pipe path.
///
/// A name selects a single path component; it must be non-empty and free
/// of separators and NUL.
pub fn is_valid_ipc_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0'])
}

/// Validate an IPC name, for use by the constructors.
pub fn validate_ipc_name(name: &str) -> Result<(), SessionError> {
    if is_valid_ipc_name(name) {
        Ok(())
    } else {
        Err(SessionError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(is_valid_ipc_name("testing"));
        assert!(is_valid_ipc_name("my-app.bus_1"));
    }

    #[test]
    fn rejects_empty_name() {
        assert!(!is_valid_ipc_name(""));
        assert!(matches!(
            validate_ipc_name(""),
            Err(SessionError::InvalidName(_))
        ));
    }

    #[test]
    fn rejects_separators() {
        assert!(!is_valid_ipc_name("a/b"));
        assert!(!is_valid_ipc_name("a\\b"));
        assert!(!is_valid_ipc_name("a\0b"));
    }
}
