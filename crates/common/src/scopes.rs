//! API-key scope strings and the matching rule.

pub const WILDCARD: &str = "*";
pub const MESSAGES_SEND: &str = "messages:send";
pub const MESSAGES_READ: &str = "messages:read";
pub const PLATFORMS_READ: &str = "platforms:read";
pub const PLATFORMS_WRITE: &str = "platforms:write";
pub const KEYS_READ: &str = "keys:read";
pub const KEYS_WRITE: &str = "keys:write";

/// All scopes a key may be granted.
pub const ALL: &[&str] = &[
    MESSAGES_SEND,
    MESSAGES_READ,
    PLATFORMS_READ,
    PLATFORMS_WRITE,
    KEYS_READ,
    KEYS_WRITE,
];

/// A route is allowed when the granted set intersects the required set.
/// The wildcard grants everything; a route with no required scopes is open
/// to any authenticated key.
#[must_use]
pub fn allows(granted: &[String], required: &[&str]) -> bool {
    if required.is_empty() {
        return true;
    }
    granted
        .iter()
        .any(|g| g == WILDCARD || required.iter().any(|r| g == r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(scopes: &[&str]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wildcard_matches_any_requirement() {
        assert!(allows(&granted(&[WILDCARD]), &[MESSAGES_SEND]));
        assert!(allows(&granted(&[WILDCARD]), &[KEYS_WRITE]));
    }

    #[test]
    fn intersection_required() {
        assert!(allows(&granted(&[MESSAGES_SEND]), &[MESSAGES_SEND]));
        assert!(!allows(&granted(&[MESSAGES_READ]), &[MESSAGES_SEND]));
        assert!(allows(
            &granted(&[MESSAGES_READ, PLATFORMS_WRITE]),
            &[PLATFORMS_WRITE]
        ));
    }

    #[test]
    fn empty_requirement_is_open() {
        assert!(allows(&granted(&[]), &[]));
        assert!(allows(&granted(&[MESSAGES_READ]), &[]));
    }
}
