//! Secret detection and redaction utilities.
//!
//! Log and telemetry adapters run every structured field through
//! [`is_secret_key`] before serializing it.

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

/// Checks if a key/field name likely refers to a secret.
///
/// # Examples
///
/// ```
/// use callmeter_shared::is_secret_key;
///
/// assert!(is_secret_key("sessionToken"));
/// assert!(is_secret_key("password"));
/// assert!(is_secret_key("Cookie"));
/// assert!(!is_secret_key("metricKey"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("TOKEN")
        || key.contains("SECRET")
        || key.contains("PASSWORD")
        || key.contains("CREDENTIAL")
        || key.contains("AUTH")
        || key.contains("COOKIE")
        || key.contains("API_KEY")
        || key.contains("APIKEY")
}

/// Redacts a value if the key is likely a secret.
///
/// # Examples
///
/// ```
/// use callmeter_shared::redact_if_secret;
///
/// assert_eq!(redact_if_secret("authorization", "Bearer x"), "[REDACTED]");
/// assert_eq!(redact_if_secret("operation", "login"), "login");
/// ```
pub fn redact_if_secret(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_secret_patterns() {
        assert!(is_secret_key("API_KEY"));
        assert!(is_secret_key("apiKey"));
        assert!(is_secret_key("ACCESS_TOKEN"));
        assert!(is_secret_key("client_secret"));
        assert!(is_secret_key("DB_PASSWORD"));
        assert!(is_secret_key("credentials"));
        assert!(is_secret_key("Authorization"));
        assert!(is_secret_key("set-cookie"));
    }

    #[test]
    fn metric_fields_are_not_secret() {
        assert!(!is_secret_key("metricKey"));
        assert!(!is_secret_key("operation"));
        assert!(!is_secret_key("invocationType"));
        assert!(!is_secret_key("elapsedMs"));
        assert!(!is_secret_key("KEYBOARD"));
    }

    #[test]
    fn redacts_secret_values() {
        assert_eq!(redact_if_secret("sessionToken", "abc"), REDACTED);
        assert_eq!(redact_if_secret("componentKey", "server"), "server");
    }
}
