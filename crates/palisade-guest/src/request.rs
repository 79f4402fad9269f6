//! The slice of an incoming request the guest subsystem reads.

use std::collections::HashMap;

/// Form field carrying a guest token when no header is present.
pub const GUEST_TOKEN_FORM_FIELD: &str = "guest_token";

/// Read-only view of an HTTP request.
///
/// Header lookups are case-insensitive.
pub trait GuestRequest {
    fn header(&self, name: &str) -> Option<&str>;
    fn form_field(&self, name: &str) -> Option<&str>;
    /// Host the request was addressed to, as observed externally.
    fn host(&self) -> Option<&str>;
}

/// An owned request snapshot, usable by adapters and tests.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    headers: HashMap<String, String>,
    form: HashMap<String, String>,
    host: Option<String>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl GuestRequest for RequestParts {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn form_field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = RequestParts::new().with_header("X-GuestToken", "abc");
        assert_eq!(req.header("x-guesttoken"), Some("abc"));
        assert_eq!(req.header("X-GUESTTOKEN"), Some("abc"));
        assert_eq!(req.form_field(GUEST_TOKEN_FORM_FIELD), None);
    }
}
