use std::fmt;

use redact::Secret;
use zeroize::Zeroizing;

/// String that is redacted when printed and zeroed when it goes out of scope.
pub struct SecureString(Zeroizing<Secret<String>>);

impl SecureString {
    /// Borrows the plaintext. Keep the borrow as short as possible.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl<S> From<S> for SecureString
where
    S: AsRef<str>,
{
    fn from(value: S) -> Self {
        SecureString(Zeroizing::new(Secret::new(value.as_ref().into())))
    }
}

impl Clone for SecureString {
    fn clone(&self) -> Self {
        SecureString::from(self.expose())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
