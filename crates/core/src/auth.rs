use serde::{Deserialize, Serialize};

/// Directory account details returned by the external authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryIdentity {
    username: String,
    display_name: String,
    email: Option<String>,
}

impl DirectoryIdentity {
    /// Creates a directory identity from authenticator data.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        display_name: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            email,
        }
    }

    /// Returns the directory account name.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Returns the display name for the account.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the email, if the directory returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
