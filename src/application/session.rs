use std::fmt;

use crate::domain::files::naming::{NameError, validate_segment};

/// Signed-in identity passed down to every storage call.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    owner: String,
    access_token: Option<String>,
}

impl SessionContext {
    /// Owners double as directory names, so they follow the same segment rules
    /// as file names.
    pub fn new(owner: impl Into<String>) -> Result<Self, NameError> {
        let owner = owner.into().trim().to_string();
        validate_segment(&owner)?;
        Ok(Self {
            owner,
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("owner", &self.owner)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
