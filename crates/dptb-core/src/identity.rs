use crate::{DptbError, DptbResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Login data submitted by a user.
///
/// Missing JSON fields deserialize as empty strings so that they surface as a
/// validation error instead of a transport-level rejection.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Remote platform account (an e-mail address on Bohrium).
    #[serde(default)]
    pub username: String,
    /// Remote platform password.
    #[serde(default)]
    pub password: String,
    /// Numeric project id, kept as entered.
    #[serde(default)]
    pub project_id: String,
    /// Directory the agent should treat as the project's file root.
    #[serde(default)]
    pub file_path: String,
}

impl Credentials {
    /// Creates credentials from the four login fields.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        project_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            project_id: project_id.into(),
            file_path: file_path.into(),
        }
    }

    /// Fails unless all four fields are non-blank.
    pub fn validate(&self) -> DptbResult<()> {
        let fields = [
            &self.username,
            &self.password,
            &self.project_id,
            &self.file_path,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(DptbError::Validation("Please fill in all fields".into()));
        }
        Ok(())
    }

    /// Session fingerprint of these credentials. Only the username and
    /// password take part.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.username, &self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("project_id", &self.project_id)
            .field("file_path", &self.file_path)
            .finish()
    }
}

/// Lowercase hex SHA-256 of `username:password`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the prefix used for transcript file names.
    pub const SHORT_LEN: usize = 16;
    /// Length of the prefix used in agent names.
    pub const TAG_LEN: usize = 8;

    /// Hashes a username/password pair.
    pub fn of(username: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parses a full 64-character hex digest, as handed back to clients.
    pub fn parse(value: &str) -> DptbResult<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DptbError::Validation(format!(
                "invalid session id '{value}'"
            )));
        }
        Ok(Self(value))
    }

    /// The full digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters.
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LEN]
    }

    /// First 8 hex characters.
    pub fn agent_tag(&self) -> &str {
        &self.0[..Self::TAG_LEN]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DptbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}
