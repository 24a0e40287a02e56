use serde::{Deserialize, Serialize};

/// A user record.
///
/// The password is kept exactly as supplied; nothing hashes it. It is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl User {
    pub fn from_new(id: String, new_user: NewUser) -> Self {
        Self {
            id,
            username: new_user.username,
            password: new_user.password,
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}
