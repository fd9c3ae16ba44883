use serde::{Deserialize, Serialize};

use crate::User;

/// Display-ready projection of a user for selection controls.
///
/// `value` is the JSON form of the full record and doubles as the selection key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOption {
    pub value: String,
    pub label: String,
    pub user: User,
}

impl SelectionOption {
    pub fn from_user(user: User) -> Result<Self, serde_json::Error> {
        Ok(Self {
            value: serde_json::to_string(&user)?,
            label: user.label(),
            user,
        })
    }
}
