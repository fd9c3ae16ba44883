use chrono::{DateTime, Utc};
use promptdesk_types::{avatar_for_index, Role, User};

const SEED_USERS: [(&str, Role, &str); 3] = [
    ("Sarah Johnson", Role::Admin, "sarah@company.com"),
    ("Mike Chen", Role::User, "mike@company.com"),
    ("Emily Davis", Role::Editor, "emily@company.com"),
];

/// The default collection with consecutive ids starting at `first_id`.
///
/// A new store is seeded from id 1.
pub fn seed_users_from(first_id: u64, created_at: DateTime<Utc>) -> Vec<User> {
    SEED_USERS
        .iter()
        .enumerate()
        .map(|(index, (name, role, email))| User {
            id: first_id + index as u64,
            name: name.to_string(),
            role: *role,
            email: email.to_string(),
            avatar: avatar_for_index(index).to_string(),
            created_at,
            updated_at: None,
        })
        .collect()
}
