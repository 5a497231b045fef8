use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: String,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Inbound friend request held by the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub friend_user: Uuid, // sender
    pub is_approved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub friend_user: Uuid,
}

/// User with its social graph. Serialises without the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub profile_picture: String,
    pub description: Option<String>,
    pub friend_requests: Vec<FriendRequest>,
    pub friends: Vec<Friend>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn from_row(row: UserRow, friend_requests: Vec<FriendRequest>, friends: Vec<Friend>) -> Self {
        Self {
            id: row.id,
            user_name: row.user_name,
            email: row.email,
            password_hash: row.password_hash,
            profile_picture: row.profile_picture,
            description: row.description,
            friend_requests,
            friends,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    pub fn request_from(&self, sender: Uuid) -> Option<&FriendRequest> {
        self.friend_requests.iter().find(|r| r.friend_user == sender)
    }

    pub fn is_friend_of(&self, other: Uuid) -> bool {
        self.friends.iter().any(|f| f.friend_user == other)
    }

    #[cfg(test)]
    pub fn new_for_test(id: Uuid, user_name: &str, email: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            user_name: user_name.into(),
            email: email.into(),
            password_hash: String::new(),
            profile_picture: String::new(),
            description: None,
            friend_requests: Vec::new(),
            friends: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Publicly readable view of a user: no credential hash, no pending requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub profile_picture: String,
    pub description: Option<String>,
    pub friends: Vec<Friend>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            user_name: u.user_name,
            email: u.email,
            profile_picture: u.profile_picture,
            description: u.description,
            friends: u.friends,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Sender projection used when listing pending requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FriendSummary {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFriendRequest {
    pub friend_user: FriendSummary,
    pub is_approved: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial profile update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub profile_picture: Option<String>,
}
