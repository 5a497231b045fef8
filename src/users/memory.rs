use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::UserStore;
use super::repo_types::{
    Friend, FriendRequest, FriendSummary, NewUser, PendingFriendRequest, ProfileChanges, User,
};
use crate::error::DuplicateKey;

/// In-process [`UserStore`] for tests; keeps insertion order like the
/// Postgres `seq` columns.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }
}

fn dup(msg: &str) -> anyhow::Error {
    anyhow::Error::new(DuplicateKey(msg.into()))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_user_name(&self, user_name: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.user_name == user_name))
    }

    async fn find_by_user_name_or_email(
        &self,
        user_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.user_name == user_name || u.email == email))
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.user_name == new_user.user_name) {
            return Err(dup("user name is already taken"));
        }
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(dup("email is already registered"));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            user_name: new_user.user_name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            profile_picture: String::new(),
            description: None,
            friend_requests: Vec::new(),
            friends: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if let Some(name) = &changes.user_name {
            if users.iter().any(|u| u.id != id && &u.user_name == name) {
                return Err(dup("user name is already taken"));
            }
        }
        if let Some(email) = &changes.email {
            if users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(dup("email is already registered"));
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(v) = &changes.user_name {
            user.user_name = v.clone();
        }
        if let Some(v) = &changes.email {
            user.email = v.clone();
        }
        if let Some(v) = &changes.description {
            user.description = Some(v.clone());
        }
        if let Some(v) = &changes.profile_picture {
            user.profile_picture = v.clone();
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn add_friend_request(&self, recipient: Uuid, sender: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == recipient)
            .ok_or_else(|| anyhow::anyhow!("recipient {recipient} not found"))?;
        if user.request_from(sender).is_some() {
            return Err(dup("friend request already sent"));
        }
        user.friend_requests.push(FriendRequest {
            friend_user: sender,
            is_approved: false,
        });
        Ok(())
    }

    async fn accept_friend_request(&self, user: Uuid, sender: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.id == user && u.is_friend_of(sender)) {
            return Err(dup("users are already friends"));
        }
        for (me, other) in [(user, sender), (sender, user)] {
            if let Some(u) = users.iter_mut().find(|u| u.id == me) {
                for r in u.friend_requests.iter_mut().filter(|r| r.friend_user == other) {
                    r.is_approved = true;
                }
                u.friends.push(Friend { friend_user: other });
            }
        }
        Ok(())
    }

    async fn pending_friend_requests(&self, user: Uuid) -> anyhow::Result<Vec<PendingFriendRequest>> {
        let users = self.users.lock().unwrap();
        let Some(me) = users.iter().find(|u| u.id == user) else {
            return Ok(Vec::new());
        };
        Ok(me
            .friend_requests
            .iter()
            .filter(|r| !r.is_approved)
            .filter_map(|r| users.iter().find(|u| u.id == r.friend_user))
            .map(|sender| PendingFriendRequest {
                friend_user: FriendSummary {
                    id: sender.id,
                    user_name: sender.user_name.clone(),
                    email: sender.email.clone(),
                },
                is_approved: false,
            })
            .collect())
    }
}
