use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{
    Friend, FriendRequest, FriendSummary, NewUser, PendingFriendRequest, ProfileChanges, User,
    UserRow,
};
use crate::error::DuplicateKey;

/// Persistence for users and their friend graph.
///
/// Implementations report unique-constraint violations as [`DuplicateKey`]
/// so callers can tell a conflict apart from an infrastructure failure.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_user_name(&self, user_name: &str) -> anyhow::Result<Option<User>>;
    /// Any user holding either identity.
    async fn find_by_user_name_or_email(
        &self,
        user_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User>;
    /// Returns `None` when no user has `id`.
    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<Option<User>>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;
    /// Removes the user with its own requests and friend list; references
    /// held by other users are left as is.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Appends an unapproved request from `sender` to `recipient`'s list.
    async fn add_friend_request(&self, recipient: Uuid, sender: Uuid) -> anyhow::Result<()>;
    /// Atomically approves the requests between the pair and records the
    /// friendship on both sides.
    async fn accept_friend_request(&self, user: Uuid, sender: Uuid) -> anyhow::Result<()>;
    /// Unapproved requests addressed to `user`, senders expanded, oldest first.
    async fn pending_friend_requests(&self, user: Uuid) -> anyhow::Result<Vec<PendingFriendRequest>>;
}

const USER_COLUMNS: &str =
    "id, user_name, email, password_hash, profile_picture, description, created_at, updated_at";

fn unique_violation(e: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let msg = match db.constraint() {
                Some("users_user_name_key") => "user name is already taken",
                Some("users_email_key") => "email is already registered",
                Some("friend_requests_pkey") => "friend request already sent",
                Some("friendships_pkey") => "users are already friends",
                _ => "duplicate record",
            };
            return anyhow::Error::new(DuplicateKey(msg.into()));
        }
    }
    anyhow::Error::new(e)
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn load_graph(&self, row: UserRow) -> anyhow::Result<User> {
        let requests = sqlx::query_as::<_, FriendRequest>(
            r#"
            SELECT sender_id AS friend_user, is_approved
              FROM friend_requests
             WHERE recipient_id = $1
             ORDER BY seq ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.db)
        .await
        .context("load friend requests")?;

        let friends = sqlx::query_as::<_, Friend>(
            r#"
            SELECT friend_id AS friend_user
              FROM friendships
             WHERE user_id = $1
             ORDER BY seq ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.db)
        .await
        .context("load friends")?;

        Ok(User::from_row(row, requests, friends))
    }

    async fn load_optional(&self, row: Option<UserRow>) -> anyhow::Result<Option<User>> {
        match row {
            Some(row) => Ok(Some(self.load_graph(row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        self.load_optional(row).await
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        self.load_optional(row).await
    }

    async fn find_by_user_name(&self, user_name: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_name = $1"
        ))
        .bind(user_name)
        .fetch_optional(&self.db)
        .await
        .context("find user by user name")?;
        self.load_optional(row).await
    }

    async fn find_by_user_name_or_email(
        &self,
        user_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_name = $1 OR email = $2 LIMIT 1"
        ))
        .bind(user_name)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by user name or email")?;
        self.load_optional(row).await
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (user_name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.user_name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(unique_violation)
        .context("insert user")?;
        Ok(User::from_row(row, Vec::new(), Vec::new()))
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET user_name       = COALESCE($2, user_name),
                   email           = COALESCE($3, email),
                   description     = COALESCE($4, description),
                   profile_picture = COALESCE($5, profile_picture),
                   updated_at      = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.user_name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.profile_picture.as_deref())
        .fetch_optional(&self.db)
        .await
        .map_err(unique_violation)
        .context("update profile")?;
        self.load_optional(row).await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("update password")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        sqlx::query("DELETE FROM friend_requests WHERE recipient_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete own friend requests")?;
        sqlx::query("DELETE FROM friendships WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete own friendships")?;
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user")?;

        tx.commit().await.context("commit tx")?;
        Ok(res.rows_affected() > 0)
    }

    async fn add_friend_request(&self, recipient: Uuid, sender: Uuid) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO friend_requests (recipient_id, sender_id) VALUES ($1, $2)")
            .bind(recipient)
            .bind(sender)
            .execute(&self.db)
            .await
            .map_err(unique_violation)
            .context("insert friend request")?;
        Ok(())
    }

    async fn accept_friend_request(&self, user: Uuid, sender: Uuid) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        sqlx::query(
            r#"
            UPDATE friend_requests
               SET is_approved = TRUE
             WHERE (recipient_id = $1 AND sender_id = $2)
                OR (recipient_id = $2 AND sender_id = $1)
            "#,
        )
        .bind(user)
        .bind(sender)
        .execute(&mut *tx)
        .await
        .context("approve friend request")?;

        sqlx::query("INSERT INTO friendships (user_id, friend_id) VALUES ($1, $2), ($2, $1)")
            .bind(user)
            .bind(sender)
            .execute(&mut *tx)
            .await
            .map_err(unique_violation)
            .context("insert friendship")?;

        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn pending_friend_requests(&self, user: Uuid) -> anyhow::Result<Vec<PendingFriendRequest>> {
        // Inner join drops requests whose sender has since been deleted.
        let rows = sqlx::query_as::<_, FriendSummary>(
            r#"
            SELECT u.id, u.user_name, u.email
              FROM friend_requests fr
              JOIN users u ON u.id = fr.sender_id
             WHERE fr.recipient_id = $1
               AND NOT fr.is_approved
             ORDER BY fr.seq ASC
            "#,
        )
        .bind(user)
        .fetch_all(&self.db)
        .await
        .context("list pending friend requests")?;

        Ok(rows
            .into_iter()
            .map(|friend_user| PendingFriendRequest {
                friend_user,
                is_approved: false,
            })
            .collect())
    }
}

// These run against a throwaway database created by `sqlx::test` and need
// `DATABASE_URL` to point at a Postgres server:
// `cargo test -- --ignored`.
#[cfg(test)]
mod pg_tests {
    use super::*;
    use crate::error::ApiError;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            user_name: name.into(),
            email: format!("{name}@x.com"),
            password_hash: "hash".into(),
        }
    }

    async fn pair(store: &PgUserStore) -> anyhow::Result<(User, User)> {
        Ok((
            store.create(new_user("alice")).await?,
            store.create(new_user("bob")).await?,
        ))
    }

    fn duplicate_message(err: anyhow::Error) -> String {
        match ApiError::from(err) {
            ApiError::Conflict(msg) => msg,
            other => panic!("expected a duplicate key, got {other:?}"),
        }
    }

    async fn count(pool: &PgPool, sql: &str, id: Uuid) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn create_maps_unique_constraints(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool);
        store.create(new_user("alice")).await?;

        let same_name = store
            .create(NewUser {
                email: "other@x.com".into(),
                ..new_user("alice")
            })
            .await
            .unwrap_err();
        assert_eq!(duplicate_message(same_name), "user name is already taken");

        let same_email = store
            .create(NewUser {
                user_name: "alice2".into(),
                ..new_user("alice")
            })
            .await
            .unwrap_err();
        assert_eq!(duplicate_message(same_email), "email is already registered");
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn update_profile_keeps_unset_fields(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool);
        let (alice, _) = pair(&store).await?;

        let updated = store
            .update_profile(
                alice.id,
                &ProfileChanges {
                    description: Some("hello".into()),
                    ..Default::default()
                },
            )
            .await?
            .expect("alice exists");
        assert_eq!(updated.user_name, "alice");
        assert_eq!(updated.email, "alice@x.com");
        assert_eq!(updated.description.as_deref(), Some("hello"));
        assert_eq!(updated.profile_picture, "");

        let taken = store
            .update_profile(
                alice.id,
                &ProfileChanges {
                    user_name: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(duplicate_message(taken), "user name is already taken");

        let missing = store
            .update_profile(Uuid::new_v4(), &ProfileChanges::default())
            .await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn duplicate_friend_request_is_rejected(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool);
        let (alice, bob) = pair(&store).await?;

        store.add_friend_request(bob.id, alice.id).await?;
        let again = store.add_friend_request(bob.id, alice.id).await.unwrap_err();
        assert_eq!(duplicate_message(again), "friend request already sent");

        let bob = store.find_by_id(bob.id).await?.expect("bob exists");
        assert_eq!(
            bob.friend_requests,
            vec![FriendRequest {
                friend_user: alice.id,
                is_approved: false
            }]
        );
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn accept_records_friendship_on_both_sides(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool);
        let (alice, bob) = pair(&store).await?;

        // Crossed requests: both get approved by one accept.
        store.add_friend_request(bob.id, alice.id).await?;
        store.add_friend_request(alice.id, bob.id).await?;
        store.accept_friend_request(bob.id, alice.id).await?;

        let alice = store.find_by_id(alice.id).await?.expect("alice exists");
        let bob = store.find_by_id(bob.id).await?.expect("bob exists");
        assert!(alice.is_friend_of(bob.id));
        assert!(bob.is_friend_of(alice.id));
        assert!(bob.request_from(alice.id).unwrap().is_approved);
        assert!(alice.request_from(bob.id).unwrap().is_approved);
        assert!(store.pending_friend_requests(bob.id).await?.is_empty());
        assert!(store.pending_friend_requests(alice.id).await?.is_empty());

        let again = store
            .accept_friend_request(bob.id, alice.id)
            .await
            .unwrap_err();
        assert_eq!(duplicate_message(again), "users are already friends");
        let alice = store.find_by_id(alice.id).await?.expect("alice exists");
        assert_eq!(alice.friends.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn pending_lists_senders_in_order_and_skips_deleted(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool);
        let (alice, bob) = pair(&store).await?;
        let carol = store.create(new_user("carol")).await?;
        let dave = store.create(new_user("dave")).await?;

        store.add_friend_request(alice.id, bob.id).await?;
        store.add_friend_request(alice.id, carol.id).await?;
        store.add_friend_request(alice.id, dave.id).await?;
        store.delete(carol.id).await?;

        let pending = store.pending_friend_requests(alice.id).await?;
        let names: Vec<_> = pending
            .iter()
            .map(|p| p.friend_user.user_name.as_str())
            .collect();
        assert_eq!(names, ["bob", "dave"]);
        assert!(pending.iter().all(|p| !p.is_approved));

        // The dangling request itself stays in alice's list.
        let alice = store.find_by_id(alice.id).await?.expect("alice exists");
        assert!(alice.request_from(carol.id).is_some());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn delete_drops_own_graph_and_leaves_others(pool: PgPool) -> anyhow::Result<()> {
        let store = PgUserStore::new(pool.clone());
        let (alice, bob) = pair(&store).await?;
        let carol = store.create(new_user("carol")).await?;

        store.add_friend_request(alice.id, bob.id).await?;
        store.accept_friend_request(alice.id, bob.id).await?;
        store.add_friend_request(alice.id, carol.id).await?;
        store.add_friend_request(carol.id, alice.id).await?;

        assert!(store.delete(alice.id).await?);
        assert!(store.find_by_id(alice.id).await?.is_none());

        let own_requests = "SELECT count(*) FROM friend_requests WHERE recipient_id = $1";
        let own_friends = "SELECT count(*) FROM friendships WHERE user_id = $1";
        assert_eq!(count(&pool, own_requests, alice.id).await, 0);
        assert_eq!(count(&pool, own_friends, alice.id).await, 0);

        let bob = store.find_by_id(bob.id).await?.expect("bob exists");
        let carol = store.find_by_id(carol.id).await?.expect("carol exists");
        assert!(bob.is_friend_of(alice.id));
        assert!(carol.request_from(alice.id).is_some());

        assert!(!store.delete(alice.id).await?);
        Ok(())
    }
}
