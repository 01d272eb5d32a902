//! Users and the user-lookup store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::school::StoreError;

/// Portal roles with their stable numeric ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Student,
    Parent,
}

impl Role {
    pub fn id(&self) -> i32 {
        match self {
            Self::SuperAdmin => 1,
            Self::Admin => 2,
            Self::Teacher => 3,
            Self::Student => 4,
            Self::Parent => 5,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::SuperAdmin),
            2 => Some(Self::Admin),
            3 => Some(Self::Teacher),
            4 => Some(Self::Student),
            5 => Some(Self::Parent),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Parent => "parent",
        }
    }

    /// Admin or super-admin
    pub fn is_administrator(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

/// A phone number as entered in the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub country_code: String,
    pub number: String,
}

/// Phone and email lists, stored as JSON arrays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub phones: Vec<PhoneNumber>,
    pub emails: Vec<String>,
}

impl ContactDetails {
    /// Parse stored JSON columns. A missing or malformed list comes back empty.
    pub fn from_stored(phones: Option<&str>, emails: Option<&str>) -> Self {
        Self {
            phones: parse_list_column("phones", phones),
            emails: parse_list_column("emails", emails),
        }
    }

    /// Serialize back to the stored JSON columns
    pub fn to_stored(&self) -> (String, String) {
        (
            serde_json::to_string(&self.phones).unwrap_or_else(|_| "[]".to_string()),
            serde_json::to_string(&self.emails).unwrap_or_else(|_| "[]".to_string()),
        )
    }
}

fn parse_list_column<T: serde::de::DeserializeOwned>(column: &str, raw: Option<&str>) -> Vec<T> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Vec::new(),
    };
    match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(column = column, error = %e, "Malformed contact list, using empty list");
            Vec::new()
        }
    }
}

/// A portal account
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: i32,
    /// Argon2 PHC string; `None` for accounts that cannot log in with a password
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub profile_image_url: Option<String>,
    pub must_change_password: bool,
    pub contacts: ContactDetails,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role_id: role.id(),
            password_hash: None,
            is_active: true,
            profile_image_url: None,
            must_change_password: false,
            contacts: ContactDetails::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn role(&self) -> Option<Role> {
        Role::from_id(self.role_id)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary::from(self)
    }
}

/// The user fields returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: i32,
    pub profile_image_url: Option<String>,
    pub must_change_password: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role_id: user.role_id,
            profile_image_url: user.profile_image_url.clone(),
            must_change_password: user.must_change_password,
        }
    }
}

/// Partial update applied by [`UserStore::update_user`]
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub must_change_password: Option<bool>,
    pub role_id: Option<i32>,
    pub is_active: Option<bool>,
}

/// User lookup and update
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive email lookup
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive username lookup
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User, StoreError>;
}

/// In-memory [`UserStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) -> Uuid {
        let id = user.id;
        self.users.write().insert(id, user);
        id
    }

    pub fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.read().values().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim();
        Ok(self.find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.trim();
        Ok(self.find(|u| u.username.eq_ignore_ascii_case(username)))
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User, StoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;

        if let Some(hash) = update.password_hash {
            user.password_hash = Some(hash);
        }
        if let Some(flag) = update.must_change_password {
            user.must_change_password = flag;
        }
        if let Some(role_id) = update.role_id {
            user.role_id = role_id;
        }
        if let Some(active) = update.is_active {
            user.is_active = active;
        }

        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ids_round_trip() {
        for role in [Role::SuperAdmin, Role::Admin, Role::Teacher, Role::Student, Role::Parent] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert!(Role::Admin.is_administrator());
        assert!(!Role::Teacher.is_administrator());
    }

    #[test]
    fn test_contacts_parse() {
        let contacts = ContactDetails::from_stored(
            Some(r#"[{"countryCode":"+234","number":"8031234567"}]"#),
            Some(r#"["office@school.edu"]"#),
        );
        assert_eq!(contacts.phones.len(), 1);
        assert_eq!(contacts.phones[0].country_code, "+234");
        assert_eq!(contacts.emails, vec!["office@school.edu".to_string()]);
    }

    #[test]
    fn test_malformed_contacts_are_empty() {
        let contacts = ContactDetails::from_stored(Some("{not json"), Some(r#"[1, 2]"#));
        assert!(contacts.phones.is_empty());
        assert!(contacts.emails.is_empty());

        assert_eq!(ContactDetails::from_stored(None, Some("  ")), ContactDetails::default());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let user = User::new("jdoe", "jdoe@school.edu", "Jane", "Doe", Role::Teacher);
        let json = serde_json::to_value(user.summary()).unwrap();
        assert_eq!(json["firstName"], "Jane");
        assert_eq!(json["roleId"], 3);
        assert_eq!(json["mustChangePassword"], false);
        assert!(json["profileImageUrl"].is_null());
    }

    #[tokio::test]
    async fn test_memory_store_lookup_and_update() {
        let store = MemoryUserStore::new();
        let id = store.insert(User::new("jdoe", "JDoe@School.edu", "Jane", "Doe", Role::Teacher));

        let by_email = store.get_user_by_email("jdoe@school.edu").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(id));
        let by_name = store.get_user_by_username("JDOE").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(id));

        let updated = store
            .update_user(
                id,
                UserUpdate {
                    role_id: Some(Role::Admin.id()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role(), Some(Role::Admin));

        let missing = store.update_user(Uuid::new_v4(), UserUpdate::default()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
