use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A list of items, addressed publicly by its random `key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct List {
    pub id: i64,
    pub key: String,
    pub is_private: bool,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An entry on a list. `price` is free-form text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub list_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new list. Leaving `is_private` unset defers to the column default.
#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct NewList {
    pub is_private: Option<bool>,
    #[validate(length(min = 2, max = 256, message = "Title must be between 2 and 256 characters"))]
    pub title: String,
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: String,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ListChanges {
    pub is_private: bool,
    #[validate(length(min = 2, max = 256, message = "Title must be between 2 and 256 characters"))]
    pub title: String,
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: String,
}

#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct NewItem {
    #[validate(range(min = 1, message = "Invalid list ID"))]
    pub list_id: i64,
    #[validate(length(min = 2, max = 256, message = "Title must be between 2 and 256 characters"))]
    pub title: String,
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct ItemChanges {
    #[validate(range(min = 1, message = "Invalid list ID"))]
    pub list_id: i64,
    #[validate(length(min = 2, max = 256, message = "Title must be between 2 and 256 characters"))]
    pub title: String,
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: Option<String>,
    pub price: Option<String>,
}

/// Input for a new user. Hashing the password is the caller's job.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct NewUser {
    #[validate(custom(function = "not_blank", message = "Username must not be empty"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password hash must not be empty"))]
    pub password_hash: String,
}

/// Profile fields a user can change after signing up.
#[derive(Debug, Clone, Validate)]
pub(crate) struct UserChanges {
    #[validate(custom(function = "not_blank", message = "Username must not be empty"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

impl NewList {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            is_private: None,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }
}

impl From<&List> for ListChanges {
    fn from(list: &List) -> Self {
        Self {
            is_private: list.is_private,
            title: list.title.clone(),
            description: list.description.clone(),
        }
    }
}

impl NewItem {
    pub fn new(list_id: i64, title: impl Into<String>) -> Self {
        Self {
            list_id,
            title: title.into(),
            ..Self::default()
        }
    }
}

impl From<&Item> for ItemChanges {
    fn from(item: &Item) -> Self {
        Self {
            list_id: item.list_id,
            title: item.title.clone(),
            description: item.description.clone(),
            price: item.price.clone(),
        }
    }
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
