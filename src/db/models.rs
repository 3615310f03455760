//! Row types shared across the persistence layer and the HTTP surface.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    /// The shape returned on the wire: never the password hash.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct App {
    pub id: i64,
    pub owner_user_id: i64,
    pub display_name: String,
    pub template: Option<String>,
    pub favorite: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl App {
    /// Workspace-relative root directory under the configured storage root,
    /// e.g. `apps/<user>/<app>` — deterministic, never client-supplied.
    pub fn relative_root(&self) -> std::path::PathBuf {
        std::path::PathBuf::from("apps")
            .join(self.owner_user_id.to_string())
            .join(self.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: i64,
    pub app_id: i64,
    pub title: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub role: Role,
    pub content: String,
    pub request_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub provider: String,
    pub model: String,
}
