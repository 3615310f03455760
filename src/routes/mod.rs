pub mod apps;
pub mod auth;
pub mod chats;
pub mod files;
pub mod process;
pub mod settings;
pub mod stream;
