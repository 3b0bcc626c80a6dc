pub mod db;
pub mod document;
pub mod identity;
pub mod llm;
pub mod mail;
pub mod memory;
pub mod retry;
pub mod storage;

pub use db::DbAdapter;
pub use identity::{discover_google, DisabledIdentity, GoogleIdentityAdapter};
pub use llm::OllamaAdapter;
pub use mail::{GmailAdapter, NoopMailer};
pub use memory::MemoryStore;
pub use storage::{CloudinaryAdapter, DisabledStorage};
