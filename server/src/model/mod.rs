pub mod collection;
pub mod database;
pub mod document;
pub mod quota;
pub mod user;

pub const USERS_SET: &str = "users";
pub const DATABASES_SET: &str = "databases";
pub const COLLECTIONS_SET: &str = "collections";
pub const DOCUMENTS_SET: &str = "documents";
pub const QUOTAS_SET: &str = "quotas";
