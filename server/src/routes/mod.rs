mod app_router;
pub mod export_collection;
pub mod inbound_webhook;
pub mod kickstart_db;
pub mod reprocess_emails;

pub use app_router::AppRouter;
