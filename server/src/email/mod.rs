pub mod address;
pub mod content;
pub mod inbound;
pub mod pipeline;
pub mod reprocessor;
