pub mod chat;
pub mod dify;
pub mod error;
pub mod upload;
