pub mod dify;
pub mod logging;
pub mod server;
