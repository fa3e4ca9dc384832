use std::env;

pub fn bind_address() -> String {
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    format!("{}:{}", host, port)
}

pub fn relay_url() -> String {
    env::var("RELAY_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}
