pub mod answer;
pub mod dify;
pub mod stream;
