pub mod http;
pub mod readings_api;

pub use http::*;
pub use readings_api::*;
