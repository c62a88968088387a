mod error;
mod handlers;
mod responses;
mod server;

pub use error::{domain_error_to_response, HttpError};
pub use handlers::{clamp_limit, ApiState, DEFAULT_LIMIT, MAX_LIMIT};
pub use responses::{AckResponse, ReadingResponse};
pub use server::{build_router, run_http_server, HttpServerConfig};
