mod session;

pub mod runner;

pub use cyklop_http::{HttpClient, HttpTransportErrorKind};
pub use session::{DEFAULT_REQUEST_TIMEOUT, Request, Response, UserClient};
