pub mod context;
pub mod http_value;
pub mod request;
pub mod response;

pub use context::HttpReqCtx;
pub use http_value::{HttpMethod, StatusCode};
pub use request::{HttpRequest, PeerCertificate};
pub use response::HttpResponse;
