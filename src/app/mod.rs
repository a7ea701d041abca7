pub mod middleware;

pub use middleware::{AsyncHandler, AsyncMiddleware, BoxFuture, Next, Pipeline};
