use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http::context::HttpReqCtx;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The rest of the chain as seen from one middleware.
pub type Next = Arc<dyn Fn(HttpReqCtx) -> BoxFuture<HttpReqCtx> + Send + Sync + 'static>;

/// A request interceptor. Implementations either answer the request themselves
/// by writing `ctx.response` and returning, or hand the context to `next`.
pub trait AsyncMiddleware: Send + Sync + 'static {
    fn handle(&self, ctx: HttpReqCtx, next: Next) -> BoxFuture<HttpReqCtx>;
}

impl<M: AsyncMiddleware + ?Sized> AsyncMiddleware for Arc<M> {
    fn handle(&self, ctx: HttpReqCtx, next: Next) -> BoxFuture<HttpReqCtx> {
        (**self).handle(ctx, next)
    }
}

/// The application handler at the end of a chain.
pub trait AsyncHandler: Send + Sync + 'static {
    fn call(&self, ctx: HttpReqCtx) -> BoxFuture<HttpReqCtx>;
}

impl<F, Fut> AsyncHandler for F
where
    F: Fn(HttpReqCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpReqCtx> + Send + 'static,
{
    fn call(&self, ctx: HttpReqCtx) -> BoxFuture<HttpReqCtx> {
        Box::pin(self(ctx))
    }
}

/// Wraps a downstream handler with an ordered list of middlewares.
///
/// The first middleware added is the outermost one, so
/// `Pipeline::new(h).layer(auth).layer(scopes)` authenticates before it
/// checks scopes.
pub struct Pipeline {
    handler: Arc<dyn AsyncHandler>,
    middlewares: Vec<Arc<dyn AsyncMiddleware>>,
    entry: Next,
}

impl Pipeline {
    pub fn new<H: AsyncHandler>(handler: H) -> Self {
        let handler: Arc<dyn AsyncHandler> = Arc::new(handler);
        let entry = Self::compose(&handler, &[]);
        Self {
            handler,
            middlewares: Vec::new(),
            entry,
        }
    }

    pub fn layer<M: AsyncMiddleware>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self.entry = Self::compose(&self.handler, &self.middlewares);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs the context through every middleware and, if none of them
    /// answered, the handler.
    pub async fn run(&self, ctx: HttpReqCtx) -> HttpReqCtx {
        (self.entry)(ctx).await
    }

    fn compose(handler: &Arc<dyn AsyncHandler>, middlewares: &[Arc<dyn AsyncMiddleware>]) -> Next {
        let handler = handler.clone();
        let mut next: Next = Arc::new(move |ctx: HttpReqCtx| handler.call(ctx));
        for middleware in middlewares.iter().rev() {
            let middleware = middleware.clone();
            let inner = next.clone();
            next = Arc::new(move |ctx: HttpReqCtx| middleware.handle(ctx, inner.clone()));
        }
        next
    }
}
