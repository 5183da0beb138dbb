use crate::{CallError, MethodArgs, Route};
use serde_json::value::RawValue;
use std::{fmt, sync::Arc, time::Instant};
use tower::{Layer, Service};
use tracing::debug;

/// A route transformer, applied to a handler at registration time.
///
/// Middleware wraps a [`Route`] and returns a new one. It may run code before
/// and after the inner route, short-circuit with an error, or alter the
/// arguments and result. Any [`tower::Layer`] over [`Route`] may be used as
/// middleware via [`Middleware::layer`].
///
/// When several middlewares are registered for a method, the first one listed
/// is the outermost. Given `[a, b]`, a request passes through `a`, then `b`,
/// then the handler.
///
/// ```
/// # use ajj_hub::{CallError, MethodArgs, Middleware, RawValue, Route};
/// let deny_all = Middleware::new(|_inner: Route| {
///     Route::from_fn(|_args: MethodArgs| async {
///         Err::<Box<RawValue>, _>(CallError::Cancelled)
///     })
/// });
/// ```
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Route) -> Route + Send + Sync>);

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

impl Middleware {
    /// Create middleware from a route transformer.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Route) -> Route + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Create middleware from a [`tower::Layer`].
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<Route> + Send + Sync + 'static,
        L::Service: Service<MethodArgs, Response = Box<RawValue>, Error = CallError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<MethodArgs>>::Future: Send + 'static,
    {
        Self::new(move |route| Route::new(layer.layer(route)))
    }

    /// Middleware that logs each invocation, its duration, and whether it
    /// failed, at `DEBUG`.
    pub fn trace() -> Self {
        Self::new(|inner: Route| {
            Route::from_fn(move |args: MethodArgs| {
                let inner = inner.clone();
                async move {
                    let method = args.method().to_owned();
                    let start = Instant::now();
                    let res = inner.invoke(args).await;
                    debug!(
                        %method,
                        elapsed_us = start.elapsed().as_micros() as u64,
                        ok = res.is_ok(),
                        "method invoked"
                    );
                    res
                }
            })
        })
    }

    /// Apply this middleware to a route.
    pub fn apply(&self, route: Route) -> Route {
        (self.0)(route)
    }
}

/// Wrap a route in middlewares, the first listed outermost.
pub(crate) fn wrap(route: Route, middlewares: &[Middleware]) -> Route {
    middlewares.iter().rev().fold(route, |route, mw| mw.apply(route))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{routes::into_route, Hub, MethodError, RequestCtx};
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Middleware {
        let log = log.clone();
        Middleware::new(move |inner: Route| {
            let log = log.clone();
            Route::from_fn(move |args: MethodArgs| {
                let inner = inner.clone();
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(name);
                    inner.invoke(args).await
                }
            })
        })
    }

    #[tokio::test]
    async fn first_listed_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let handler_log = log.clone();
        let route = into_route(move |_ctx: RequestCtx, _: ()| {
            let log = handler_log.clone();
            async move {
                log.lock().unwrap().push("handler");
                Ok::<_, MethodError>(())
            }
        });

        let route = wrap(
            route,
            &[recorder(&log, "a"), recorder(&log, "b"), Middleware::trace()],
        );

        let hub = Hub::new().start();
        let ctx = RequestCtx::detached(hub, "m".into());
        route.invoke(MethodArgs::new(ctx, None)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["a", "b", "handler"]);
    }

    #[tokio::test]
    async fn short_circuit() {
        let deny = Middleware::new(|_inner: Route| {
            Route::from_fn(|_args: MethodArgs| async {
                Err::<Box<RawValue>, _>(CallError::Cancelled)
            })
        });
        let route = into_route(|_ctx: RequestCtx, _: ()| async {
            Err::<(), _>("handler must not run")
        });
        let route = wrap(route, &[deny]);

        let hub = Hub::new().start();
        let ctx = RequestCtx::detached(hub, "m".into());
        let err = route.invoke(MethodArgs::new(ctx, None)).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }
}
