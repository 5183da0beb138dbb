mod ctx;
pub use ctx::RequestCtx;

mod handler;
pub use handler::Handler;
pub(crate) use handler::into_route;

mod method;
pub use method::MethodInfo;
pub(crate) use method::{Method, Methods};

mod middleware;
pub use middleware::Middleware;
pub(crate) use middleware::wrap as middleware_wrap;

use crate::CallError;
use serde_json::value::RawValue;
use std::{
    future::Future,
    task::{Context, Poll},
};
use tower::{util::BoxCloneSyncService, Service, ServiceExt};

/// Type alias for the future produced by a [`Route`].
pub type RouteFuture =
    <BoxCloneSyncService<MethodArgs, Box<RawValue>, CallError> as Service<MethodArgs>>::Future;

/// The erased form of a method handler.
///
/// A route is a [`BoxCloneSyncService`] that takes [`MethodArgs`] (the request
/// context and the raw params) and produces the raw JSON result. Routes are
/// produced from typed [`Handler`]s at registration time, and may be wrapped by
/// [`Middleware`].
///
/// Decoding failures, timeouts, and handler errors are all carried in the
/// [`CallError`]. The dispatcher turns them into error responses.
#[derive(Debug)]
pub struct Route(BoxCloneSyncService<MethodArgs, Box<RawValue>, CallError>);

impl Route {
    /// Create a new route from a service.
    pub fn new<S>(inner: S) -> Self
    where
        S: Service<MethodArgs, Response = Box<RawValue>, Error = CallError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self(BoxCloneSyncService::new(inner))
    }

    /// Create a new route from an async function of [`MethodArgs`].
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(MethodArgs) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Box<RawValue>, CallError>> + Send + 'static,
    {
        Self::new(tower::service_fn(f))
    }

    /// Invoke the route once. This clones the underlying service, so the
    /// route itself can be shared.
    pub fn invoke(&self, args: MethodArgs) -> tower::util::Oneshot<Self, MethodArgs> {
        self.clone().oneshot(args)
    }
}

impl Clone for Route {
    #[track_caller]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Service<MethodArgs> for Route {
    type Response = Box<RawValue>;

    type Error = CallError;

    type Future = RouteFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_ready(cx)
    }

    fn call(&mut self, args: MethodArgs) -> Self::Future {
        self.0.call(args)
    }
}

/// Arguments passed to a [`Route`].
#[derive(Debug, Clone)]
pub struct MethodArgs {
    /// The request context.
    pub(crate) ctx: RequestCtx,
    /// The raw params, if any.
    pub(crate) params: Option<Box<RawValue>>,
}

impl MethodArgs {
    /// Create new method arguments.
    pub const fn new(ctx: RequestCtx, params: Option<Box<RawValue>>) -> Self {
        Self { ctx, params }
    }

    /// Get a reference to the request context.
    pub const fn ctx(&self) -> &RequestCtx {
        &self.ctx
    }

    /// Get a reference to the raw params.
    pub fn params(&self) -> Option<&RawValue> {
        self.params.as_deref()
    }

    /// The name of the method being called.
    pub fn method(&self) -> &str {
        self.ctx.method()
    }

    /// Split into the context and the raw params.
    pub fn into_parts(self) -> (RequestCtx, Option<Box<RawValue>>) {
        (self.ctx, self.params)
    }
}

// Some code is this file is reproduced under the terms of the MIT license. It
// originates from the `axum` crate. The original source code can be found at
// the following URL, and the original license is included below.
//
// https://github.com/tokio-rs/axum/
//
// The MIT License (MIT)
//
// Copyright (c) 2019 Axum Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.
