use crate::{CallError, MethodArgs, MethodError, RequestCtx, Route, RpcRecv, RpcSend};
use serde_json::value::RawValue;
use std::future::Future;

/// A trait describing handlers for hub methods.
///
/// Handlers map a [`RequestCtx`] and some params type `P` to a future that
/// resolves to `Result<R, MethodError>`. The params are decoded from the
/// request's raw JSON before the handler is invoked, and the result is
/// encoded afterwards. A request without params decodes its params from JSON
/// `null`, so `()` and `Option<T>` params accept an absent `params` field.
///
/// This trait is blanket implemented for async functions and closures of the
/// form `Fn(RequestCtx, P) -> impl Future<Output = Result<R, E>>`, where `E`
/// converts into a [`MethodError`].
///
/// ### Returning error codes
///
/// Handlers that need a specific error code return a [`HandlerError`] with a
/// code in [`CUSTOM_ERROR_RANGE`]. Any other error is answered as an internal
/// error, echoing the error's `Display` output.
///
/// ```
/// # use ajj_hub::{HandlerError, MethodError, RequestCtx};
/// let handler_a = |_ctx: RequestCtx, amount: u64| async move {
///     if amount > 100 {
///         return Err(HandlerError::new(-32001, "amount too large"));
///     }
///     Ok(amount * 2)
/// };
/// let handler_b = |_ctx: RequestCtx, _: ()| async {
///     Err::<(), _>("appears in \"message\"")
/// };
/// ```
///
/// ### Handler return type inference
///
/// Handlers that always succeed or always fail may have trouble with type
/// inference, as the other half of the `Result` could be anything. Add
/// turbofish to the return value:
///
/// ```
/// # use ajj_hub::{MethodError, RequestCtx};
/// // specify the Err on your Ok
/// let handler_a = |_ctx: RequestCtx, _: ()| async { Ok::<_, MethodError>(1) };
///
/// // specify the Ok on your Err
/// let handler_b = |_ctx: RequestCtx, _: ()| async { Err::<(), _>("nope") };
/// ```
///
/// [`HandlerError`]: crate::HandlerError
/// [`CUSTOM_ERROR_RANGE`]: crate::CUSTOM_ERROR_RANGE
pub trait Handler<P, R>: Clone + Send + Sync + Sized + 'static {
    /// Invoke the handler.
    fn call(
        &self,
        ctx: RequestCtx,
        params: P,
    ) -> impl Future<Output = Result<R, MethodError>> + Send;
}

impl<F, Fut, P, R, E> Handler<P, R> for F
where
    F: Fn(RequestCtx, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send,
    E: Into<MethodError>,
{
    fn call(
        &self,
        ctx: RequestCtx,
        params: P,
    ) -> impl Future<Output = Result<R, MethodError>> + Send {
        let fut = self(ctx, params);
        async move { fut.await.map_err(Into::into) }
    }
}

/// Decode raw params into the handler's param type.
fn decode_params<P: RpcRecv>(params: Option<&RawValue>) -> Result<P, CallError> {
    let raw = params.map(RawValue::get).unwrap_or("null");
    serde_json::from_str(raw).map_err(CallError::InvalidParams)
}

/// Erase a typed handler into a [`Route`].
///
/// The returned route decodes params into `P`, invokes the handler, and
/// encodes the `R` result.
pub(crate) fn into_route<H, P, R>(handler: H) -> Route
where
    H: Handler<P, R>,
    P: RpcRecv,
    R: RpcSend + 'static,
{
    Route::from_fn(move |args: MethodArgs| {
        let handler = handler.clone();
        async move {
            let (ctx, params) = args.into_parts();
            let params = decode_params::<P>(params.as_deref())?;
            let result = handler.call(ctx, params).await?;
            result.into_raw_value().map_err(CallError::SerializeResult)
        }
    })
}
