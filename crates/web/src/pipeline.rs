//! The router pipeline: per-request dispatch through matching, adaptation,
//! middleware, the handler and the response writer.
//!
//! Each request walks the stage machine
//! `Matching → AdaptingRequest → Middleware[0..n] → Handling →
//! AdaptingResponse → Written`, with a parallel failed state reachable from
//! any stage. Stages chain by awaiting inside one dispatch future, so
//! within a request they run strictly in order; across requests there is no
//! ordering at all and no shared mutable state.

use crate::date::DateService;
use crate::error::{BoxError, PipelineError};
use crate::route::{Rejection, Route, RouteBuildError, RouteBuilder, RouteHandler, RouteOutcome, select};
use crate::txn::Transaction;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::{Method, StatusCode, Uri, Version};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};
use weft_runtime::{NativeRequest, NativeResponse, Scheduler, TokioScheduler};

/// What a middleware stage does with the transaction.
#[derive(Debug)]
pub enum Flow {
    /// Pass the (possibly modified) transaction to the next stage.
    Next(Transaction),
    /// Skip every remaining stage and write this response map.
    Respond(Transaction),
    /// Terminate the chain with no response map at all; the writer ends
    /// the response with whatever status the native object carries.
    Terminate,
}

/// One middleware stage. Stages run on the I/O loop and are expected to be
/// allocation-bound, not I/O-bound.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(&self, txn: Transaction) -> Result<Flow, BoxError>;
}

/// A route's terminal handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, txn: Transaction) -> Result<Transaction, BoxError>;
}

/// The signature of a blocking handler, offloaded to the worker pool.
pub type BlockingFn = dyn Fn(Transaction) -> Result<Transaction, BoxError> + Send + Sync;

/// A plain async fn holder implementing [`Handler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

/// Wraps an async fn as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Transaction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Transaction, BoxError>> + Send,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Transaction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Transaction, BoxError>> + Send,
{
    async fn handle(&self, txn: Transaction) -> Result<Transaction, BoxError> {
        (self.f)(txn).await
    }
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// A plain async fn holder implementing [`Middleware`].
pub struct FnMiddleware<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

/// Wraps an async fn as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F, Fut>
where
    F: Fn(Transaction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Flow, BoxError>> + Send,
{
    FnMiddleware { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F, Fut>
where
    F: Fn(Transaction) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Flow, BoxError>> + Send,
{
    async fn call(&self, txn: Transaction) -> Result<Flow, BoxError> {
        (self.f)(txn).await
    }
}

impl<F, Fut> fmt::Debug for FnMiddleware<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

/// Which transaction map implementation the request adapter materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterMode {
    /// Extract everything up front into an immutable snapshot.
    Eager,
    /// Compute fields on first read, backed by the native request.
    #[default]
    Lazy,
}

/// The pipeline stages, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Matching,
    AdaptingRequest,
    Middleware,
    Handling,
    AdaptingResponse,
    Written,
}

/// What a failing or rejected request looked like when the error-handler
/// registry was consulted.
#[derive(Debug)]
pub struct FailureContext {
    pub status: StatusCode,
    pub rejection: Option<Rejection>,
    pub message: Option<String>,
}

impl FailureContext {
    fn rejected(rejection: Rejection) -> Self {
        Self { status: rejection.status(), rejection: Some(rejection), message: None }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, rejection: None, message: Some(message.into()) }
    }
}

/// Produces the response map for one failed or rejected request.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, failure: &FailureContext) -> Result<Transaction, BoxError>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&FailureContext) -> Result<Transaction, BoxError> + Send + Sync,
{
    fn handle(&self, failure: &FailureContext) -> Result<Transaction, BoxError> {
        self(failure)
    }
}

/// Status-keyed error handlers. Populated at startup, read-only afterwards.
#[derive(Default)]
pub struct ErrorHandlers {
    handlers: HashMap<u16, Box<dyn ErrorHandler>>,
}

impl ErrorHandlers {
    pub fn register(&mut self, status: StatusCode, handler: impl ErrorHandler + 'static) {
        self.handlers.insert(status.as_u16(), Box::new(handler));
    }

    /// Always yields a response map: a registered handler's output, or the
    /// built-in minimal response for the status. A registered handler that
    /// itself fails degrades to an unconditional empty 500.
    pub(crate) fn produce(&self, failure: &FailureContext) -> Transaction {
        match self.handlers.get(&failure.status.as_u16()) {
            Some(handler) => match handler.handle(failure) {
                Ok(txn) => txn,
                Err(e) => {
                    error!(status = %failure.status, cause = %e, "error handler failed, sending empty 500");
                    Transaction::response().with_status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            None => Transaction::response().with_status(failure.status),
        }
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlers").field("statuses", &self.handlers.keys().collect::<Vec<_>>()).finish()
    }
}

/// Hands the native response to exactly one terminal transition.
///
/// Whoever takes the response first writes it; any later completion (a
/// handler finishing after a timeout response went out, say) takes nothing
/// and becomes a no-op.
struct Completion {
    slot: Mutex<Option<Box<dyn NativeResponse>>>,
}

impl Completion {
    fn new(native: Box<dyn NativeResponse>) -> Self {
        Self { slot: Mutex::new(Some(native)) }
    }

    fn take(&self) -> Option<Box<dyn NativeResponse>> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// The native request plus the path parameters its route bound.
///
/// The lazy view holds this wrapper so the `path-params` field extracts
/// the routing result instead of whatever the bare native object carries.
struct RoutedRequest {
    inner: Arc<dyn NativeRequest>,
    params: Vec<(String, String)>,
}

impl NativeRequest for RoutedRequest {
    fn method(&self) -> Method {
        self.inner.method()
    }

    fn uri(&self) -> Uri {
        self.inner.uri()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.inner.headers()
    }

    fn query_string(&self) -> Option<String> {
        self.inner.query_string()
    }

    fn path_params(&self) -> Vec<(String, String)> {
        self.params.clone()
    }

    fn body_bytes(&self) -> Option<Bytes> {
        self.inner.body_bytes()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    fn is_secure(&self) -> bool {
        self.inner.is_secure()
    }

    fn version(&self) -> Version {
        self.inner.version()
    }
}

/// The compiled pipeline: an ordered route list, the error-handler
/// registry and the response writer. Built once per server instance,
/// immutable once requests flow.
pub struct Pipeline {
    routes: Vec<Route>,
    error_handlers: Arc<ErrorHandlers>,
    adapter_mode: AdapterMode,
    scheduler: Arc<dyn Scheduler>,
    writer: Arc<ResponseWriter>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Dispatches one request and guarantees exactly one terminal write on
    /// `native_resp`, whatever happens along the way.
    pub async fn dispatch(&self, native_req: Arc<dyn NativeRequest>, native_resp: Box<dyn NativeResponse>) {
        let completion = Completion::new(native_resp);
        match self.run(native_req).await {
            Ok(txn) => self.finish(txn, &completion, true),
            Err(failure) => self.fail(failure, &completion),
        }
    }

    /// Runs the stages up to (not including) the response write. `Ok(None)`
    /// means a stage terminated the chain without producing a response map.
    async fn run(&self, native_req: Arc<dyn NativeRequest>) -> Result<Option<Transaction>, FailureContext> {
        debug!(stage = ?Stage::Matching, path = %native_req.uri().path());
        let (route, params) = match select(&self.routes, native_req.as_ref()) {
            RouteOutcome::Matched { route, params } => (route, params),
            RouteOutcome::Rejected(rejection) => {
                debug!(status = %rejection.status(), "routing rejected");
                return Err(FailureContext::rejected(rejection));
            }
        };

        debug!(stage = ?Stage::AdaptingRequest, mode = ?self.adapter_mode);
        let routed: Arc<dyn NativeRequest> = Arc::new(RoutedRequest { inner: native_req, params });
        let mut txn = match self.adapter_mode {
            AdapterMode::Eager => Transaction::eager(routed.as_ref()),
            AdapterMode::Lazy => Transaction::lazy(routed),
        };

        for middleware in route.middleware() {
            debug!(stage = ?Stage::Middleware);
            match middleware.call(txn).await {
                Ok(Flow::Next(next)) => txn = next,
                Ok(Flow::Respond(response)) => return Ok(Some(response)),
                Ok(Flow::Terminate) => return Ok(None),
                Err(e) => {
                    let e = PipelineError::handler(e);
                    return Err(FailureContext::error(e.status(), e.to_string()));
                }
            }
        }

        debug!(stage = ?Stage::Handling, mode = ?route.dispatch_mode());
        let response = match route.handler() {
            RouteHandler::Async(handler) => AssertUnwindSafe(handler.handle(txn))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err("handler panicked".into())),
            RouteHandler::Blocking(f) => self.offload(Arc::clone(f), txn).await,
        }
        .map_err(|e| {
            let e = PipelineError::handler(e);
            FailureContext::error(e.status(), e.to_string())
        })?;

        Ok(Some(response))
    }

    /// Runs a blocking handler on the worker pool. The oneshot hop brings
    /// the result back onto the dispatch future's executor, which doubles
    /// as the memory-visibility barrier for the transaction hand-off and
    /// keeps response writes off the worker threads.
    async fn offload(&self, f: Arc<BlockingFn>, txn: Transaction) -> Result<Transaction, BoxError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _handle = self.scheduler.run_on_worker(Box::new(move || {
            let _ = tx.send(f(txn));
        }));
        match rx.await {
            Ok(result) => result,
            Err(_) => Err("blocking handler was cancelled before completing".into()),
        }
    }

    /// Routes a failure or rejection through the error-handler registry and
    /// writes whatever it produces.
    fn fail(&self, failure: FailureContext, completion: &Completion) {
        debug!(status = %failure.status, "dispatching error handler");
        let txn = self.error_handlers.produce(&failure);
        // a failing error handler must not loop back into the registry
        self.finish(Some(txn), completion, false);
    }

    /// The single terminal transition: takes the native response (exactly
    /// once) and writes, re-marshalling onto the I/O loop when the runtime
    /// demands affinity. Late calls find the slot empty and do nothing.
    fn finish(&self, txn: Option<Transaction>, completion: &Completion, may_dispatch_error: bool) {
        let Some(mut native) = completion.take() else {
            warn!("response already completed, ignoring late completion");
            return;
        };
        if native.requires_loop_affinity() {
            let writer = Arc::clone(&self.writer);
            let handlers = Arc::clone(&self.error_handlers);
            self.scheduler.run_on_loop(Box::new(move || {
                write_terminal(&writer, &handlers, txn, native.as_mut(), may_dispatch_error);
            }));
        } else {
            write_terminal(&self.writer, &self.error_handlers, txn, native.as_mut(), may_dispatch_error);
        }
        debug!(stage = ?Stage::Written);
    }
}

fn write_terminal(
    writer: &ResponseWriter,
    handlers: &ErrorHandlers,
    mut txn: Option<Transaction>,
    native: &mut dyn NativeResponse,
    may_dispatch_error: bool,
) {
    debug!(stage = ?Stage::AdaptingResponse);
    match writer.write(txn.as_mut(), native) {
        Ok(()) => {}
        Err(PipelineError::Write { source }) => {
            // never retried; the host logs it and the request is abandoned
            error!(cause = %source, "native response write failed, abandoning request");
        }
        Err(e) if may_dispatch_error => {
            error!(cause = %e, "response coercion failed, dispatching error handler");
            let failure = FailureContext::error(e.status(), e.to_string());
            let fallback = handlers.produce(&failure);
            write_terminal(writer, handlers, Some(fallback), native, false);
        }
        Err(e) => {
            error!(cause = %e, "error response could not be written, sending bare 500");
            native.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            if !native.is_ended() {
                if let Err(end_error) = native.end() {
                    error!(cause = %end_error, "failed to end degraded response");
                }
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("routes", &self.routes)
            .field("adapter_mode", &self.adapter_mode)
            .field("error_handlers", &self.error_handlers)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Pipeline`]: routes in declaration order, error handlers
/// per status, the adapter mode and an optional date service.
pub struct PipelineBuilder {
    routes: Vec<Result<Route, RouteBuildError>>,
    error_handlers: ErrorHandlers,
    adapter_mode: AdapterMode,
    scheduler: Arc<dyn Scheduler>,
    date: Option<Arc<DateService>>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self {
            routes: Vec::new(),
            error_handlers: ErrorHandlers::default(),
            adapter_mode: AdapterMode::default(),
            scheduler: Arc::new(TokioScheduler::new()),
            date: None,
        }
    }

    /// Appends a route. Declaration order is matching order.
    pub fn route(mut self, route: RouteBuilder) -> Self {
        self.routes.push(route.build());
        self
    }

    pub fn error_handler(mut self, status: StatusCode, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handlers.register(status, handler);
        self
    }

    pub fn adapter_mode(mut self, mode: AdapterMode) -> Self {
        self.adapter_mode = mode;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Stamps responses with a `date` header maintained by `service`.
    pub fn date_service(mut self, service: Arc<DateService>) -> Self {
        self.date = Some(service);
        self
    }

    pub fn build(self) -> Result<Pipeline, RouteBuildError> {
        let routes = self.routes.into_iter().collect::<Result<Vec<_>, _>>()?;
        let writer = match self.date {
            Some(service) => ResponseWriter::with_date_service(service),
            None => ResponseWriter::new(),
        };
        Ok(Pipeline {
            routes,
            error_handlers: Arc::new(self.error_handlers),
            adapter_mode: self.adapter_mode,
            scheduler: self.scheduler,
            writer: Arc::new(writer),
        })
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder").field("routes", &self.routes.len()).field("adapter_mode", &self.adapter_mode).finish()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::keys;
    use crate::route::Route;
    use crate::testing::{RecordingResponse, StubRequest};
    use weft_runtime::Value;

    fn echo_path() -> impl Handler {
        handler_fn(|mut txn: Transaction| async move {
            let path = txn.get(keys::PATH).and_then(Value::as_str).unwrap_or("?").to_owned();
            Ok(Transaction::response().with_body(path))
        })
    }

    fn pipeline(routes: Vec<RouteBuilder>) -> Pipeline {
        let mut builder = Pipeline::builder();
        for route in routes {
            builder = builder.route(route);
        }
        builder.build().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn completion_guard_makes_second_write_a_no_op() {
        let pipeline = pipeline(vec![Route::builder("/x").handler(echo_path())]);

        let native = RecordingResponse::new();
        let probe = native.probe();
        let completion = Completion::new(Box::new(native));

        let first = Transaction::response().with_status(StatusCode::OK).with_body("first");
        pipeline.finish(Some(first), &completion, true);
        assert_eq!(probe.body(), Some(Bytes::from_static(b"first")));

        let late = Transaction::response().with_status(StatusCode::GATEWAY_TIMEOUT).with_body("late");
        pipeline.finish(Some(late), &completion, true);
        assert_eq!(probe.status(), StatusCode::OK, "late completion must not overwrite");
        assert_eq!(probe.body(), Some(Bytes::from_static(b"first")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn middleware_respond_short_circuits_the_handler() {
        let handler_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed = Arc::clone(&handler_ran);

        let pipeline = pipeline(vec![
            Route::builder("/guarded")
                .middleware(middleware_fn(|_txn| async {
                    Ok(Flow::Respond(Transaction::response().with_status(StatusCode::UNAUTHORIZED)))
                }))
                .handler(handler_fn(move |_txn| {
                    let observed = Arc::clone(&observed);
                    async move {
                        observed.store(true, std::sync::atomic::Ordering::SeqCst);
                        Ok(Transaction::response())
                    }
                })),
        ]);

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/guarded")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::UNAUTHORIZED);
        assert!(!handler_ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn middleware_terminate_ends_with_preset_status() {
        let pipeline = pipeline(vec![
            Route::builder("/gone")
                .middleware(middleware_fn(|_txn| async { Ok(Flow::Terminate) }))
                .handler(echo_path()),
        ]);

        let mut native = RecordingResponse::new();
        native.set_status(StatusCode::NO_CONTENT);
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/gone")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::NO_CONTENT);
        assert_eq!(probe.body(), None);
        assert!(probe.is_ended());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn middleware_transforms_flow_in_order() {
        let pipeline = pipeline(vec![
            Route::builder("/chain")
                .middleware(middleware_fn(|mut txn: Transaction| async move {
                    txn.insert("trace", "a");
                    Ok(Flow::Next(txn))
                }))
                .middleware(middleware_fn(|mut txn: Transaction| async move {
                    let trace = txn.get("trace").and_then(Value::as_str).unwrap_or("").to_owned();
                    txn.insert("trace", format!("{trace}b"));
                    Ok(Flow::Next(txn))
                }))
                .handler(handler_fn(|mut txn: Transaction| async move {
                    let trace = txn.get("trace").and_then(Value::as_str).unwrap_or("").to_owned();
                    Ok(Transaction::response().with_body(trace))
                })),
        ]);

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/chain")), Box::new(native)).await;

        assert_eq!(probe.body(), Some(Bytes::from_static(b"ab")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn coercion_failure_of_handler_map_reaches_error_registry() {
        let pipeline = Pipeline::builder()
            .route(
                Route::builder("/bad")
                    .handler(handler_fn(|_txn| async { Ok(Transaction::response().with_body(5_i64)) })),
            )
            .error_handler(StatusCode::INTERNAL_SERVER_ERROR, |_failure: &FailureContext| {
                Ok(Transaction::response().with_status(StatusCode::INTERNAL_SERVER_ERROR).with_body("coerce failed"))
            })
            .build()
            .unwrap();

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/bad")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(probe.body(), Some(Bytes::from_static(b"coerce failed")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_error_handler_degrades_to_empty_500() {
        let pipeline = Pipeline::builder()
            .route(Route::builder("/x").handler(echo_path()))
            .error_handler(StatusCode::NOT_FOUND, |_failure: &FailureContext| Err("boom".into()))
            .build()
            .unwrap();

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/missing")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(probe.body(), None);
        assert!(probe.is_ended());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn error_handler_returning_unwritable_map_degrades_to_bare_500() {
        let pipeline = Pipeline::builder()
            .route(Route::builder("/x").handler(echo_path()))
            .error_handler(StatusCode::NOT_FOUND, |_failure: &FailureContext| {
                Ok(Transaction::response().with_body(true))
            })
            .build()
            .unwrap();

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/missing")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(probe.body(), None);
        assert!(probe.is_ended());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_handler_becomes_a_500() {
        fn broken() -> Result<Transaction, crate::error::BoxError> {
            panic!("handler bug")
        }
        let pipeline = pipeline(vec![Route::builder("/panic").handler(handler_fn(|_txn| async { broken() }))]);

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/panic")), Box::new(native)).await;

        assert_eq!(probe.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(probe.is_ended());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_affine_response_is_written_via_the_scheduler() {
        let pipeline = pipeline(vec![Route::builder("/x").handler(echo_path())]);

        let native = RecordingResponse::loop_affine();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/x")), Box::new(native)).await;

        // the write is marshalled onto a scheduled task; give it a beat
        for _ in 0..50 {
            if probe.is_ended() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(probe.body(), Some(Bytes::from_static(b"/x")));
        assert!(probe.is_ended());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn eager_mode_still_sees_path_params() {
        let pipeline = Pipeline::builder()
            .adapter_mode(AdapterMode::Eager)
            .route(Route::builder("/token/:id").handler(handler_fn(|mut txn: Transaction| async move {
                let params = txn.get(keys::PATH_PARAMS).and_then(Value::as_pairs).unwrap_or(&[]).to_vec();
                Ok(Transaction::response().with_body(format!("{params:?}")))
            })))
            .build()
            .unwrap();

        let native = RecordingResponse::new();
        let probe = native.probe();
        pipeline.dispatch(Arc::new(StubRequest::get("/token/42")), Box::new(native)).await;

        let body = probe.body().unwrap();
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("id") && body.contains("42"), "params missing from {body}");
    }
}
