//! A transaction-map adapter between a native HTTP runtime and
//! application handler chains.
//!
//! The runtime's request and response objects stay behind the narrow
//! [`NativeRequest`] and [`NativeResponse`] traits; handlers see a
//! [`Transaction`] map of well-known string keys (`method`, `path`,
//! `headers`, `status`, `body`, ...) instead. Requests flow through a
//! [`Pipeline`]: route matching in declaration order, request adaptation
//! (eager snapshot or lazy memoizing view), the route's middleware chain,
//! its handler (on the I/O loop or offloaded to the worker pool), and
//! finally the response writer, with a status-keyed error-handler registry
//! catching rejections and failures along the way.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft_web::testing::{RecordingResponse, StubRequest};
//! use weft_web::{handler_fn, Pipeline, Route, Transaction, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = Pipeline::builder()
//!         .route(Route::builder("/hello/:name").handler(handler_fn(|mut txn: Transaction| async move {
//!             let name = txn
//!                 .get("path-params")
//!                 .and_then(Value::as_pairs)
//!                 .and_then(|params| params.first().cloned())
//!                 .map(|(_, v)| v)
//!                 .unwrap_or_default();
//!             Ok(Transaction::response().with_body(format!("hello {name}")))
//!         })))
//!         .build()
//!         .expect("route table is valid");
//!
//!     let response = RecordingResponse::new();
//!     let probe = response.probe();
//!     pipeline.dispatch(Arc::new(StubRequest::get("/hello/world")), Box::new(response)).await;
//!     assert_eq!(probe.body(), Some("hello world".into()));
//! }
//! ```

mod date;
mod error;
mod pipeline;
mod route;
mod txn;
mod writer;

pub mod fields;
pub mod testing;

pub use date::DateService;
pub use error::AdapterError;
pub use error::BoxError;
pub use error::PipelineError;
pub use pipeline::AdapterMode;
pub use pipeline::ErrorHandler;
pub use pipeline::ErrorHandlers;
pub use pipeline::FailureContext;
pub use pipeline::Flow;
pub use pipeline::FnHandler;
pub use pipeline::FnMiddleware;
pub use pipeline::Handler;
pub use pipeline::Middleware;
pub use pipeline::Pipeline;
pub use pipeline::PipelineBuilder;
pub use pipeline::Stage;
pub use pipeline::handler_fn;
pub use pipeline::middleware_fn;
pub use route::DispatchMode;
pub use route::Rejection;
pub use route::Route;
pub use route::RouteBuildError;
pub use route::RouteBuilder;
pub use writer::ResponseWriter;

pub use txn::Entries;
pub use txn::LazyRequest;
pub use txn::LazyView;
pub use txn::Snapshot;
pub use txn::Transaction;
pub use txn::TxnKey;

pub use weft_runtime::NativeRequest;
pub use weft_runtime::NativeResponse;
pub use weft_runtime::Scheduler;
pub use weft_runtime::Value;
pub use weft_runtime::WriteError;
