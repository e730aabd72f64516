//! The host runtime boundary for the weft transaction adapter.
//!
//! weft converts between a host HTTP runtime's native request/response
//! objects and uniform key-value transaction maps. This crate defines the
//! narrow interfaces the adapter consumes from that runtime:
//!
//! - [`NativeRequest`]: a read view of one inbound HTTP request
//! - [`NativeResponse`]: the write side of one outbound HTTP response
//! - [`Scheduler`]: the two thread pools the runtime exposes (the I/O loop
//!   and a bounded worker pool), plus repeating timer tasks
//!
//! It also defines [`Value`], the interchange value type transaction maps
//! hold, and the wire-side error type [`WriteError`].
//!
//! Nothing in this crate performs socket I/O, HTTP parsing, or TLS; those
//! belong to the host runtime behind these traits.

pub mod error;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod value;

pub use error::WriteError;
pub use request::NativeRequest;
pub use response::NativeResponse;
pub use scheduler::{Scheduler, Task, TokioScheduler, WorkerHandle};
pub use value::Value;
