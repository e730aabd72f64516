//! Translation from a response transaction map to native response
//! operations.

use crate::date::DateService;
use crate::error::{AdapterError, PipelineError};
use crate::fields::keys;
use crate::txn::Transaction;
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use weft_runtime::{NativeResponse, Value};

/// Writes the handler chain's final transaction map to the wire.
///
/// Coercion happens before any native call: if the map's `status`,
/// `headers` or `body` cannot be translated, the native response is left
/// untouched and the error surfaces to the dispatcher, which can still
/// route it through the error-handler registry.
///
/// Safe to invoke from whatever thread the handler's completion lands on;
/// the dispatcher is responsible for loop-affinity re-marshalling when the
/// runtime demands it.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    date: Option<Arc<DateService>>,
}

struct WritePlan {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self { date: None }
    }

    /// A writer that stamps a `date` header on responses whose handlers
    /// did not set one.
    pub fn with_date_service(date: Arc<DateService>) -> Self {
        Self { date: Some(date) }
    }

    /// Writes `txn` to `native` and ends the response.
    ///
    /// `None` means the pipeline never produced a response map (a stage
    /// terminated the chain early): the response ends with no payload and
    /// whatever status is already set on the native object.
    pub fn write(&self, txn: Option<&mut Transaction>, native: &mut dyn NativeResponse) -> Result<(), PipelineError> {
        let Some(txn) = txn else {
            native.end()?;
            return Ok(());
        };

        let plan = plan(txn)?;
        self.apply(plan, native)
    }

    fn apply(&self, plan: WritePlan, native: &mut dyn NativeResponse) -> Result<(), PipelineError> {
        native.set_status(plan.status);

        let mut has_date = false;
        for (name, value) in &plan.headers {
            has_date = has_date || name.eq_ignore_ascii_case("date");
            native.put_header(name, value);
        }
        if let Some(date) = &self.date {
            if !has_date {
                native.put_header("date", date.current().as_str());
            }
        }

        match plan.body {
            Some(payload) => native.end_bytes(payload)?,
            None => native.end()?,
        }
        Ok(())
    }
}

/// Coerces the map's response fields, touching nothing on the wire.
fn plan(txn: &mut Transaction) -> Result<WritePlan, PipelineError> {
    let status = match txn.get(keys::STATUS) {
        None | Some(Value::Null) => StatusCode::OK,
        Some(Value::Int(code)) => u16::try_from(*code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| AdapterError::invalid_field(keys::STATUS, format!("{code} is not a status code")))?,
        Some(other) => {
            return Err(AdapterError::invalid_field(keys::STATUS, format!("expected int, got {}", other.kind())).into());
        }
    };

    let headers = match txn.get(keys::HEADERS) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Pairs(pairs)) => pairs.clone(),
        Some(other) => {
            return Err(AdapterError::invalid_field(keys::HEADERS, format!("expected pairs, got {}", other.kind())).into());
        }
    };

    // body coercion, tried in order: bytes verbatim, text as UTF-8,
    // null/absent as no payload; anything else cannot go on the wire
    let body = match txn.get(keys::BODY) {
        None | Some(Value::Null) => None,
        Some(Value::Bytes(payload)) => Some(payload.clone()),
        Some(Value::Str(text)) => Some(Bytes::copy_from_slice(text.as_bytes())),
        Some(other) => return Err(AdapterError::unsupported_body_type(other.kind()).into()),
    };

    Ok(WritePlan { status, headers, body })
}
