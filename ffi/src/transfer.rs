//! Drives one request through the native transfer.
//!
//! # Design
//! `Configuring → Executing → {Completed, Aborted, Failed}`.
//!
//! The callback bridge is created first and lives on this stack frame for the
//! whole call; the ledger borrows it while the handle exists. Release of the
//! handle and everything it references happens before the result code is
//! interpreted, on every path. Streamed consumers are told the outcome last,
//! whatever it was.
//!
//! Cancellation is cooperative: the progress callback reports the abort flag
//! at the native polling cadence, so a running transfer stops at the next
//! poll rather than immediately. A streamed write blocked on a full channel
//! watches the flag too and fails the write when it is set.

use std::sync::Arc;
use std::time::Instant;

use impersonate_core::{
    validate_description, Error, RequestDescription, ResponseHead, Result, TransferResult,
};
use uuid::Uuid;

use crate::api::CurlApi;
use crate::callbacks::{query_head, BodySink, CallbackBridge};
use crate::ledger::ResourceLedger;
use crate::options::{apply_request, TransferPolicy};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Configuring,
    Executing,
    Completed,
    /// Stopped by the caller's abort signal.
    Aborted,
    Failed,
}

/// Run `desc` to a terminal state.
///
/// Buffered sinks get their body in the returned result. Streamed sinks
/// receive the head and body through their channels; the returned body is
/// empty.
pub(crate) fn execute(
    api: Arc<dyn CurlApi>,
    desc: &RequestDescription,
    sink: BodySink,
    policy: &TransferPolicy,
) -> Result<TransferResult> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "transfer",
        %request_id,
        target = %desc.target,
        method = %desc.method,
    );
    let _enter = span.enter();
    let started = Instant::now();

    let mut bridge = CallbackBridge::new(Arc::clone(&api), desc, sink);
    let (state, outcome) = run(&api, desc, &mut bridge, policy);
    bridge.finish_stream(&outcome);

    match &outcome {
        Ok(head) => tracing::debug!(
            state = ?state,
            status = head.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transfer finished"
        ),
        Err(e) => tracing::debug!(
            state = ?state,
            error = %e,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transfer failed"
        ),
    }

    let head = outcome?;
    Ok(TransferResult {
        status: head.status,
        header_lines: head.header_lines,
        body: bridge.take_body(),
        effective_url: head.effective_url,
    })
}

fn run(
    api: &Arc<dyn CurlApi>,
    desc: &RequestDescription,
    bridge: &mut CallbackBridge,
    policy: &TransferPolicy,
) -> (TransferState, Result<ResponseHead>) {
    if let Err(e) = validate_description(desc) {
        return (TransferState::Failed, Err(e.into()));
    }
    if bridge.abort_requested() {
        tracing::debug!("abort signal already set; no transfer attempted");
        let reason = bridge.abort_reason();
        return (TransferState::Aborted, Err(Error::Cancelled { reason }));
    }

    let performed = perform(api, desc, bridge, policy);
    bridge.close();

    let (code, head) = match performed {
        Ok(done) => done,
        Err(e) => {
            tracing::debug!(error = %e, "configuration failed");
            return (TransferState::Failed, Err(e));
        }
    };
    if code != CURLE_OK {
        let (state, error) = classify(api.as_ref(), code, bridge);
        return (state, Err(error));
    }
    match head {
        Some(Ok(mut head)) => {
            head.header_lines = bridge.header_lines().to_vec();
            (TransferState::Completed, Ok(head))
        }
        Some(Err(e)) => (TransferState::Failed, Err(e)),
        None => (
            TransferState::Failed,
            Err(Error::Transfer {
                code,
                message: "response information unavailable".to_string(),
            }),
        ),
    }
}

/// Configure and perform with the ledger scoped to this call; everything it
/// holds is released before returning, on success or error.
fn perform(
    api: &Arc<dyn CurlApi>,
    desc: &RequestDescription,
    bridge: &mut CallbackBridge,
    policy: &TransferPolicy,
) -> Result<(CurlCode, Option<Result<ResponseHead>>)> {
    tracing::trace!(state = ?TransferState::Configuring);
    let mut ledger = ResourceLedger::open(Arc::clone(api))?;
    let userdata = ledger.install_callbacks(bridge);
    apply_request(&mut ledger, desc, userdata, policy)?;

    tracing::trace!(state = ?TransferState::Executing);
    let code = unsafe { api.perform(ledger.handle()) };
    // Header lines are attached once the bridge is released.
    let head = (code == CURLE_OK).then(|| query_head(api.as_ref(), ledger.handle(), Vec::new()));
    ledger.release_all();
    Ok((code, head))
}

/// Map a nonzero native result code to a terminal state and error.
fn classify(api: &dyn CurlApi, code: CurlCode, bridge: &CallbackBridge) -> (TransferState, Error) {
    if bridge.panicked {
        return (
            TransferState::Failed,
            Error::Transfer {
                code,
                message: "response callback panicked".to_string(),
            },
        );
    }
    let aborted = match code {
        CURLE_ABORTED_BY_CALLBACK => bridge.abort_requested(),
        CURLE_WRITE_ERROR => bridge.aborted_in_write,
        _ => false,
    };
    if aborted {
        return (
            TransferState::Aborted,
            Error::Cancelled {
                reason: bridge.abort_reason(),
            },
        );
    }
    if code == CURLE_WRITE_ERROR {
        if bridge.overflowed {
            let limit = bridge.limit().unwrap_or_default();
            return (TransferState::Failed, Error::ResponseTooLarge { limit });
        }
        if bridge.consumer_gone {
            return (
                TransferState::Failed,
                Error::Body("response body stream was dropped".to_string()),
            );
        }
    }
    (
        TransferState::Failed,
        Error::Transfer {
            code,
            message: api.strerror(code),
        },
    )
}
