//! Request-facing entry points.
//!
//! # Overview
//! [`Client::execute`] takes a [`RequestDescription`] and returns status,
//! headers, effective URL and a body that is either fully buffered or a
//! lazy [`BodyStream`]. [`Client::fetch`] wraps it with Fetch-style request
//! and response normalization.
//!
//! # Design
//! The native transfer blocks its thread, so each call runs on tokio's
//! blocking pool with its own handle. Nothing per-request is shared between
//! calls; the process-wide library is the only shared state.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use impersonate_core::{
    to_fetch_response, to_request_description, Error, FetchBody, FetchOptions, FetchResponse,
    RequestDescription, ResponseHead, ResponseMode, Result, TransferResult,
};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

use crate::api::CurlApi;
use crate::callbacks::BodySink;
use crate::library::{self, Library};
use crate::options::TransferPolicy;
use crate::transfer;

/// Body chunks buffered between the transfer thread and a slow consumer.
const STREAM_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct Client {
    api: Arc<dyn CurlApi>,
    policy: TransferPolicy,
}

impl Client {
    /// Client over the process-wide library, loading it with default
    /// discovery if needed.
    pub fn new() -> Result<Self> {
        Ok(Self::with_library(library::acquire()?))
    }

    pub fn with_library(library: Arc<Library>) -> Self {
        Self::with_api(library)
    }

    /// Client over any implementation of the native call surface.
    pub fn with_api(api: Arc<dyn CurlApi>) -> Self {
        Self {
            api,
            policy: TransferPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransferPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    /// Run a transfer on the calling thread, always buffering the body.
    pub fn execute_blocking(&self, desc: &RequestDescription) -> Result<TransferResult> {
        transfer::execute(
            Arc::clone(&self.api),
            desc,
            BodySink::buffered(),
            &self.policy,
        )
    }

    /// Run a transfer on the blocking pool.
    ///
    /// In streamed mode this resolves once the final response head is known;
    /// the body then arrives through the returned stream.
    pub async fn execute(&self, desc: RequestDescription) -> Result<Response> {
        let api = Arc::clone(&self.api);
        let policy = self.policy.clone();
        match desc.response_mode {
            ResponseMode::Buffered => {
                let result = tokio::task::spawn_blocking(move || {
                    transfer::execute(api, &desc, BodySink::buffered(), &policy)
                })
                .await
                .map_err(worker_failed)??;
                let (head, body) = result.into_parts();
                Ok(Response {
                    head,
                    body: ResponseBody::Buffered(body),
                })
            }
            ResponseMode::Streamed => {
                let (head_tx, head_rx) = oneshot::channel();
                let (body_tx, body_rx) = mpsc::channel(STREAM_CAPACITY);
                let worker = tokio::task::spawn_blocking(move || {
                    // The outcome reaches the consumer through the channels.
                    let _ = transfer::execute(
                        api,
                        &desc,
                        BodySink::streamed(head_tx, body_tx),
                        &policy,
                    );
                });
                match head_rx.await {
                    Ok(head) => Ok(Response {
                        head: head?,
                        body: ResponseBody::Streamed(BodyStream { rx: body_rx }),
                    }),
                    Err(_) => Err(match worker.await {
                        Err(e) => worker_failed(e),
                        Ok(()) => Error::Body("transfer ended without a response".to_string()),
                    }),
                }
            }
        }
    }

    /// Fetch-style request: normalize, execute, normalize the response.
    pub async fn fetch(
        &self,
        request: http::Request<FetchBody>,
        options: &FetchOptions,
    ) -> Result<FetchResponse<ResponseBody>> {
        let original_url = request.uri().to_string();
        let (desc, redirect) = to_request_description(request, options)?;
        let response = self.execute(desc).await?;
        to_fetch_response(response.head, response.body, redirect, &original_url)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn worker_failed(e: JoinError) -> Error {
    Error::Body(format!("transfer worker failed: {e}"))
}

/// Response from [`Client::execute`].
#[derive(Debug)]
pub struct Response {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> http::HeaderMap {
        self.head.headers()
    }

    /// URL of the last request in a followed redirect chain.
    pub fn effective_url(&self) -> &str {
        &self.head.effective_url
    }
}

#[derive(Debug)]
pub enum ResponseBody {
    Buffered(Bytes),
    Streamed(BodyStream),
}

impl ResponseBody {
    /// Collect the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streamed(mut stream) => {
                let mut body = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    body.extend_from_slice(&chunk?);
                }
                Ok(body.freeze())
            }
        }
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Body(e.to_string()))
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Body(e.to_string()))
    }

    /// View either kind of body as a stream.
    pub fn into_stream(self) -> BodyStream {
        match self {
            ResponseBody::Streamed(stream) => stream,
            ResponseBody::Buffered(bytes) => {
                let (tx, rx) = mpsc::channel(1);
                if !bytes.is_empty() {
                    let _ = tx.try_send(Ok(bytes));
                }
                BodyStream { rx }
            }
        }
    }
}

/// Body chunks in arrival order. A transfer failure after the head arrives
/// is the last item. Dropping the stream stops the transfer at its next
/// write.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl Stream for BodyStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
