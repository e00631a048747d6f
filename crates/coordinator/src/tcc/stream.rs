//! Caller side of the TCC protocol.

use async_trait::async_trait;
use common::ErrorKind;
use domain::{OrderAggregate, OrderCreateRequest};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors on the caller stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("caller stream closed")]
    Closed,
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// A message sent by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TccRequest {
    /// The empty handshake that opens an attempt.
    Freeze,
    /// The order to create.
    Create(OrderCreateRequest),
}

/// The coordinator's end of a caller stream.
#[async_trait]
pub trait CallerStream: Send {
    /// Receives the next message, or `None` once the caller hung up.
    async fn recv(&mut self) -> Result<Option<TccRequest>, StreamError>;

    /// Emits the created order.
    async fn send(&mut self, order: OrderAggregate) -> Result<(), StreamError>;
}

/// The caller's end of an in-process stream.
#[derive(Debug)]
pub struct TccClient {
    requests: mpsc::Sender<TccRequest>,
    responses: mpsc::Receiver<OrderAggregate>,
}

impl TccClient {
    /// Sends the freeze handshake.
    pub async fn freeze(&self) -> Result<(), StreamError> {
        self.requests
            .send(TccRequest::Freeze)
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Sends the create payload.
    pub async fn submit(&self, request: OrderCreateRequest) -> Result<(), StreamError> {
        self.requests
            .send(TccRequest::Create(request))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Waits for the created order.
    pub async fn receive(&mut self) -> Result<OrderAggregate, StreamError> {
        self.responses.recv().await.ok_or(StreamError::Closed)
    }
}

/// The coordinator's end of an in-process stream.
#[derive(Debug)]
pub struct ChannelCallerStream {
    requests: mpsc::Receiver<TccRequest>,
    responses: mpsc::Sender<OrderAggregate>,
}

#[async_trait]
impl CallerStream for ChannelCallerStream {
    async fn recv(&mut self) -> Result<Option<TccRequest>, StreamError> {
        Ok(self.requests.recv().await)
    }

    async fn send(&mut self, order: OrderAggregate) -> Result<(), StreamError> {
        self.responses
            .send(order)
            .await
            .map_err(|_| StreamError::Closed)
    }
}

/// Creates a connected in-process stream pair.
pub fn channel() -> (TccClient, ChannelCallerStream) {
    let (request_tx, request_rx) = mpsc::channel(2);
    let (response_tx, response_rx) = mpsc::channel(1);
    (
        TccClient {
            requests: request_tx,
            responses: response_rx,
        },
        ChannelCallerStream {
            requests: request_rx,
            responses: response_tx,
        },
    )
}
