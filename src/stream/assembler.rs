//! Response assembly driver.
//!
//! # Responsibilities
//! - Relay the renderer's stream through the marker substitutions
//! - Spawn every deferred fragment as soon as assembly starts
//! - Hold settled fragments behind the flush gate until the document is out
//! - Close only after every registered fragment has been flushed
//!
//! # Design Decisions
//! - One driver task per response, connected to the consumer by a bounded
//!   channel. Backpressure from a slow client stalls the driver, not the
//!   fragments.
//! - Fragments run as detached tasks. A disconnect drops the upstream
//!   render immediately; fragment results that arrive afterwards are counted
//!   and discarded.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::StreamConfig;
use crate::observability::metrics;
use crate::render::RenderStream;
use crate::stream::deferred::{DeferredFragment, Settlement};
use crate::stream::inject::Injection;
use crate::stream::scanner::Substitutions;
use crate::stream::state::{FlushGate, StreamState};
use crate::stream::StreamError;

/// Byte stream handed to the HTTP layer.
pub type AssembledStream = BoxStream<'static, Result<Bytes, StreamError>>;

type Output = mpsc::Sender<Result<Bytes, StreamError>>;

/// Builds assembled streams from a render stream, injected content and
/// deferred fragments.
#[derive(Debug, Clone)]
pub struct StreamAssembler {
    doctype: String,
    head_marker: String,
    body_marker: String,
    channel_capacity: usize,
}

impl StreamAssembler {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            doctype: config.doctype.clone(),
            head_marker: config.head_marker.clone(),
            body_marker: config.body_marker.clone(),
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    /// Start assembling. Must be called inside a Tokio runtime.
    pub fn assemble(
        &self,
        upstream: RenderStream,
        injection: Injection,
        fragments: Vec<DeferredFragment>,
    ) -> AssembledStream {
        let substitutions = Substitutions::new(
            &self.doctype,
            &self.head_marker,
            injection.head,
            &self.body_marker,
            injection.footer,
        );
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let span = tracing::debug_span!("assemble", fragments = fragments.len());
        tokio::spawn(drive(upstream, substitutions, fragments, tx).instrument(span));

        stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
        .boxed()
    }
}

async fn drive(
    mut upstream: RenderStream,
    mut substitutions: Substitutions,
    fragments: Vec<DeferredFragment>,
    tx: Output,
) {
    let registered = fragments.len();
    let (settled_tx, mut settled_rx) = mpsc::unbounded_channel::<Settlement>();
    for fragment in fragments {
        let settled_tx = settled_tx.clone();
        tokio::spawn(async move {
            let settlement = fragment.settle().await;
            if settled_tx.send(settlement).is_err() {
                metrics::record_fragment("discarded");
            }
        });
    }
    drop(settled_tx);

    let mut state = StreamState::default();
    let mut gate = FlushGate::default();

    loop {
        tokio::select! {
            biased;
            _ = tx.closed() => {
                tracing::debug!(state = ?state, "Consumer disconnected, dropping upstream");
                return;
            }
            chunk = upstream.next() => match chunk {
                Some(Ok(chunk)) => {
                    for piece in substitutions.feed(chunk) {
                        if tx.send(Ok(piece)).await.is_err() {
                            return;
                        }
                    }
                    if substitutions.head_injected() {
                        state.advance(StreamState::Content);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, state = ?state, "Upstream render failed");
                    let _ = tx.send(Err(StreamError::Upstream(e))).await;
                    state.advance(StreamState::Done);
                    return;
                }
                None => break,
            },
            Some(settlement) = settled_rx.recv() => {
                tracing::trace!(fragment = %settlement.id, "Fragment settled before document end");
                let _ = gate.admit(settlement);
            }
        }
    }

    for piece in substitutions.finish() {
        if tx.send(Ok(piece)).await.is_err() {
            return;
        }
    }
    drop(upstream);
    state.advance(StreamState::Deferred);

    let mut flushed = 0;
    for settlement in gate.open() {
        if !emit(&tx, settlement).await {
            return;
        }
        flushed += 1;
    }

    while flushed < registered {
        tokio::select! {
            biased;
            _ = tx.closed() => {
                tracing::debug!(flushed, registered, "Consumer disconnected during deferred phase");
                return;
            }
            settled = settled_rx.recv() => match settled {
                Some(settlement) => {
                    if !emit(&tx, settlement).await {
                        return;
                    }
                    flushed += 1;
                }
                None => {
                    tracing::warn!(flushed, registered, "Fragment tasks ended without settling");
                    break;
                }
            }
        }
    }

    state.advance(StreamState::Done);
    tracing::debug!(fragments = flushed, "Stream complete");
}

async fn emit(tx: &Output, settlement: Settlement) -> bool {
    let outcome = if settlement.is_resolved() { "resolved" } else { "rejected" };
    if let Err(error) = &settlement.outcome {
        tracing::warn!(fragment = %settlement.id, error = %error, "Deferred fragment rejected");
    }
    metrics::record_fragment(outcome);
    tx.send(Ok(settlement.render())).await.is_ok()
}
