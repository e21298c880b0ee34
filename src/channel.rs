//! Channel multiplexing (§4.3): dispatches inbound frames by `channelId` to
//! the resident session, and keeps outbound framesets from interleaving with
//! another command on the same channel.
//!
//! Grounded in the teacher's `transport::connection::mux::ConnMux`, which
//! keeps its session table in a `slab::Slab` indexed by a locally-assigned
//! outgoing channel number. That fits when the multiplexer itself hands out
//! ids; here the wire protocol does the opposite — a client picks any
//! `channelId < channelMax` in its own frames, so the table's key is dictated
//! from outside rather than allocated by us. A `slab::Slab` has no "insert at
//! this key" operation, so the table below is a directly-indexed, sparse
//! `Vec<Option<_>>` instead: still O(1) lookup and reuse-after-close, just
//! keyed the way the protocol actually hands us keys (see DESIGN.md).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::control::SessionControl;
use crate::error::ChannelError;
use crate::frame::{Frame, FrameBody, Method};
use crate::session::{self, SessionConfig};
use crate::sink::MessageSink;

struct ChannelEntry {
    inbound: mpsc::Sender<Frame>,
    control: mpsc::Sender<SessionControl>,
    engine: tokio::task::JoinHandle<()>,
}

/// Owns the channel table for one connection. Not `Send`-shared: lives
/// entirely inside the owning [`crate::connection::engine::ConnectionEngine`]
/// task (§5: "the channel table is exclusively owned by the ConnectionEngine").
pub struct ChannelMux {
    channels: Vec<Option<ChannelEntry>>,
    channel_max: u16,
    config: SessionConfig,
    adapter: Arc<dyn session::CommandAdapter>,
    sink: Arc<dyn MessageSink>,
    outbound: mpsc::Sender<(u16, Method)>,
    finished: mpsc::Sender<u16>,
}

impl ChannelMux {
    /// `finished` is a channel-local signal, distinct from `outbound`: when a
    /// session engine exits (`session.close`, or a fatal error), the relay
    /// task spawned in `open_channel` notices its outbound sender has gone
    /// silent and reports the channel number here, so the owning
    /// [`crate::connection::engine::ConnectionEngine`] can reclaim the table
    /// slot without the session itself needing a handle back into the table.
    pub fn new(
        channel_max: u16,
        config: SessionConfig,
        adapter: Arc<dyn session::CommandAdapter>,
        sink: Arc<dyn MessageSink>,
        outbound: mpsc::Sender<(u16, Method)>,
        finished: mpsc::Sender<u16>,
    ) -> Self {
        Self {
            channels: Vec::new(),
            channel_max,
            config,
            adapter,
            sink,
            outbound,
            finished,
        }
    }

    fn enforce_channel_max(&self, channel: u16) -> Result<(), ChannelError> {
        if channel >= self.channel_max {
            return Err(ChannelError::ChannelMaxExceeded(channel));
        }
        Ok(())
    }

    fn slot(&mut self, channel: u16) -> &mut Option<ChannelEntry> {
        let idx = channel as usize;
        if self.channels.len() <= idx {
            self.channels.resize_with(idx + 1, || None);
        }
        &mut self.channels[idx]
    }

    /// Spawns a fresh [`crate::session::engine::SessionEngine`] bound to
    /// `channel` and registers it in the table, replacing whatever was there.
    pub fn open_channel(&mut self, channel: u16) -> Result<(), ChannelError> {
        self.enforce_channel_max(channel)?;
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(16);
        let (per_channel_out_tx, mut per_channel_out_rx) = mpsc::channel::<Method>(64);

        let engine = session::engine::SessionEngine::new(
            channel,
            self.config.clone(),
            self.adapter.clone(),
            self.sink.clone(),
            control_rx,
            inbound_rx,
            per_channel_out_tx,
        );
        let join = engine.spawn();

        // Tag every frame this channel's session emits with its channel
        // number before it reaches the connection's single outbound sink, so
        // framesets from different channels can interleave but a channel's
        // own commands never do (§4.3). The session dropping this relay's
        // inbound end is also how the relay learns the session is gone, so
        // it reports the channel as finished on its way out.
        let relay_out = self.outbound.clone();
        let finished = self.finished.clone();
        tokio::spawn(async move {
            while let Some(method) = per_channel_out_rx.recv().await {
                if relay_out.send((channel, method)).await.is_err() {
                    break;
                }
            }
            let _ = finished.send(channel).await;
        });

        if let Some(old) = self.slot(channel).replace(ChannelEntry {
            inbound: inbound_tx,
            control: control_tx,
            engine: join,
        }) {
            old.engine.abort();
        }
        Ok(())
    }

    pub fn has_channel(&self, channel: u16) -> bool {
        self.channels
            .get(channel as usize)
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn control_handle(&self, channel: u16) -> Option<mpsc::Sender<SessionControl>> {
        self.channels
            .get(channel as usize)
            .and_then(|slot| slot.as_ref())
            .map(|e| e.control.clone())
    }

    /// Routes one inbound frame to its channel's session, per §4.3: if no
    /// session is resident and the frame is not `session.attach`, the caller
    /// must reply `channel.error` (signalled here as `Err`).
    pub async fn dispatch(&mut self, frame: Frame) -> Result<(), ChannelError> {
        let channel = frame.channel;
        self.enforce_channel_max(channel)?;
        let is_attach = matches!(&frame.body, FrameBody::Method(Method::SessionAttach { .. }));
        if !self.has_channel(channel) {
            if !is_attach {
                return Err(ChannelError::NotAttached(channel));
            }
            self.open_channel(channel)?;
        }
        let entry = self.channels[channel as usize]
            .as_ref()
            .expect("just ensured present");
        let _ = entry.inbound.send(frame).await;
        Ok(())
    }

    /// Removes `channel`'s entry and aborts its session engine task, used by
    /// `channel.close`/`session.detach`-without-resume and connection
    /// teardown alike.
    pub fn drop_channel(&mut self, channel: u16) {
        if let Some(slot) = self.channels.get_mut(channel as usize) {
            if let Some(entry) = slot.take() {
                entry.engine.abort();
            }
        }
    }

    pub fn drop_all(&mut self) {
        for slot in self.channels.iter_mut() {
            if let Some(entry) = slot.take() {
                entry.engine.abort();
            }
        }
    }
}
