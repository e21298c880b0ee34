//! The per-connection `tokio` actor (§4.2): one task per transport, driving
//! the handshake-to-open sequence, SASL negotiation, and channel dispatch.
//! Grounded in the teacher's `transport::connection::mux::ConnMux` event loop
//! and in `connection::engine::SessionEngine`'s `tokio::select!`/`Running`
//! shape for the control-channel handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::channel::ChannelMux;
use crate::control::ConnectionControl;
use crate::frame::{CloseCode, Frame, FrameBody, Method};
use crate::sasl::{SaslNegotiator, SaslServerConfig, SaslStep};
use crate::session::{CommandAdapter, SessionConfig};
use crate::sink::MessageSink;
use crate::util::Running;

use super::error::{ConnectionInnerError, ConnectionStateError, Error};
use super::heartbeat::HeartBeat;
use super::{negotiate_channel_max, negotiate_frame_max, negotiate_heartbeat};
use super::{ConnectionConfig, ConnectionState, NegotiatedParams};

pub struct ConnectionEngine {
    state: ConnectionState,
    config: ConnectionConfig,
    sasl_config: Arc<SaslServerConfig>,
    sasl: Option<Box<dyn SaslNegotiator>>,
    negotiated: NegotiatedParams,

    channels: ChannelMux,
    channel_outbound: mpsc::Receiver<(u16, Method)>,
    channel_finished: mpsc::Receiver<u16>,

    control: mpsc::Receiver<ConnectionControl>,
    inbound: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Frame>,

    heartbeat: HeartBeat,
    last_frame_at: Instant,
}

impl ConnectionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConnectionConfig,
        sasl_config: Arc<SaslServerConfig>,
        session_config: SessionConfig,
        adapter: Arc<dyn CommandAdapter>,
        sink: Arc<dyn MessageSink>,
        control: mpsc::Receiver<ConnectionControl>,
        inbound: mpsc::Receiver<Frame>,
        outbound: mpsc::Sender<Frame>,
    ) -> Self {
        let (channel_outbound_tx, channel_outbound) = mpsc::channel(256);
        let (channel_finished_tx, channel_finished) = mpsc::channel(256);
        let channel_max_cap = config.channel_max_cap;
        Self {
            state: ConnectionState::Initial,
            channels: ChannelMux::new(
                channel_max_cap,
                session_config,
                adapter,
                sink,
                channel_outbound_tx,
                channel_finished_tx,
            ),
            channel_outbound,
            channel_finished,
            config,
            sasl_config,
            sasl: None,
            negotiated: NegotiatedParams::default(),
            control,
            inbound,
            outbound,
            heartbeat: HeartBeat::never(),
            last_frame_at: Instant::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn send(&self, method: Method) -> Result<(), ConnectionInnerError> {
        self.outbound
            .send(Frame::method(0, method))
            .await
            .map_err(|_| ConnectionInnerError::TransportFailure("outbound channel closed".into()))
    }

    async fn run(mut self) {
        if self
            .send(Method::ConnectionStart {
                mechanisms: self.sasl_config.mechanisms(),
                locales: self.config.locales.clone(),
            })
            .await
            .is_err()
        {
            return;
        }
        self.state = ConnectionState::AwaitStartOk;
        self.event_loop().await;
    }

    async fn event_loop(mut self) {
        loop {
            let result = tokio::select! {
                frame = self.inbound.recv() => {
                    match frame {
                        Some(frame) => self.on_incoming(frame).await,
                        None => Ok(Running::Stop),
                    }
                }
                outgoing = self.channel_outbound.recv() => {
                    match outgoing {
                        Some((channel, method)) => {
                            let _ = self.outbound.send(Frame::method(channel, method)).await;
                            Ok(Running::Continue)
                        }
                        None => Ok(Running::Continue),
                    }
                }
                finished = self.channel_finished.recv() => {
                    if let Some(channel) = finished {
                        // The session engine for this channel has already
                        // exited (`session.close` or a fatal error); reclaim
                        // the table slot so the channel id can be reused.
                        self.channels.drop_channel(channel);
                    }
                    Ok(Running::Continue)
                }
                _ = self.heartbeat.next() => self.on_heartbeat_tick().await,
                control = self.control.recv() => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        None => Ok(Running::Stop),
                    }
                }
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break,
                Err(err) => {
                    tracing::warn!("connection engine closing: {}", err);
                    let public: Error = err.into();
                    let _ = self
                        .send(Method::ConnectionClose {
                            code: public.close_code(),
                            text: public.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
        self.channels.drop_all();
        self.state = ConnectionState::Closed;
    }

    async fn on_heartbeat_tick(&mut self) -> Result<Running, ConnectionStateError> {
        if self.negotiated.heartbeat != 0 {
            let idle_limit = Duration::from_secs(self.negotiated.heartbeat as u64 * 2);
            if self.last_frame_at.elapsed() > idle_limit {
                return Err(ConnectionStateError::Open(ConnectionInnerError::TransportFailure(
                    "peer heartbeat timed out".into(),
                )));
            }
        }
        let _ = self.outbound.send(Frame::heartbeat()).await;
        Ok(Running::Continue)
    }

    async fn on_control(&mut self, control: ConnectionControl) -> Result<Running, ConnectionStateError> {
        match control {
            ConnectionControl::Close(reason) => {
                let (code, text) = reason.unwrap_or((CloseCode::NormalClose, String::new()));
                if self.state == ConnectionState::Open {
                    self.state = ConnectionState::Closing;
                    let _ = self.send(Method::ConnectionClose { code, text }).await;
                }
                Ok(Running::Stop)
            }
            ConnectionControl::QueryState(responder) => {
                let _ = responder.send(self.state);
                Ok(Running::Continue)
            }
            ConnectionControl::DropChannel(channel) => {
                self.channels.drop_channel(channel);
                Ok(Running::Continue)
            }
        }
    }

    async fn on_incoming(&mut self, frame: Frame) -> Result<Running, ConnectionStateError> {
        self.last_frame_at = Instant::now();
        if frame.channel != 0 {
            if let Err(err) = self.channels.dispatch(frame).await {
                let _ = self
                    .outbound
                    .send(Frame::method(
                        err_channel_number(&err),
                        Method::ChannelClose {
                            code: CloseCode::FramingError,
                            text: err.to_string(),
                        },
                    ))
                    .await;
            }
            return Ok(Running::Continue);
        }

        match frame.body {
            FrameBody::Method(method) => self.on_connection_method(method).await,
            FrameBody::Heartbeat => Ok(Running::Continue),
            _ => Err(ConnectionStateError::Open(ConnectionInnerError::TransportFailure(
                "non-method frame on channel 0".into(),
            ))),
        }
    }

    async fn on_connection_method(&mut self, method: Method) -> Result<Running, ConnectionStateError> {
        use ConnectionState::*;
        match (self.state, method) {
            (AwaitStartOk, Method::ConnectionStartOk { mechanism, response, locale }) => {
                self.negotiated.locale = locale;
                self.begin_sasl(&mechanism, &response)
                    .await
                    .map_err(ConnectionStateError::Sasl)?;
                Ok(Running::Continue)
            }
            (AwaitSecureOk, Method::ConnectionSecureOk { response }) => {
                self.continue_sasl(&response)
                    .await
                    .map_err(ConnectionStateError::Sasl)?;
                Ok(Running::Continue)
            }
            (AwaitTuneOk, Method::ConnectionTuneOk { channel_max, max_frame_size, heartbeat }) => {
                self.negotiated.channel_max = negotiate_channel_max(channel_max, self.config.channel_max_cap);
                self.negotiated.max_frame_size = negotiate_frame_max(max_frame_size, self.config.frame_max_cap);
                self.negotiated.heartbeat = negotiate_heartbeat(heartbeat, self.config.heartbeat_max);
                self.heartbeat = HeartBeat::from_negotiated(self.negotiated.heartbeat);
                self.state = AwaitOpen;
                Ok(Running::Continue)
            }
            (AwaitOpen, Method::ConnectionOpen { virtual_host }) => {
                self.negotiated.virtual_host = virtual_host;
                self.send(Method::ConnectionOpenOk)
                    .await
                    .map_err(ConnectionStateError::Open)?;
                self.state = Open;
                Ok(Running::Continue)
            }
            (Open, Method::ConnectionClose { .. }) => {
                self.state = Closing;
                self.send(Method::ConnectionCloseOk)
                    .await
                    .map_err(ConnectionStateError::Open)?;
                Ok(Running::Stop)
            }
            (_, method) => Err(ConnectionStateError::Open(ConnectionInnerError::UnexpectedMethod(
                method.code(),
            ))),
        }
    }

    async fn begin_sasl(&mut self, mechanism: &str, response: &[u8]) -> Result<(), ConnectionInnerError> {
        let mut negotiator = self.sasl_config.create(mechanism)?;
        match negotiator.on_start_ok(response)? {
            SaslStep::Complete { principal } => {
                self.negotiated.principal = Some(principal);
                self.send(Method::ConnectionTune {
                    channel_max: self.config.channel_max_cap,
                    max_frame_size: self.config.frame_max_cap,
                    heartbeat_min: 0,
                    heartbeat_max: self.config.heartbeat_max,
                })
                .await?;
                self.state = ConnectionState::AwaitTuneOk;
            }
            SaslStep::Continue { challenge } => {
                self.send(Method::ConnectionSecure { challenge }).await?;
                self.state = ConnectionState::AwaitSecureOk;
                self.sasl = Some(negotiator);
            }
        }
        Ok(())
    }

    async fn continue_sasl(&mut self, response: &[u8]) -> Result<(), ConnectionInnerError> {
        let mut negotiator = self
            .sasl
            .take()
            .ok_or_else(|| ConnectionInnerError::TransportFailure("no SASL round in progress".into()))?;
        match negotiator.on_secure_ok(response)? {
            SaslStep::Complete { principal } => {
                self.negotiated.principal = Some(principal);
                self.send(Method::ConnectionTune {
                    channel_max: self.config.channel_max_cap,
                    max_frame_size: self.config.frame_max_cap,
                    heartbeat_min: 0,
                    heartbeat_max: self.config.heartbeat_max,
                })
                .await?;
                self.state = ConnectionState::AwaitTuneOk;
            }
            SaslStep::Continue { challenge } => {
                self.send(Method::ConnectionSecure { challenge }).await?;
                self.sasl = Some(negotiator);
            }
        }
        Ok(())
    }
}

fn err_channel_number(err: &crate::error::ChannelError) -> u16 {
    match err {
        crate::error::ChannelError::NotAttached(c) => *c,
        crate::error::ChannelError::ChannelMaxExceeded(c) => *c,
        crate::error::ChannelError::Closed { channel, .. } => *channel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::SaslServerConfig;
    use crate::session::adapter::NullCommandAdapter;
    use crate::sink::ImmediateSink;
    use std::time::Duration as StdDuration;

    fn spawn_connection() -> (
        mpsc::Sender<ConnectionControl>,
        mpsc::Sender<Frame>,
        mpsc::Receiver<Frame>,
    ) {
        let (control_tx, control_rx) = mpsc::channel(8);
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let engine = ConnectionEngine::new(
            ConnectionConfig::default(),
            Arc::new(SaslServerConfig::default()),
            SessionConfig::default(),
            Arc::new(NullCommandAdapter),
            Arc::new(ImmediateSink),
            control_rx,
            inbound_rx,
            outbound_tx,
        );
        engine.spawn();
        (control_tx, inbound_tx, outbound_rx)
    }

    #[tokio::test]
    async fn sends_connection_start_on_spawn() {
        let (_control, _inbound, mut outbound) = spawn_connection();
        let frame = tokio::time::timeout(StdDuration::from_secs(1), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            frame.body,
            FrameBody::Method(Method::ConnectionStart { .. })
        ));
    }

    #[tokio::test]
    async fn full_handshake_to_open_with_anonymous() {
        let (_control, inbound, mut outbound) = spawn_connection();
        let _start = outbound.recv().await.unwrap();

        inbound
            .send(Frame::method(
                0,
                Method::ConnectionStartOk {
                    mechanism: "ANONYMOUS".into(),
                    response: bytes::Bytes::new(),
                    locale: "en_US".into(),
                },
            ))
            .await
            .unwrap();
        let tune = outbound.recv().await.unwrap();
        assert!(matches!(tune.body, FrameBody::Method(Method::ConnectionTune { .. })));

        inbound
            .send(Frame::method(
                0,
                Method::ConnectionTuneOk {
                    channel_max: 0,
                    max_frame_size: 0,
                    heartbeat: 0,
                },
            ))
            .await
            .unwrap();

        inbound
            .send(Frame::method(0, Method::ConnectionOpen { virtual_host: None }))
            .await
            .unwrap();
        let open_ok = outbound.recv().await.unwrap();
        assert!(matches!(open_ok.body, FrameBody::Method(Method::ConnectionOpenOk)));
    }

    #[tokio::test]
    async fn unsupported_mechanism_closes_with_connection_forced() {
        let (_control, inbound, mut outbound) = spawn_connection();
        let _start = outbound.recv().await.unwrap();

        inbound
            .send(Frame::method(
                0,
                Method::ConnectionStartOk {
                    mechanism: "CRAM-MD5".into(),
                    response: bytes::Bytes::new(),
                    locale: "en_US".into(),
                },
            ))
            .await
            .unwrap();

        let close = outbound.recv().await.unwrap();
        match close.body {
            FrameBody::Method(Method::ConnectionClose { code, .. }) => {
                assert_eq!(code, CloseCode::ConnectionForced);
            }
            other => panic!("expected connection.close, got {other:?}"),
        }
    }
}
