//! Per-connection OpenFlow session transceiver.
//!
//! One [`Transceiver`] drives one TCP connection: it frames inbound bytes
//! into messages, walks the handshake state machine, answers echoes, sends
//! keepalives, and hands typed messages to a [`MessageHandler`]. All
//! outbound traffic funnels through a single bounded queue with one
//! consumer, so writes are serialized and strictly ordered. A
//! [`SessionHandle`] is the cheap, clonable face of a session: it allocates
//! transaction ids, enqueues messages without blocking, and carries the
//! single-shot cancel signal.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use log::{debug, warn};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout};

use crate::message::{
    ErrorMsg, ErrorType, HelloFailed, Message, PortConfig, PortMod, PortStatus, SwitchFeatures,
};
use crate::message::{FlowRemoved, PacketIn, StatsResp};
use crate::ofp_header::{OfpHeader, Xid, OFP_VERSION};
use crate::ofp_message::{CodecError, OfpMessage};
use crate::openflow0x01::OfpPort;

/// Frames queued per session before senders see backpressure. Sized so the
/// post-handshake port-mod burst fits even for a fully populated switch.
const SEND_QUEUE_DEPTH: usize = 2048;

/// The session fails after this many read-timeout windows without any
/// inbound frame.
const STALL_MULTIPLIER: u32 = 3;

/// Socket timeouts for a session. Echo keepalives go out at half the write
/// timeout so liveness is probed well inside the stall window.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    fn echo_interval(&self) -> Duration {
        self.write_timeout / 2
    }

    fn stall_window(&self) -> Duration {
        self.read_timeout * STALL_MULTIPLIER
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has ended; callers may retry on another connection.
    #[error("session disconnected")]
    Disconnected,
    /// The send queue is full; the switch is not draining fast enough.
    #[error("session send queue full")]
    Congested,
    /// No inbound frame or completed write inside the liveness window.
    #[error("no traffic from the switch within the liveness window")]
    Stalled,
    #[error("handshake failed: {reason}")]
    Handshake { reason: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Handshake and steady-state phases of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    HelloSent,
    HelloReceived,
    FeaturesRequested,
    FeaturesReceived,
    Ready,
    Failed,
    Closed,
}

/// Typed callbacks the transceiver resolves by message type. Handlers run on
/// the session's task and must not block on other sessions.
pub trait MessageHandler: Send {
    fn on_features_reply(
        &mut self,
        _session: &SessionHandle,
        _feats: &SwitchFeatures,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// The switch acknowledged the post-handshake barrier and is usable.
    fn on_ready(&mut self, _session: &SessionHandle) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_packet_in(
        &mut self,
        _session: &SessionHandle,
        _pkt: PacketIn,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_port_status(
        &mut self,
        _session: &SessionHandle,
        _status: PortStatus,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_flow_removed(
        &mut self,
        _session: &SessionHandle,
        _removed: FlowRemoved,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_error(&mut self, _session: &SessionHandle, _err: ErrorMsg) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_stats_reply(
        &mut self,
        _session: &SessionHandle,
        _stats: StatsResp,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    fn on_barrier_reply(
        &mut self,
        _session: &SessionHandle,
        _xid: Xid,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// The session reached a terminal state and its socket is gone.
    fn on_closed(&mut self) {}
}

/// Clonable sending/cancelling side of a session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<(Xid, Message)>,
    xid: Arc<AtomicU32>,
    cancel: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub(crate) fn channel(
        depth: usize,
    ) -> (
        SessionHandle,
        mpsc::Receiver<(Xid, Message)>,
        watch::Receiver<bool>,
    ) {
        let (tx, rx) = mpsc::channel(depth);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = SessionHandle {
            tx,
            xid: Arc::new(AtomicU32::new(1)),
            cancel: Arc::new(cancel_tx),
        };
        (handle, rx, cancel_rx)
    }

    /// Queue a message under a fresh transaction id and return the id.
    pub fn send(&self, msg: Message) -> Result<Xid, SessionError> {
        let xid = self.next_xid();
        self.send_with_xid(xid, msg)?;
        Ok(xid)
    }

    /// Queue a message under the caller's transaction id, e.g. an echo
    /// reply pairing with its request.
    pub fn send_with_xid(&self, xid: Xid, msg: Message) -> Result<(), SessionError> {
        if self.is_cancelled() {
            return Err(SessionError::Disconnected);
        }
        self.tx.try_send((xid, msg)).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => SessionError::Disconnected,
            mpsc::error::TrySendError::Full(_) => SessionError::Congested,
        })
    }

    /// Single-shot broadcast: close the socket and stop the I/O loop within
    /// one timeout interval. Safe to call any number of times.
    pub fn cancel(&self) {
        let _ = self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn next_xid(&self) -> Xid {
        // Wraps at 2^32 by construction.
        self.xid.fetch_add(1, Ordering::Relaxed)
    }
}

enum Event {
    Cancelled,
    Read(usize),
    Outbound(Option<(Xid, Message)>),
    Tick,
}

/// One transceiver per TCP connection.
pub struct Transceiver<H> {
    conf: SessionConfig,
    handler: H,
    handle: SessionHandle,
    outbound: mpsc::Receiver<(Xid, Message)>,
    cancelled: watch::Receiver<bool>,
    state: SessionState,
    barrier_xid: Option<Xid>,
}

impl<H: MessageHandler> Transceiver<H> {
    pub fn new(conf: SessionConfig, handler: H) -> Transceiver<H> {
        let (handle, outbound, cancelled) = SessionHandle::channel(SEND_QUEUE_DEPTH);
        Transceiver {
            conf,
            handler,
            handle,
            outbound,
            cancelled,
            state: SessionState::Connected,
            barrier_xid: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Drive the session to its terminal state. Returns `Ok` on cancel or a
    /// clean peer close after the handshake, an error otherwise.
    pub async fn run(mut self, stream: TcpStream) -> Result<(), SessionError> {
        let (mut rd, mut wr) = stream.into_split();
        let result = self.drive(&mut rd, &mut wr).await;
        self.state = match result {
            Ok(()) => SessionState::Closed,
            Err(_) => SessionState::Failed,
        };
        // Mark the session dead for every handle holder, then flush whatever
        // is still queued, error replies included.
        self.handle.cancel();
        self.flush_pending(&mut wr).await;
        self.handler.on_closed();
        result
    }

    async fn drive(
        &mut self,
        rd: &mut OwnedReadHalf,
        wr: &mut OwnedWriteHalf,
    ) -> Result<(), SessionError> {
        let mut buf = BytesMut::with_capacity(4096);
        let mut last_rx = Instant::now();

        self.handle.send(Message::Hello)?;
        self.state = SessionState::HelloSent;

        let period = self.conf.echo_interval();
        let mut keepalive = interval_at(tokio::time::Instant::now() + period, period);

        loop {
            let event = tokio::select! {
                _ = self.cancelled.changed() => Event::Cancelled,
                read = rd.read_buf(&mut buf) => Event::Read(read?),
                out = self.outbound.recv() => Event::Outbound(out),
                _ = keepalive.tick() => Event::Tick,
            };
            match event {
                Event::Cancelled => {
                    if *self.cancelled.borrow() {
                        debug!("session cancelled");
                        return Ok(());
                    }
                }
                Event::Read(0) => {
                    // Peer closed the connection. Normal after the
                    // handshake; a failure during it.
                    return if self.state == SessionState::Ready {
                        Ok(())
                    } else {
                        Err(SessionError::Disconnected)
                    };
                }
                Event::Read(_) => {
                    last_rx = Instant::now();
                    while let Some((header, body)) = take_frame(&mut buf)? {
                        self.dispatch(header, &body)?;
                    }
                }
                Event::Outbound(Some((xid, msg))) => self.write_frame(wr, xid, msg).await?,
                Event::Outbound(None) => unreachable!("transceiver holds a sender"),
                Event::Tick => {
                    if last_rx.elapsed() >= self.conf.stall_window() {
                        return Err(SessionError::Stalled);
                    }
                    self.handle.send(Message::EchoRequest(Vec::new()))?;
                }
            }
        }
    }

    fn dispatch(&mut self, header: OfpHeader, body: &[u8]) -> Result<(), SessionError> {
        let (xid, msg) = Message::parse(&header, body)?;
        match msg {
            Message::Hello => {
                if header.version() != OFP_VERSION {
                    self.handle.send(Message::Error(ErrorMsg {
                        typ: ErrorType::HelloFailed(HelloFailed::Incompatible),
                        data: Vec::new(),
                    }))?;
                    return Err(SessionError::Handshake {
                        reason: format!("unsupported wire version 0x{:02x}", header.version()),
                    });
                }
                if self.state == SessionState::HelloSent {
                    self.state = SessionState::HelloReceived;
                    self.handle.send(Message::FeaturesRequest)?;
                    self.state = SessionState::FeaturesRequested;
                }
            }
            Message::EchoRequest(data) => {
                self.handle.send_with_xid(xid, Message::EchoReply(data))?;
            }
            Message::EchoReply(_) => {}
            Message::FeaturesReply(feats) => {
                if self.state != SessionState::FeaturesRequested {
                    warn!("unsolicited FEATURES_REPLY in state {:?}", self.state);
                }
                self.state = SessionState::FeaturesReceived;
                self.handler.on_features_reply(&self.handle, &feats)?;
                self.disable_stp(&feats)?;
                self.barrier_xid = Some(self.handle.send(Message::BarrierRequest)?);
            }
            Message::BarrierReply => {
                if self.barrier_xid == Some(xid) {
                    self.barrier_xid = None;
                    self.state = SessionState::Ready;
                    self.handler.on_ready(&self.handle)?;
                } else {
                    self.handler.on_barrier_reply(&self.handle, xid)?;
                }
            }
            Message::Error(err) => {
                if self.state != SessionState::Ready {
                    return Err(SessionError::Handshake {
                        reason: format!("switch rejected the handshake: {:?}", err.typ),
                    });
                }
                self.handler.on_error(&self.handle, err)?;
            }
            Message::PacketIn(pkt) => {
                if self.state == SessionState::Ready {
                    self.handler.on_packet_in(&self.handle, pkt)?;
                }
            }
            Message::PortStatus(status) => self.handler.on_port_status(&self.handle, status)?,
            Message::FlowRemoved(removed) => {
                self.handler.on_flow_removed(&self.handle, removed)?
            }
            Message::StatsReply(stats) => self.handler.on_stats_reply(&self.handle, stats)?,
            other => debug!("ignoring {} sent by the switch", other.msg_code()),
        }
        Ok(())
    }

    /// Switch-side STP interferes with controller-computed paths: emit one
    /// PORT_MOD per physical port setting NO_STP, preserving the advertised
    /// features, before the usability barrier.
    fn disable_stp(&mut self, feats: &SwitchFeatures) -> Result<(), SessionError> {
        for port in &feats.ports {
            if port.port_no > OfpPort::Max as u16 {
                continue;
            }
            let mut config = port.config;
            config.no_stp = true;
            self.handle.send(Message::PortMod(PortMod {
                port_no: port.port_no,
                hw_addr: port.hw_addr,
                config,
                mask: PortConfig {
                    no_stp: true,
                    ..PortConfig::default()
                },
                advertise: port.advertised,
            }))?;
        }
        Ok(())
    }

    async fn write_frame(
        &self,
        wr: &mut OwnedWriteHalf,
        xid: Xid,
        msg: Message,
    ) -> Result<(), SessionError> {
        let data = Message::marshal(xid, msg)?;
        timeout(self.conf.write_timeout, wr.write_all(&data))
            .await
            .map_err(|_| SessionError::Stalled)??;
        Ok(())
    }

    /// Best-effort drain of queued frames on the way out, bounded by one
    /// write timeout.
    async fn flush_pending(&mut self, wr: &mut OwnedWriteHalf) {
        let mut pending = Vec::new();
        while let Ok((xid, msg)) = self.outbound.try_recv() {
            if let Ok(data) = Message::marshal(xid, msg) {
                pending.extend_from_slice(&data);
            }
        }
        if !pending.is_empty() {
            let _ = timeout(self.conf.write_timeout, wr.write_all(&pending)).await;
        }
        let _ = timeout(self.conf.write_timeout, wr.shutdown()).await;
    }
}

/// Pop one complete frame off the accumulation buffer, header validated.
fn take_frame(buf: &mut BytesMut) -> Result<Option<(OfpHeader, BytesMut)>, CodecError> {
    if buf.len() < OfpHeader::size() {
        return Ok(None);
    }
    let header = OfpHeader::parse(&buf[..OfpHeader::size()])?;
    if buf.len() < header.length() {
        return Ok(None);
    }
    let mut frame = buf.split_to(header.length());
    frame.advance(OfpHeader::size());
    Ok(Some((header, frame)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tokio::net::TcpListener;

    use crate::message::{Capabilities, PortDesc, PortFeatures, PortState, SupportedActions};
    use crate::openflow0x01::MAIN_CONNECTION;
    use crate::packet::MacAddr;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn log(&self, event: &str) {
            self.events.lock().unwrap().push(event.to_string());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl MessageHandler for Recorder {
        fn on_features_reply(
            &mut self,
            _session: &SessionHandle,
            feats: &SwitchFeatures,
        ) -> Result<(), SessionError> {
            self.log(&format!("features:{:016x}", feats.datapath_id));
            Ok(())
        }

        fn on_ready(&mut self, _session: &SessionHandle) -> Result<(), SessionError> {
            self.log("ready");
            Ok(())
        }

        fn on_closed(&mut self) {
            self.log("closed");
        }
    }

    fn test_features() -> SwitchFeatures {
        SwitchFeatures {
            datapath_id: 0x0102030405060708,
            num_buffers: 256,
            num_tables: 1,
            auxiliary_id: MAIN_CONNECTION,
            capabilities: Capabilities {
                flow_stats: true,
                port_stats: true,
                ..Capabilities::default()
            },
            actions: SupportedActions {
                output: true,
                ..SupportedActions::default()
            },
            ports: vec![PortDesc {
                port_no: 1,
                hw_addr: MacAddr::new([0, 0, 0, 0, 0, 1]),
                name: "p1".to_string(),
                config: PortConfig::default(),
                state: PortState::default(),
                curr: PortFeatures::from_bits(0x2c0),
                advertised: PortFeatures::from_bits(0x2c0),
                supported: PortFeatures::from_bits(0x2c0),
                peer: PortFeatures::default(),
            }],
        }
    }

    async fn read_msg(stream: &mut TcpStream) -> (OfpHeader, Message) {
        let mut hdr = [0u8; 8];
        stream.read_exact(&mut hdr).await.unwrap();
        let header = OfpHeader::parse(&hdr).unwrap();
        let mut body = vec![0u8; header.length() - OfpHeader::size()];
        stream.read_exact(&mut body).await.unwrap();
        let (_xid, msg) = Message::parse(&header, &body).unwrap();
        (header, msg)
    }

    async fn send_msg(stream: &mut TcpStream, xid: Xid, msg: Message) {
        stream
            .write_all(&Message::marshal(xid, msg).unwrap())
            .await
            .unwrap();
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let controller = TcpStream::connect(addr).await.unwrap();
        let (switch, _) = listener.accept().await.unwrap();
        (controller, switch)
    }

    #[tokio::test]
    async fn handshake_disables_stp_then_barriers() {
        let (controller, mut switch) = connected_pair().await;
        let recorder = Recorder::default();
        let events = recorder.clone();
        let trx = Transceiver::new(SessionConfig::default(), recorder);
        let handle = trx.handle();
        let task = tokio::spawn(trx.run(controller));

        let (hello_hdr, hello) = read_msg(&mut switch).await;
        assert_eq!(hello, Message::Hello);
        assert_eq!(hello_hdr.version(), OFP_VERSION);

        send_msg(&mut switch, 1, Message::Hello).await;
        let (_, features_req) = read_msg(&mut switch).await;
        assert_eq!(features_req, Message::FeaturesRequest);

        send_msg(&mut switch, 2, Message::FeaturesReply(test_features())).await;

        let (_, port_mod) = read_msg(&mut switch).await;
        match port_mod {
            Message::PortMod(pm) => {
                assert_eq!(pm.port_no, 1);
                assert!(pm.config.no_stp);
                assert!(pm.mask.no_stp);
                assert!(!pm.mask.port_down);
                assert_eq!(pm.advertise, PortFeatures::from_bits(0x2c0));
            }
            other => panic!("expected PortMod, got {:?}", other),
        }

        let (barrier_hdr, barrier) = read_msg(&mut switch).await;
        assert_eq!(barrier, Message::BarrierRequest);
        send_msg(&mut switch, barrier_hdr.xid(), Message::BarrierReply).await;

        // Echo must be answered with a matching xid once the link is up.
        send_msg(&mut switch, 99, Message::EchoRequest(vec![1, 2, 3])).await;
        let (echo_hdr, echo) = read_msg(&mut switch).await;
        assert_eq!(echo, Message::EchoReply(vec![1, 2, 3]));
        assert_eq!(echo_hdr.xid(), 99);

        handle.cancel();
        task.await.unwrap().unwrap();
        let events = events.events();
        assert!(events.contains(&"features:0102030405060708".to_string()));
        assert!(events.contains(&"ready".to_string()));
        assert!(events.contains(&"closed".to_string()));
        let fpos = events.iter().position(|e| e.starts_with("features")).unwrap();
        let rpos = events.iter().position(|e| e == "ready").unwrap();
        assert!(fpos < rpos);
    }

    #[tokio::test]
    async fn hello_with_wrong_version_is_rejected() {
        for version in [0u8, 4] {
            let (controller, mut switch) = connected_pair().await;
            let trx = Transceiver::new(SessionConfig::default(), Recorder::default());
            let task = tokio::spawn(trx.run(controller));

            let (_, hello) = read_msg(&mut switch).await;
            assert_eq!(hello, Message::Hello);

            // A bare header claiming a foreign wire version.
            let mut raw = Message::marshal(7, Message::Hello).unwrap();
            raw[0] = version;
            switch.write_all(&raw).await.unwrap();

            let (_, err) = read_msg(&mut switch).await;
            assert_eq!(
                err,
                Message::Error(ErrorMsg {
                    typ: ErrorType::HelloFailed(HelloFailed::Incompatible),
                    data: Vec::new(),
                })
            );
            assert!(matches!(
                task.await.unwrap(),
                Err(SessionError::Handshake { .. })
            ));
        }
    }

    #[tokio::test]
    async fn malformed_frame_fails_the_session() {
        let (controller, mut switch) = connected_pair().await;
        let trx = Transceiver::new(SessionConfig::default(), Recorder::default());
        let task = tokio::spawn(trx.run(controller));

        let (_, hello) = read_msg(&mut switch).await;
        assert_eq!(hello, Message::Hello);

        // length=7 is shorter than the header itself
        switch
            .write_all(&[0x01, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x01])
            .await
            .unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(SessionError::Codec(CodecError::MalformedFrame { .. }))
        ));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_terminal() {
        let (controller, mut switch) = connected_pair().await;
        let trx = Transceiver::new(SessionConfig::default(), Recorder::default());
        let handle = trx.handle();
        let task = tokio::spawn(trx.run(controller));

        let (_, hello) = read_msg(&mut switch).await;
        assert_eq!(hello, Message::Hello);

        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        task.await.unwrap().unwrap();
        assert!(matches!(
            handle.send(Message::Hello),
            Err(SessionError::Disconnected)
        ));
    }

    #[test]
    fn xids_increase_per_session() {
        let (handle, mut rx, _cancel) = SessionHandle::channel(8);
        let a = handle.send(Message::Hello).unwrap();
        let b = handle.send(Message::BarrierRequest).unwrap();
        assert!(b > a);
        assert_eq!(rx.try_recv().unwrap().0, a);
        assert_eq!(rx.try_recv().unwrap().0, b);
    }

    #[test]
    fn frames_are_reassembled_across_reads() {
        let data = Message::marshal(5, Message::EchoRequest(vec![9, 9, 9])).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&data[..6]);
        assert!(take_frame(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&data[6..]);
        let (header, body) = take_frame(&mut buf).unwrap().unwrap();
        assert_eq!(header.xid(), 5);
        assert_eq!(&body[..], &[9, 9, 9]);
        assert!(buf.is_empty());
    }
}
