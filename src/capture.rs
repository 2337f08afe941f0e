//! Live packet capture bound to one interface.
//!
//! A [`CaptureSession`] pairs a frame source with a [`CaptureFilter`] and
//! surfaces only the frames the filter accepts. [`CaptureSession::wait`]
//! turns the session into a one-pass iterator that ends with a timeout
//! signal once its deadline passes; that signal is what separates a
//! filtered port from an answering one.
//!
//! The link itself sits behind [`CaptureBackend`]. [`LiveCapture`] opens
//! pnet datalink channels; tests substitute a scripted backend.

use crate::error::CaptureError;
use crate::packet::{self, DecodedFrame, RawPacket};
use crate::types::InterfaceDescriptor;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Predicate selecting the frames one probe task cares about.
///
/// `Display` renders the equivalent BPF expression; [`matches`](Self::matches)
/// evaluates it against decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFilter {
    /// SYN+ACK or RST+ACK from `host:port`.
    SynReply { host: IpAddr, port: u16 },
    /// ICMP port-unreachable from `host` quoting a datagram to `port`.
    PortUnreachable { host: IpAddr, port: u16 },
    /// ARP reply sent by `sender`.
    ArpReply { sender: Ipv4Addr },
}

impl CaptureFilter {
    pub fn matches(&self, frame: &DecodedFrame) -> bool {
        match (self, frame) {
            (Self::SynReply { host, port }, DecodedFrame::Tcp(segment)) => {
                *host == IpAddr::V4(segment.source)
                    && *port == segment.source_port
                    && segment.flags.verdict().is_some()
            }
            (Self::PortUnreachable { host, port }, DecodedFrame::PortUnreachable(icmp)) => {
                *host == IpAddr::V4(icmp.source) && *port == icmp.quoted_port
            }
            (Self::ArpReply { sender }, DecodedFrame::ArpReply(reply)) => {
                *sender == reply.sender_ip
            }
            _ => false,
        }
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SynReply { host, port } => write!(
                f,
                "tcp and src host {} and src port {} and \
                 ((tcp[tcpflags] & (tcp-syn|tcp-ack) == (tcp-syn|tcp-ack)) or \
                 (tcp[tcpflags] & (tcp-rst|tcp-ack) == (tcp-rst|tcp-ack)))",
                host, port
            ),
            Self::PortUnreachable { host, port } => write!(
                f,
                "icmp[icmptype] == icmp-unreach and icmp[icmpcode] == 3 and \
                 icmp[30:2] == {} and src host {}",
                port, host
            ),
            Self::ArpReply { sender } => {
                write!(f, "arp and arp[6:2] == 2 and arp src host {}", sender)
            }
        }
    }
}

/// Something frames can be read from.
pub trait FrameSource: Send {
    /// Next captured frame, or `Ok(None)` when the read timeout elapsed
    /// with nothing captured.
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Something frames can be written to.
pub trait FrameSink: Send {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Opens receive and transmit handles on one link.
pub trait CaptureBackend: Send + Sync {
    fn open_source(&self, filter: &CaptureFilter) -> Result<Box<dyn FrameSource>, CaptureError>;

    fn open_sink(&self) -> Result<Box<dyn FrameSink>, CaptureError>;
}

/// Outcome of waiting on a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Frame(DecodedFrame),
    Timeout,
}

/// One filtered capture handle, owned by a single probe task.
pub struct CaptureSession {
    filter: CaptureFilter,
    source: Box<dyn FrameSource>,
}

impl CaptureSession {
    pub fn open(backend: &dyn CaptureBackend, filter: CaptureFilter) -> Result<Self, CaptureError> {
        let source = backend.open_source(&filter)?;
        tracing::trace!(%filter, "capture session opened");
        Ok(Self { filter, source })
    }

    /// Consume the session, yielding matching frames until `timeout`
    /// elapses, then a single [`CaptureEvent::Timeout`].
    pub fn wait(self, timeout: Duration) -> Frames {
        Frames {
            session: self,
            deadline: Instant::now() + timeout,
            finished: false,
        }
    }
}

/// Lazy, one-pass stream of captured frames with a deadline.
pub struct Frames {
    session: CaptureSession,
    deadline: Instant,
    finished: bool,
}

impl Iterator for Frames {
    type Item = CaptureEvent;

    fn next(&mut self) -> Option<CaptureEvent> {
        if self.finished {
            return None;
        }

        while Instant::now() < self.deadline {
            match self.session.source.next_frame() {
                Ok(Some(bytes)) => {
                    let frame = packet::decode(&bytes);
                    if self.session.filter.matches(&frame) {
                        return Some(CaptureEvent::Frame(frame));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        filter = %self.session.filter,
                        "capture read failed"
                    );
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }

        self.finished = true;
        Some(CaptureEvent::Timeout)
    }
}

/// Serialized writer shared by every probe task of a scan.
pub struct Transmitter {
    sink: Mutex<Box<dyn FrameSink>>,
}

impl Transmitter {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn open(backend: &dyn CaptureBackend) -> Result<Self, CaptureError> {
        backend.open_sink().map(Self::new)
    }

    /// Write a frame; the packet is consumed whether or not the write succeeds.
    pub fn send(&self, packet: RawPacket) -> io::Result<()> {
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "transmitter lock poisoned"))?;
        sink.send_frame(packet.as_bytes())
    }
}

type LinkChannel = (Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>);

/// pnet datalink channels on a real interface.
pub struct LiveCapture {
    interface: NetworkInterface,
    read_timeout: Duration,
}

impl LiveCapture {
    pub fn new(
        interface: &InterfaceDescriptor,
        read_timeout: Duration,
    ) -> Result<Self, CaptureError> {
        Ok(Self {
            interface: interface.to_network_interface()?,
            read_timeout,
        })
    }

    fn channel(&self) -> Result<LinkChannel, CaptureError> {
        let config = Config {
            read_timeout: Some(self.read_timeout),
            promiscuous: false,
            ..Default::default()
        };

        match datalink::channel(&self.interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => Ok((tx, rx)),
            Ok(_) => Err(CaptureError::UnsupportedChannel(self.interface.name.clone())),
            Err(e) => {
                let err_str = e.to_string().to_lowercase();
                if e.kind() == io::ErrorKind::PermissionDenied
                    || err_str.contains("permission")
                    || err_str.contains("operation not permitted")
                {
                    Err(CaptureError::PermissionDenied(self.interface.name.clone()))
                } else {
                    Err(CaptureError::Open {
                        interface: self.interface.name.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

impl CaptureBackend for LiveCapture {
    fn open_source(&self, _filter: &CaptureFilter) -> Result<Box<dyn FrameSource>, CaptureError> {
        let (_, rx) = self.channel()?;
        Ok(Box::new(LiveSource { rx }))
    }

    fn open_sink(&self) -> Result<Box<dyn FrameSink>, CaptureError> {
        let (tx, _) = self.channel()?;
        Ok(Box::new(LiveSink { tx }))
    }
}

struct LiveSource {
    rx: Box<dyn DataLinkReceiver>,
}

impl FrameSource for LiveSource {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(frame.to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

struct LiveSink {
    tx: Box<dyn DataLinkSender>,
}

impl FrameSink for LiveSink {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx
            .send_to(frame, None)
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "failed to send packet")))
    }
}

/// Scripted link for tests: each opened source replays what the script
/// returns for its filter, and every sent frame is recorded.
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    /// What a source opened for a filter should do.
    pub enum Script {
        /// Opening the source fails.
        Fail,
        /// The source never yields a frame.
        Silent,
        /// The source yields these frames, then nothing.
        Frames(Vec<Vec<u8>>),
    }

    type ScriptFn = dyn Fn(&CaptureFilter, usize) -> Script + Send + Sync;

    pub struct ScriptedBackend {
        script: Box<ScriptFn>,
        opens: Mutex<HashMap<String, usize>>,
        pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
        sink_fails: bool,
    }

    impl ScriptedBackend {
        /// `script` receives the filter and how many sources were opened
        /// for it before this one.
        pub fn new(
            script: impl Fn(&CaptureFilter, usize) -> Script + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                opens: Mutex::new(HashMap::new()),
                sent: Arc::new(Mutex::new(Vec::new())),
                sink_fails: false,
            }
        }

        pub fn with_failing_sink(mut self) -> Self {
            self.sink_fails = true;
            self
        }

        pub fn opens(&self, filter: &CaptureFilter) -> usize {
            self.opens
                .lock()
                .unwrap()
                .get(&filter.to_string())
                .copied()
                .unwrap_or(0)
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn open_source(
            &self,
            filter: &CaptureFilter,
        ) -> Result<Box<dyn FrameSource>, CaptureError> {
            let previous = {
                let mut opens = self.opens.lock().unwrap();
                let count = opens.entry(filter.to_string()).or_insert(0);
                *count += 1;
                *count - 1
            };

            match (self.script)(filter, previous) {
                Script::Fail => Err(CaptureError::Open {
                    interface: "scripted".to_string(),
                    reason: "device busy".to_string(),
                }),
                Script::Silent => Ok(Box::new(QueuedSource(VecDeque::new()))),
                Script::Frames(frames) => Ok(Box::new(QueuedSource(frames.into()))),
            }
        }

        fn open_sink(&self) -> Result<Box<dyn FrameSink>, CaptureError> {
            if self.sink_fails {
                return Err(CaptureError::PermissionDenied("scripted".to_string()));
            }
            Ok(Box::new(RecordingSink(Arc::clone(&self.sent))))
        }
    }

    struct QueuedSource(VecDeque<Vec<u8>>);

    impl FrameSource for QueuedSource {
        fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
            match self.0.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    std::thread::sleep(Duration::from_millis(2));
                    Ok(None)
                }
            }
        }
    }

    struct RecordingSink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl FrameSink for RecordingSink {
        fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }
}
