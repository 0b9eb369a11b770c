//! Cooperative backend for bare-loop targets.
//!
//! The receive interrupt feeds an [`Ingress`](crate::framer::Ingress) whose
//! sink is the producer half of a `heapless::spsc` queue. [`Device`] owns the
//! consumer half and spins on it against an `embassy_time` deadline.

use embassy_time::{Duration, Instant};
use heapless::spsc::Consumer;

use crate::config::Settings;
use crate::datapack::PackBuf;
use crate::error::{Error, GenericError, UrcStatus};
use crate::framer::{Frame, FramingMode, FramingSelector};
use crate::registry::{Handle, Registry};
use crate::service::Sid;
use crate::transaction::{Engine, Event, Outgoing, UrcHandler};

/// Logical channel of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Command,
    Data,
}

/// Transmit side of the platform link.
pub trait Link {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Switch to `channel`, for links exposing command and data separately.
    fn select(&mut self, _channel: Channel) {}

    /// Drop whatever `channel` holds and restart its framing.
    fn reset(&mut self, _channel: Channel) {}

    /// Give the receive path a chance to run. Called on every spin.
    fn poll(&mut self) {}
}

pub struct Device<'q, L, const Q: usize> {
    engine: Engine,
    link: L,
    frames: Consumer<'q, Frame, Q>,
    selector: &'q FramingSelector,
}

impl<'q, L: Link, const Q: usize> Device<'q, L, Q> {
    pub fn new(
        settings: Settings,
        link: L,
        frames: Consumer<'q, Frame, Q>,
        selector: &'q FramingSelector,
    ) -> Self {
        Self {
            engine: Engine::new(settings),
            link,
            frames,
            selector,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Run `sid` to completion. URCs met on the way go to `on_urc`.
    pub fn sendcmd<H: UrcHandler + ?Sized>(
        &mut self,
        sid: Sid,
        req: &PackBuf<'_>,
        rsp: &mut PackBuf<'_>,
        on_urc: &mut H,
    ) -> Result<(), Error> {
        self.engine.begin(sid, req)?;
        loop {
            let (sent, timeout_ms) = match self.engine.next() {
                Outgoing::Done(_) => break,
                Outgoing::Send {
                    bytes,
                    framing,
                    timeout_ms,
                } => {
                    self.selector.select(framing);
                    (self.link.send(bytes), timeout_ms)
                }
                Outgoing::Wait { timeout_ms } => (Ok(()), timeout_ms),
            };
            if let Err(e) = sent {
                error!("Link send failed: {:?}", e);
                self.engine.fail(e);
                continue;
            }
            self.wait(timeout_ms, on_urc);
        }
        self.selector.select(FramingMode::Line);
        self.engine.end(rsp)
    }

    /// Idle event pump. Classifies whatever arrived since the last call and
    /// packs the oldest pending URC into `buf`.
    pub fn get_event(&mut self, buf: &mut PackBuf<'_>) -> Result<Option<UrcStatus>, Error> {
        if self.engine.is_busy() {
            return Err(GenericError::Busy.into());
        }
        self.link.poll();
        while let Some(frame) = self.frames.dequeue() {
            self.on_frame(&frame);
        }
        Ok(self.engine.pop_urc(buf))
    }

    /// Abort everything: leave data mode, forget the SID in flight and
    /// restart framing.
    pub fn reset_context(&mut self) {
        self.engine.reset();
        self.selector.select(FramingMode::Line);
        self.link.reset(Channel::Data);
        self.link.reset(Channel::Command);
        self.link.select(Channel::Command);
        while self.frames.dequeue().is_some() {}
    }

    fn wait<H: UrcHandler + ?Sized>(&mut self, timeout_ms: u32, on_urc: &mut H) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            self.link.poll();
            if let Some(frame) = self.frames.dequeue() {
                match self.on_frame(&frame) {
                    Event::Next => return,
                    Event::Urc => self.engine.deliver_urcs(on_urc),
                    Event::Pending => {}
                }
                continue;
            }
            if Instant::now() >= deadline {
                self.engine.on_timeout();
                return;
            }
        }
    }

    fn on_frame(&mut self, frame: &Frame) -> Event {
        let data_mode = self.engine.data_mode();
        let event = self.engine.on_frame(frame.as_frame());
        if self.engine.data_mode() != data_mode {
            self.link.select(if data_mode {
                Channel::Command
            } else {
                Channel::Data
            });
        }
        event
    }
}

/// Handle based front end over up to `N` devices.
pub struct Devices<'q, L, const Q: usize, const N: usize> {
    registry: Registry<Device<'q, L, Q>, N>,
}

impl<'q, L: Link, const Q: usize, const N: usize> Devices<'q, L, Q, N> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn open(&mut self, device: Device<'q, L, Q>) -> Result<Handle, Error> {
        let handle = self.registry.open(device)?;
        info!("Device opened as {:?}", handle);
        Ok(handle)
    }

    pub fn close(&mut self, handle: Handle) -> Result<Device<'q, L, Q>, Error> {
        self.registry.close(handle)
    }

    pub fn device(&mut self, handle: Handle) -> Result<&mut Device<'q, L, Q>, Error> {
        self.registry.get_mut(handle)
    }

    pub fn sendcmd<H: UrcHandler + ?Sized>(
        &mut self,
        handle: Handle,
        sid: Sid,
        req: &PackBuf<'_>,
        rsp: &mut PackBuf<'_>,
        on_urc: &mut H,
    ) -> Result<(), Error> {
        self.registry.get_mut(handle)?.sendcmd(sid, req, rsp, on_urc)
    }

    pub fn get_event(
        &mut self,
        handle: Handle,
        buf: &mut PackBuf<'_>,
    ) -> Result<Option<UrcStatus>, Error> {
        self.registry.get_mut(handle)?.get_event(buf)
    }

    pub fn reset_context(&mut self, handle: Handle) -> Result<(), Error> {
        self.registry.get_mut(handle)?.reset_context();
        Ok(())
    }
}

impl<'q, L: Link, const Q: usize, const N: usize> Default for Devices<'q, L, Q, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        DnsRequest, DnsResponse, SocketConnect, SocketDataBuffer, SocketDataPendingUrc,
        SocketHandle, SocketRxData, ConfId, Protocol,
    };
    use crate::test_helpers::{fast_settings, init_logging, ScriptedLink, FRAME_QUEUE};
    use heapless::spsc::Queue;
    use heapless::String;
    use no_std_net::{IpAddr, Ipv4Addr};

    fn no_urc(_: &PackBuf<'_>) {}

    #[test]
    fn socket_round_trip() {
        init_logging();
        let selector = FramingSelector::new();
        let mut queue: Queue<Frame, FRAME_QUEUE> = Queue::new();
        let (tx, rx) = queue.split();
        let link = ScriptedLink::new(tx, &selector)
            .answer(b"\r\nOK\r\n\r\n+QIOPEN: 0,0\r\n")
            .answer(b"\r\n> ")
            .answer(b"\r\nSEND OK\r\n\r\n+QIURC: \"recv\",0\r\n")
            .answer(b"\r\n+QIRD: 4,0,4\r\n\r\nOK\r\n")
            .answer(b"\r\n+QIRD: 4\r\npong\r\n\r\nOK\r\n")
            .answer(b"\r\nOK\r\n");
        let mut device = Device::new(fast_settings(), link, rx, &selector);

        let mut req = PackBuf::new();
        req.write_struct(&SocketConnect {
            socket: 5,
            conf: ConfId::Predef,
            protocol: Protocol::Udp,
            remote: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            remote_port: 7,
            local_port: 0,
        })
        .unwrap();
        let mut rsp = PackBuf::new();
        device
            .sendcmd(Sid::DialCommand, &req, &mut rsp, &mut no_urc)
            .unwrap();
        assert_eq!(rsp.read_struct::<SocketHandle>(), Ok(SocketHandle { socket: 5 }));
        let socket = device.engine().context().persist.socket(5).copied().unwrap();
        assert!(socket.connected);
        assert_eq!(socket.modem_cid, 0);

        let mut out = SocketDataBuffer {
            socket: 5,
            ..Default::default()
        };
        out.data.extend_from_slice(b"ping").unwrap();
        let mut req = PackBuf::new();
        req.write_ref(&out);
        let mut pending = 0;
        device
            .sendcmd(
                Sid::SendData,
                &req,
                &mut PackBuf::new(),
                &mut |_: &PackBuf<'_>| pending += 1,
            )
            .unwrap();
        assert_eq!(pending, 0);

        let mut event = PackBuf::new();
        assert_eq!(device.get_event(&mut event), Ok(Some(UrcStatus::Ok)));
        assert_eq!(
            event.read_struct::<SocketDataPendingUrc>(),
            Ok(SocketDataPendingUrc { socket: 5 })
        );

        let mut req = PackBuf::new();
        req.write_struct(&SocketRxData { socket: 5, len: 64 }).unwrap();
        let mut incoming = SocketDataBuffer::default();
        let mut rsp = PackBuf::new();
        rsp.write_mut(&mut incoming);
        device
            .sendcmd(Sid::ReceiveData, &req, &mut rsp, &mut no_urc)
            .unwrap();
        drop(rsp);
        assert_eq!(&incoming.data[..], b"pong");

        let mut req = PackBuf::new();
        req.write_struct(&SocketHandle { socket: 5 }).unwrap();
        device
            .sendcmd(Sid::SocketClose, &req, &mut PackBuf::new(), &mut no_urc)
            .unwrap();
        assert!(device.engine().context().persist.socket(5).is_none());

        assert_eq!(
            device.link().sent(),
            [
                "AT+QIOPEN=1,0,\"UDP\",\"192.0.2.1\",7,0,0\r",
                "AT+QISEND=0,4\r",
                "ping",
                "AT+QIRD=0,0\r",
                "AT+QIRD=0,4\r",
                "AT+QICLOSE=0\r",
            ]
        );
    }

    #[test]
    fn dns_resolution_waits_for_the_urc() {
        init_logging();
        let selector = FramingSelector::new();
        let mut queue: Queue<Frame, FRAME_QUEUE> = Queue::new();
        let (tx, rx) = queue.split();
        let link = ScriptedLink::new(tx, &selector).answer(
            b"\r\nOK\r\n\r\n+QIURC: \"dnsgip\",0,1,600\r\n\r\n+QIURC: \"dnsgip\",\"93.184.216.34\"\r\n",
        );
        let mut device = Device::new(fast_settings(), link, rx, &selector);

        let mut host = String::new();
        host.push_str("example.com").unwrap();
        let mut req = PackBuf::new();
        req.write_struct(&DnsRequest {
            conf: ConfId::Predef,
            primary_dns: None,
            host,
        })
        .unwrap();
        let mut rsp = PackBuf::new();
        device
            .sendcmd(Sid::DnsReq, &req, &mut rsp, &mut no_urc)
            .unwrap();
        assert_eq!(
            rsp.read_struct::<DnsResponse>(),
            Ok(DnsResponse {
                host_addr: IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            })
        );
        assert_eq!(device.link().sent(), ["AT+QIDNSGIP=1,\"example.com\"\r"]);
    }

    #[test]
    fn reset_context_leaves_data_mode() {
        init_logging();
        let selector = FramingSelector::new();
        let mut queue: Queue<Frame, FRAME_QUEUE> = Queue::new();
        let (tx, rx) = queue.split();
        let link = ScriptedLink::new(tx, &selector).answer(b"\r\nCONNECT\r\n");
        let mut device = Device::new(fast_settings(), link, rx, &selector);

        device
            .sendcmd(Sid::DataResume, &PackBuf::new(), &mut PackBuf::new(), &mut no_urc)
            .unwrap();
        assert!(device.engine().data_mode());
        assert_eq!(device.link().channel(), Channel::Data);

        device.reset_context();
        assert!(!device.engine().data_mode());
        assert_eq!(device.link().channel(), Channel::Command);
    }

    #[test]
    fn handles_are_independent() {
        let selector = FramingSelector::new();
        let mut a: Queue<Frame, FRAME_QUEUE> = Queue::new();
        let mut b: Queue<Frame, FRAME_QUEUE> = Queue::new();
        let (atx, arx) = a.split();
        let (btx, brx) = b.split();

        let mut devices: Devices<'_, ScriptedLink<'_>, FRAME_QUEUE, 1> = Devices::new();
        let first = devices
            .open(Device::new(fast_settings(), ScriptedLink::new(atx, &selector), arx, &selector))
            .unwrap();
        assert_eq!(
            devices
                .open(Device::new(fast_settings(), ScriptedLink::new(btx, &selector), brx, &selector))
                .err(),
            Some(Error::Exhausted)
        );

        devices.close(first).unwrap();
        assert_eq!(
            devices.get_event(first, &mut PackBuf::new()),
            Err(Error::InvalidHandle)
        );
    }
}
