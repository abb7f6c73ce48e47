//! TCP + UDP 网络传输
//!
//! 服务通道使用 TCP 长度前缀分帧，实时通道使用 UDP 数据报。
//! 控制器的实时地址从收到的第一个数据报中学习。

use crate::{Channel, Connector, NetError, Transport};
use bytes::Bytes;
use franka_protocol::DEFAULT_SERVICE_PORT;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 服务通道单条消息最大长度
const MAX_SERVICE_MESSAGE: usize = 64 * 1024;

/// UDP 数据报最大负载
const MAX_DATAGRAM: usize = 65_507;

/// `set_read_timeout` / `set_write_timeout` 不接受零时长，零超时被提升到该值
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// 连接参数
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// 服务通道（TCP）端口，地址中未指定端口时使用
    pub service_port: u16,
    /// 本地实时通道（UDP）端口，0 表示由系统分配
    pub realtime_port: u16,
    /// TCP 连接超时，同时作为服务通道的写超时
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            service_port: DEFAULT_SERVICE_PORT,
            realtime_port: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// 网络链路工厂
#[derive(Debug, Clone, Default)]
pub struct NetworkConnector {
    options: ConnectOptions,
}

impl NetworkConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// 解析地址
    ///
    /// 支持 `host` 与 `host:port` 两种写法，前者使用 `service_port`。
    fn resolve(&self, address: &str) -> Result<Vec<SocketAddr>, NetError> {
        if address.trim().is_empty() {
            return Err(NetError::InvalidAddress(address.to_string()));
        }

        let resolved = match address.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, self.options.service_port)],
            Err(_) if address.contains(':') => address
                .to_socket_addrs()
                .map_err(|e| NetError::InvalidAddress(format!("{}: {}", address, e)))?
                .collect(),
            Err(_) => (address, self.options.service_port)
                .to_socket_addrs()
                .map_err(|e| NetError::InvalidAddress(format!("{}: {}", address, e)))?
                .collect(),
        };

        if resolved.is_empty() {
            return Err(NetError::InvalidAddress(address.to_string()));
        }
        Ok(resolved)
    }
}

impl Connector for NetworkConnector {
    type Transport = NetworkTransport;

    fn connect(&mut self, address: &str) -> Result<NetworkTransport, NetError> {
        let candidates = self.resolve(address)?;

        let mut last_error = None;
        for addr in candidates {
            debug!("Connecting to controller at {}", addr);
            match TcpStream::connect_timeout(&addr, self.options.connect_timeout) {
                Ok(stream) => return NetworkTransport::open(stream, &self.options),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .map(NetError::Io)
            .unwrap_or_else(|| NetError::InvalidAddress(address.to_string())))
    }
}

/// TCP（服务通道）+ UDP（实时通道）链路
pub struct NetworkTransport {
    service: TcpStream,
    realtime: UdpSocket,
    /// 控制器实时地址（收到第一个数据报后确定）
    peer: Option<SocketAddr>,
    rx_buffer: Vec<u8>,
    /// 服务通道分帧失步（帧中途超时）后不再可用
    service_desync: bool,
}

impl NetworkTransport {
    fn open(service: TcpStream, options: &ConnectOptions) -> Result<Self, NetError> {
        service.set_nodelay(true)?;
        service.set_write_timeout(Some(options.connect_timeout.max(MIN_READ_TIMEOUT)))?;

        // 实时通道绑定到与服务通道相同的本地接口
        let local_ip = service.local_addr()?.ip();
        let realtime = UdpSocket::bind(SocketAddr::new(local_ip, options.realtime_port))?;

        debug!(
            "Transport open: service {} -> {}, realtime port {}",
            service.local_addr()?,
            service.peer_addr()?,
            realtime.local_addr()?.port()
        );

        Ok(Self {
            service,
            realtime,
            peer: None,
            rx_buffer: vec![0u8; MAX_DATAGRAM],
            service_desync: false,
        })
    }

    /// 控制器实时地址（如已知）
    pub fn realtime_peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn send_service(&mut self, message: &[u8]) -> Result<(), NetError> {
        if self.service_desync {
            return Err(NetError::Closed);
        }
        if message.len() > MAX_SERVICE_MESSAGE {
            return Err(NetError::MessageTooLarge(message.len()));
        }

        let len = (message.len() as u32).to_le_bytes();
        self.service.write_all(&len).map_err(map_stream_error)?;
        self.service.write_all(message).map_err(map_stream_error)?;
        self.service.flush().map_err(map_stream_error)?;
        Ok(())
    }

    fn receive_service(&mut self, timeout: Duration) -> Result<Bytes, NetError> {
        if self.service_desync {
            return Err(NetError::Closed);
        }
        self.service.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        let mut len = [0u8; 4];
        self.read_service_exact(&mut len, false, timeout)?;

        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_SERVICE_MESSAGE {
            self.service_desync = true;
            return Err(NetError::MessageTooLarge(len));
        }

        let mut message = vec![0u8; len];
        self.read_service_exact(&mut message, true, timeout)?;
        Ok(Bytes::from(message))
    }

    /// 读满 `buf`
    ///
    /// 帧起始处超时返回 `Timeout`（链路仍同步）；已读入部分帧后超时
    /// 无法恢复分帧，返回 `Closed` 并标记服务通道失步。
    fn read_service_exact(
        &mut self,
        buf: &mut [u8],
        mid_frame: bool,
        timeout: Duration,
    ) -> Result<(), NetError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.service.read(&mut buf[filled..]) {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = map_read_error(e, timeout);
                    if err.is_timeout() && (mid_frame || filled > 0) {
                        warn!(
                            "Service channel timed out mid-frame ({} of {} bytes), closing",
                            filled,
                            buf.len()
                        );
                        self.service_desync = true;
                        return Err(NetError::Closed);
                    }
                    return Err(err);
                },
            }
        }
        Ok(())
    }

    fn send_realtime(&mut self, message: &[u8]) -> Result<(), NetError> {
        let peer = self.peer.ok_or(NetError::NoPeer)?;
        if message.len() > MAX_DATAGRAM {
            return Err(NetError::MessageTooLarge(message.len()));
        }
        self.realtime.send_to(message, peer)?;
        Ok(())
    }

    fn receive_realtime(&mut self, timeout: Duration) -> Result<Bytes, NetError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.realtime.set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))?;

            let (len, from) = self
                .realtime
                .recv_from(&mut self.rx_buffer)
                .map_err(|e| map_read_error(e, timeout))?;

            match self.peer {
                None => {
                    debug!("Realtime peer learned: {}", from);
                    self.peer = Some(from);
                },
                Some(peer) if peer != from => {
                    // 非控制器来源的数据报直接丢弃
                    trace!("Dropping datagram from unexpected source {}", from);
                    if Instant::now() >= deadline {
                        return Err(NetError::Timeout(timeout));
                    }
                    continue;
                },
                Some(_) => {},
            }

            return Ok(Bytes::copy_from_slice(&self.rx_buffer[..len]));
        }
    }
}

impl Transport for NetworkTransport {
    fn send(&mut self, channel: Channel, message: &[u8]) -> Result<(), NetError> {
        match channel {
            Channel::Service => self.send_service(message),
            Channel::Realtime => self.send_realtime(message),
        }
    }

    fn receive(&mut self, channel: Channel, timeout: Duration) -> Result<Bytes, NetError> {
        match channel {
            Channel::Service => self.receive_service(timeout),
            Channel::Realtime => self.receive_realtime(timeout),
        }
    }

    fn realtime_port(&self) -> u16 {
        self.realtime.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }
}

/// 读错误分类：超时 / 对端关闭 / 其他 IO
fn map_read_error(e: std::io::Error, timeout: Duration) -> NetError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::Timeout(timeout),
        ErrorKind::UnexpectedEof => NetError::Closed,
        _ => map_stream_error(e),
    }
}

fn map_stream_error(e: std::io::Error) -> NetError {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            NetError::Closed
        },
        _ => NetError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connector_for(listener: &TcpListener) -> NetworkConnector {
        NetworkConnector::new(ConnectOptions {
            service_port: listener.local_addr().unwrap().port(),
            ..ConnectOptions::default()
        })
    }

    fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).unwrap();
        let mut message = vec![0u8; u32::from_le_bytes(len) as usize];
        stream.read_exact(&mut message).unwrap();
        message
    }

    #[test]
    fn test_resolve_rejects_empty_address() {
        let connector = NetworkConnector::default();
        assert!(matches!(
            connector.resolve("  "),
            Err(NetError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_resolve_uses_service_port() {
        let connector = NetworkConnector::default();
        let addrs = connector.resolve("127.0.0.1").unwrap();
        assert_eq!(addrs[0].port(), DEFAULT_SERVICE_PORT);

        let addrs = connector.resolve("127.0.0.1:4000").unwrap();
        assert_eq!(addrs[0].port(), 4000);
    }

    #[test]
    fn test_service_channel_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut transport = connector_for(&listener).connect("127.0.0.1").unwrap();
        let (mut server, _) = listener.accept().unwrap();

        transport.send(Channel::Service, &[1, 2, 3]).unwrap();
        assert_eq!(read_frame(&mut server), vec![1, 2, 3]);

        server.write_all(&2u32.to_le_bytes()).unwrap();
        server.write_all(&[9, 8]).unwrap();
        let reply = transport
            .receive(Channel::Service, Duration::from_secs(1))
            .unwrap();
        assert_eq!(&reply[..], &[9, 8]);
    }

    #[test]
    fn test_service_receive_timeout_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut transport = connector_for(&listener).connect("127.0.0.1").unwrap();
        let (server, _) = listener.accept().unwrap();

        let err = transport
            .receive(Channel::Service, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());

        drop(server);
        let err = transport
            .receive(Channel::Service, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, NetError::Closed));
    }

    #[test]
    fn test_service_write_timeout_from_connect_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut connector = NetworkConnector::new(ConnectOptions {
            service_port: listener.local_addr().unwrap().port(),
            connect_timeout: Duration::from_secs(2),
            ..ConnectOptions::default()
        });
        let transport = connector.connect("127.0.0.1").unwrap();
        let _server = listener.accept().unwrap();

        assert_eq!(
            transport.service.write_timeout().unwrap(),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_service_partial_frame_timeout_closes_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut transport = connector_for(&listener).connect("127.0.0.1").unwrap();
        let (mut server, _) = listener.accept().unwrap();

        // 长度前缀声明 4 字节，只到达 2 字节
        server.write_all(&4u32.to_le_bytes()).unwrap();
        server.write_all(&[1, 2]).unwrap();
        let err = transport
            .receive(Channel::Service, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, NetError::Closed));

        // 剩余字节到达后也不会被当作新帧解析
        server.write_all(&[3, 4]).unwrap();
        let err = transport
            .receive(Channel::Service, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, NetError::Closed));
        assert!(matches!(
            transport.send(Channel::Service, &[0]),
            Err(NetError::Closed)
        ));
    }

    #[test]
    fn test_realtime_peer_learned_from_first_datagram() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut transport = connector_for(&listener).connect("127.0.0.1").unwrap();
        let _server = listener.accept().unwrap();

        // 尚未收到控制器数据报时无法发送
        assert!(matches!(
            transport.send(Channel::Realtime, &[0]),
            Err(NetError::NoPeer)
        ));

        let controller = UdpSocket::bind("127.0.0.1:0").unwrap();
        controller
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let client_addr = SocketAddr::new(
            "127.0.0.1".parse().unwrap(),
            transport.realtime_port(),
        );
        controller.send_to(&[0xAA, 0xBB], client_addr).unwrap();

        let datagram = transport
            .receive(Channel::Realtime, Duration::from_secs(1))
            .unwrap();
        assert_eq!(&datagram[..], &[0xAA, 0xBB]);
        assert_eq!(transport.realtime_peer(), Some(controller.local_addr().unwrap()));

        transport.send(Channel::Realtime, &[0x01]).unwrap();
        let mut buf = [0u8; 8];
        let (len, _) = controller.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0x01]);
    }

    #[test]
    fn test_realtime_receive_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut transport = connector_for(&listener).connect("127.0.0.1").unwrap();
        let _server = listener.accept().unwrap();

        let err = transport
            .receive(Channel::Realtime, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, NetError::Timeout(t) if t == Duration::from_millis(10)));
    }
}
