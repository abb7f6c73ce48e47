//! Mock 传输
//!
//! 按通道预先编排入站消息（消息 / 超时 / 断开），记录所有出站消息，
//! 用于在没有控制器的情况下测试握手与控制循环。
//!
//! 入站队列为空时等同于超时。

use crate::{Channel, Connector, NetError, Transport};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// 编排的一次入站结果
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Message(Bytes),
    Timeout,
    Disconnect,
}

/// 出站消息日志（可在 transport 被移交给会话后继续查看）
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    inner: Arc<Mutex<Vec<(Channel, Bytes)>>>,
}

impl SentLog {
    /// 指定通道上发送的全部消息（按发送顺序）
    pub fn messages(&self, channel: Channel) -> Vec<Bytes> {
        self.inner
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.inner.lock().iter().filter(|(c, _)| *c == channel).count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn record(&self, channel: Channel, message: &[u8]) {
        self.inner.lock().push((channel, Bytes::copy_from_slice(message)));
    }
}

/// 编排式 Mock 传输
#[derive(Debug)]
pub struct MockTransport {
    service: VecDeque<ScriptedReply>,
    realtime: VecDeque<ScriptedReply>,
    sent: SentLog,
    /// 剩余允许成功的发送次数，`None` 表示不注入失败
    sends_before_failure: Option<usize>,
    closed: bool,
    realtime_port: u16,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            service: VecDeque::new(),
            realtime: VecDeque::new(),
            sent: SentLog::default(),
            sends_before_failure: None,
            closed: false,
            realtime_port: 50_000,
        }
    }

    /// 追加一条入站结果
    pub fn push(&mut self, channel: Channel, reply: ScriptedReply) -> &mut Self {
        match channel {
            Channel::Service => self.service.push_back(reply),
            Channel::Realtime => self.realtime.push_back(reply),
        }
        self
    }

    pub fn push_message(&mut self, channel: Channel, message: impl Into<Bytes>) -> &mut Self {
        self.push(channel, ScriptedReply::Message(message.into()))
    }

    pub fn push_timeout(&mut self, channel: Channel) -> &mut Self {
        self.push(channel, ScriptedReply::Timeout)
    }

    pub fn push_disconnect(&mut self, channel: Channel) -> &mut Self {
        self.push(channel, ScriptedReply::Disconnect)
    }

    /// 前 `count` 次发送成功，之后的发送返回 IO 错误
    pub fn fail_sends_after(&mut self, count: usize) -> &mut Self {
        self.sends_before_failure = Some(count);
        self
    }

    /// 出站日志句柄
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// 剩余未消费的入站条目数
    pub fn pending(&self, channel: Channel) -> usize {
        match channel {
            Channel::Service => self.service.len(),
            Channel::Realtime => self.realtime.len(),
        }
    }
}

impl Transport for MockTransport {
    fn send(&mut self, channel: Channel, message: &[u8]) -> Result<(), NetError> {
        if self.closed {
            return Err(NetError::Closed);
        }

        if let Some(remaining) = self.sends_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(NetError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "injected send failure",
                )));
            }
            *remaining -= 1;
        }

        self.sent.record(channel, message);
        Ok(())
    }

    fn receive(&mut self, channel: Channel, timeout: Duration) -> Result<Bytes, NetError> {
        if self.closed {
            return Err(NetError::Closed);
        }

        let queue = match channel {
            Channel::Service => &mut self.service,
            Channel::Realtime => &mut self.realtime,
        };

        match queue.pop_front() {
            Some(ScriptedReply::Message(message)) => Ok(message),
            Some(ScriptedReply::Timeout) | None => Err(NetError::Timeout(timeout)),
            Some(ScriptedReply::Disconnect) => {
                self.closed = true;
                Err(NetError::Closed)
            },
        }
    }

    fn realtime_port(&self) -> u16 {
        self.realtime_port
    }
}

/// 按顺序分发预先编排好的 `MockTransport`，耗尽后拒绝连接
#[derive(Debug, Default)]
pub struct MockConnector {
    transports: VecDeque<MockTransport>,
    addresses: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(transports: impl IntoIterator<Item = MockTransport>) -> Self {
        Self {
            transports: transports.into_iter().collect(),
            addresses: Arc::default(),
        }
    }

    /// 已请求连接的地址（按顺序）
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&mut self, address: &str) -> Result<MockTransport, NetError> {
        self.addresses.lock().push(address.to_string());
        self.transports.pop_front().ok_or_else(|| {
            NetError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no scripted transport left for {}", address),
            ))
        })
    }
}
