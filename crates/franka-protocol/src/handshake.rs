//! 连接握手消息
//!
//! 客户端在服务通道上发送一次 `ConnectRequest`，控制器回复 `ConnectResponse`。

use crate::constants::{CONNECT_REQUEST_LEN, CONNECT_RESPONSE_LEN, HEADER_LEN, ServerVersion};
use crate::header::{MessageHeader, MessageKind, expect_payload};
use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 握手状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConnectStatus {
    Success = 0x00,
    IncompatibleLibraryVersion = 0x01,
}

/// 握手请求（客户端 → 控制器）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// 客户端期望的协议版本
    pub version: ServerVersion,
    /// 客户端实时通道（UDP）本地端口，控制器向该端口推送状态
    pub realtime_port: u16,
}

impl ConnectRequest {
    pub fn new(version: ServerVersion, realtime_port: u16) -> Self {
        Self {
            version,
            realtime_port,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + CONNECT_REQUEST_LEN);
        MessageHeader::new(MessageKind::ConnectRequest, CONNECT_REQUEST_LEN).encode(&mut buf);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.realtime_port);
        buf.freeze()
    }

    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut payload =
            expect_payload(message, MessageKind::ConnectRequest, CONNECT_REQUEST_LEN)?;
        Ok(Self {
            version: payload.get_u16_le(),
            realtime_port: payload.get_u16_le(),
        })
    }
}

/// 握手响应（控制器 → 客户端）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub status: ConnectStatus,
    /// 控制器报告的服务端版本
    pub version: ServerVersion,
}

impl ConnectResponse {
    pub fn new(status: ConnectStatus, version: ServerVersion) -> Self {
        Self { status, version }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + CONNECT_RESPONSE_LEN);
        MessageHeader::new(MessageKind::ConnectResponse, CONNECT_RESPONSE_LEN).encode(&mut buf);
        buf.put_u8(self.status.into());
        buf.put_u8(0);
        buf.put_u16_le(self.version);
        buf.freeze()
    }

    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut payload =
            expect_payload(message, MessageKind::ConnectResponse, CONNECT_RESPONSE_LEN)?;

        let raw_status = payload.get_u8();
        let status = ConnectStatus::try_from(raw_status).map_err(|_| {
            ProtocolError::InvalidValue {
                field: "connect_status",
                value: raw_status,
            }
        })?;
        let _reserved = payload.get_u8();
        let version = payload.get_u16_le();

        Ok(Self { status, version })
    }
}
