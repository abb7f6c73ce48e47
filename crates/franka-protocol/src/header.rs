//! 消息头与消息类型
//!
//! 每条消息以 4 字节头开始：
//!
//! ```text
//! Byte 0: kind (MessageKind)
//! Byte 1: flags（保留，必须为 0）
//! Byte 2-3: payload_len (u16, LE)
//! ```

use crate::ProtocolError;
use crate::constants::HEADER_LEN;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MessageKind {
    // 客户端 → 控制器
    ConnectRequest = 0x01,
    Command = 0x20,

    // 控制器 → 客户端
    State = 0x10,
    ConnectResponse = 0x81,
}

/// 消息头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub payload_len: u16,
}

impl MessageHeader {
    pub fn new(kind: MessageKind, payload_len: usize) -> Self {
        Self {
            kind,
            payload_len: payload_len as u16,
        }
    }

    /// 编码消息头
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind.into());
        buf.put_u8(0);
        buf.put_u16_le(self.payload_len);
    }

    /// 从消息起始处解码消息头，推进 `buf`
    pub fn decode(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let raw_kind = buf.get_u8();
        let kind = MessageKind::try_from(raw_kind).map_err(|_| ProtocolError::UnknownKind(raw_kind))?;
        let _flags = buf.get_u8();
        let payload_len = buf.get_u16_le();

        Ok(Self { kind, payload_len })
    }
}

/// 校验消息头并返回负载切片
///
/// 同时检查：消息类型与期望一致、头中声明的长度等于 schema 固定长度、
/// 实际负载长度与声明一致（不允许截断或尾随数据）。
pub(crate) fn expect_payload<'a>(
    message: &'a [u8],
    expected_kind: MessageKind,
    expected_len: usize,
) -> Result<&'a [u8], ProtocolError> {
    let mut buf = message;
    let header = MessageHeader::decode(&mut buf)?;

    if header.kind != expected_kind {
        return Err(ProtocolError::UnexpectedKind {
            expected: expected_kind,
            actual: header.kind,
        });
    }

    if header.payload_len as usize != expected_len {
        return Err(ProtocolError::InvalidLength {
            kind: expected_kind,
            expected: expected_len,
            actual: header.payload_len as usize,
        });
    }

    if buf.len() != expected_len {
        return Err(ProtocolError::InvalidLength {
            kind: expected_kind,
            expected: expected_len,
            actual: buf.len(),
        });
    }

    Ok(buf)
}
