//! 版本协商
//!
//! 在服务通道上交换一次 `ConnectRequest` / `ConnectResponse`。
//! 只接受与 `PROTOCOL_VERSION` 完全一致的控制器版本。

use crate::error::{FrankaError, Result};
use franka_net::{Channel, Transport};
use franka_protocol::{
    ConnectRequest, ConnectResponse, ConnectStatus, PROTOCOL_VERSION, ServerVersion,
};
use std::time::Duration;
use tracing::{debug, info};

/// 执行握手，返回控制器版本
///
/// # 错误
///
/// - `Network`: 发送失败、等待响应超时或链路断开
/// - `Protocol`: 响应结构异常
/// - `IncompatibleVersion`: 控制器拒绝或版本不一致
pub fn negotiate<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
) -> Result<ServerVersion> {
    let request = ConnectRequest::new(PROTOCOL_VERSION, transport.realtime_port());
    debug!(
        "Sending connect request (version {}, realtime port {})",
        request.version, request.realtime_port
    );
    transport.send(Channel::Service, &request.encode())?;

    let reply = transport.receive(Channel::Service, timeout)?;
    let response = ConnectResponse::decode(&reply)?;

    match response.status {
        ConnectStatus::Success if response.version == PROTOCOL_VERSION => {
            info!("Handshake complete, server version {}", response.version);
            Ok(response.version)
        },
        _ => Err(FrankaError::incompatible_version(
            PROTOCOL_VERSION,
            response.version,
        )),
    }
}
