//! 集成测试公共设施
//!
//! 用 `MockTransport` 编排一个控制器：握手响应 + 按周期推送的状态。

#![allow(dead_code)]

use franka_net::{Channel, MockConnector, MockTransport, SentLog};
use franka_sdk::client::RealtimeScheduler;
use franka_sdk::protocol::{
    ConnectResponse, ConnectStatus, PROTOCOL_VERSION, RobotCommand, RobotState, ServerVersion,
};
use franka_sdk::{RealtimeConfig, Robot, SessionConfig};
use std::time::Duration;

/// 编排的控制器
pub struct ScriptedController {
    transport: MockTransport,
}

impl ScriptedController {
    /// 握手成功、版本一致的控制器
    pub fn new() -> Self {
        Self::with_version(ConnectStatus::Success, PROTOCOL_VERSION)
    }

    pub fn with_version(status: ConnectStatus, version: ServerVersion) -> Self {
        let mut transport = MockTransport::new();
        transport.push_message(Channel::Service, ConnectResponse::new(status, version).encode());
        Self { transport }
    }

    /// 依次推送 message_id 为 `ids` 的状态（1 ms 周期）
    pub fn states(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        for id in ids {
            self.transport.push_message(Channel::Realtime, state(id).encode());
        }
        self
    }

    pub fn state(mut self, state: RobotState) -> Self {
        self.transport.push_message(Channel::Realtime, state.encode());
        self
    }

    /// 下一个周期超时
    pub fn timeout(mut self) -> Self {
        self.transport.push_timeout(Channel::Realtime);
        self
    }

    pub fn build(self) -> (MockTransport, SentLog) {
        let log = self.transport.sent_log();
        (self.transport, log)
    }
}

pub fn state(message_id: u64) -> RobotState {
    RobotState {
        message_id,
        time: Duration::from_millis(message_id),
        ..RobotState::default()
    }
}

/// 总是成功的调度器
pub struct Elevated;

impl RealtimeScheduler for Elevated {
    fn elevate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 总是失败的调度器
pub struct Denied;

impl RealtimeScheduler for Denied {
    fn elevate(&self) -> Result<(), String> {
        Err("operation not permitted".to_string())
    }
}

pub fn config(realtime: RealtimeConfig) -> SessionConfig {
    SessionConfig {
        cycle_timeout_ms: 1,
        handshake_timeout_ms: 1,
        ..SessionConfig::default()
    }
    .with_realtime(realtime)
}

/// 依次使用 `transports` 建立会话，调度器总是成功
pub fn connect(transports: Vec<MockTransport>) -> Robot<MockConnector> {
    Robot::connect_with(
        MockConnector::new(transports),
        "controller-a",
        config(RealtimeConfig::Enforce),
    )
    .expect("scripted handshake should succeed")
    .with_scheduler(Elevated)
}

/// 解码实时通道上发送的全部命令
pub fn sent_commands(log: &SentLog) -> Vec<RobotCommand> {
    log.messages(Channel::Realtime)
        .iter()
        .map(|message| RobotCommand::decode(message).expect("client sent a malformed command"))
        .collect()
}
