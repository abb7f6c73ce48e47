//! 机器人状态解码
//!
//! 控制器每个控制周期推送一条 `State` 消息。解码只做结构校验
//! （长度、类型、枚举值），不做数值范围检查，范围检查由控制器负责。

use crate::constants::{
    HEADER_LEN, JOINT_COUNT, POSE_ELEMENTS, STATE_PAYLOAD_LEN, TWIST_ELEMENTS,
};
use crate::header::{MessageHeader, MessageKind, expect_payload};
use crate::{ProtocolError, get_f64_array, put_f64_slice};
use bilge::prelude::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;

/// 状态标志位域（State payload 倒数第 2 字节）
///
/// - Bit 0: 运动已完成
/// - Bit 1: 控制器报告故障（详见 fault_code）
/// - Bit 2-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StateFlags {
    pub motion_finished: bool,
    pub fault: bool,
    pub reserved: u6,
}

/// 控制器拒绝运动的原因（反射/动力学约束）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControllerFault {
    JointPositionLimitsViolation = 0x01,
    JointVelocityViolation = 0x02,
    CartesianReflex = 0x03,
    CommunicationConstraintsViolation = 0x04,
    PowerLimitViolation = 0x05,
    TorqueDiscontinuity = 0x06,
    Other = 0xFF,
}

impl std::fmt::Display for ControllerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ControllerFault::JointPositionLimitsViolation => "joint position limits violation",
            ControllerFault::JointVelocityViolation => "joint velocity violation",
            ControllerFault::CartesianReflex => "cartesian reflex",
            ControllerFault::CommunicationConstraintsViolation => {
                "communication constraints violation"
            },
            ControllerFault::PowerLimitViolation => "power limit violation",
            ControllerFault::TorqueDiscontinuity => "torque discontinuity",
            ControllerFault::Other => "unspecified controller fault",
        };
        f.write_str(text)
    }
}

/// 机器人状态快照
///
/// 每个控制周期由控制器产生一次，回调只读访问，客户端从不修改。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotState {
    /// 单调递增的周期计数器
    pub message_id: u64,
    /// 控制器时间
    pub time: Duration,
    /// 关节位置（rad）
    pub q: [f64; JOINT_COUNT],
    /// 关节速度（rad/s）
    pub dq: [f64; JOINT_COUNT],
    /// 关节力矩（Nm）
    pub tau_j: [f64; JOINT_COUNT],
    /// 末端位姿（齐次变换矩阵，列主序）
    pub o_t_ee: [f64; POSE_ELEMENTS],
    /// 估计的末端外部力旋量（N, Nm）
    pub o_f_ext_hat_k: [f64; TWIST_ELEMENTS],
    /// 控制器报告运动已结束
    pub motion_finished: bool,
    /// 控制器报告的故障
    pub fault: Option<ControllerFault>,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            message_id: 0,
            time: Duration::ZERO,
            q: [0.0; JOINT_COUNT],
            dq: [0.0; JOINT_COUNT],
            tau_j: [0.0; JOINT_COUNT],
            o_t_ee: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
            o_f_ext_hat_k: [0.0; TWIST_ELEMENTS],
            motion_finished: false,
            fault: None,
        }
    }
}

impl RobotState {
    /// 从 `State` 消息解码
    ///
    /// # 错误
    ///
    /// - `Truncated` / `InvalidLength`: 消息长度与 schema 不符
    /// - `UnexpectedKind` / `UnknownKind`: 消息类型不是 `State`
    /// - `InvalidValue`: 故障标志置位但故障码未知
    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut payload = expect_payload(message, MessageKind::State, STATE_PAYLOAD_LEN)?;

        let message_id = payload.get_u64_le();
        let time = Duration::from_micros(payload.get_u64_le());
        let q = get_f64_array(&mut payload);
        let dq = get_f64_array(&mut payload);
        let tau_j = get_f64_array(&mut payload);
        let o_t_ee = get_f64_array(&mut payload);
        let o_f_ext_hat_k = get_f64_array(&mut payload);

        // 使用 bilge 解析位域
        let flags = StateFlags::from(u8::new(payload.get_u8()));
        let raw_fault = payload.get_u8();

        let fault = if flags.fault() {
            let fault = ControllerFault::try_from(raw_fault).map_err(|_| {
                ProtocolError::InvalidValue {
                    field: "fault_code",
                    value: raw_fault,
                }
            })?;
            Some(fault)
        } else {
            None
        };

        Ok(Self {
            message_id,
            time,
            q,
            dq,
            tau_j,
            o_t_ee,
            o_f_ext_hat_k,
            motion_finished: flags.motion_finished(),
            fault,
        })
    }

    /// 编码为 `State` 消息
    ///
    /// 客户端从不发送状态，此方法供控制器模拟与录制回放使用。
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + STATE_PAYLOAD_LEN);
        MessageHeader::new(MessageKind::State, STATE_PAYLOAD_LEN).encode(&mut buf);

        buf.put_u64_le(self.message_id);
        buf.put_u64_le(self.time.as_micros() as u64);
        put_f64_slice(&mut buf, &self.q);
        put_f64_slice(&mut buf, &self.dq);
        put_f64_slice(&mut buf, &self.tau_j);
        put_f64_slice(&mut buf, &self.o_t_ee);
        put_f64_slice(&mut buf, &self.o_f_ext_hat_k);

        let mut flags = StateFlags::from(u8::new(0));
        flags.set_motion_finished(self.motion_finished);
        flags.set_fault(self.fault.is_some());
        buf.put_u8(u8::from(flags).value());
        buf.put_u8(self.fault.map(u8::from).unwrap_or(0));

        buf.freeze()
    }
}
