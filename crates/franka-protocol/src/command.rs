//! 控制命令定义与编码
//!
//! 用户回调每周期产生的命令值（`Command`），以及每周期实际发送到控制器的
//! 组合命令（`RobotCommand`）。
//!
//! # 组合规则
//!
//! 每周期至多一个运动生成器命令和至多一个力矩命令：
//!
//! | 运动生成器 | 力矩 | 线上表示 |
//! |---|---|---|
//! | 有 | 无 | 力矩槽全零，`has_torques = 0` |
//! | 无 | 有 | 运动槽全零，`motion_kind = 0` |
//! | 有 | 有 | 两者打包在同一消息中 |
//!
//! # 线上布局（固定长度，顺序稳定）
//!
//! ```text
//! message_id: u64
//! flags: u8        (CommandFlags)
//! motion_kind: u8  (0 = 无运动生成器)
//! motion: [f64; 16] (不足部分补零)
//! torques: [f64; 7]
//! ```

use crate::constants::{
    COMMAND_PAYLOAD_LEN, HEADER_LEN, JOINT_COUNT, MOTION_SLOTS, POSE_ELEMENTS, TWIST_ELEMENTS,
};
use crate::header::{MessageHeader, MessageKind, expect_payload};
use crate::{ProtocolError, get_f64_array, put_f64_slice};
use bilge::prelude::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 命令值类型
// ============================================================================

/// 关节力矩命令（Nm）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Torques {
    pub tau_j: [f64; JOINT_COUNT],
    pub motion_finished: bool,
}

/// 关节位置命令（rad）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointValues {
    pub q: [f64; JOINT_COUNT],
    pub motion_finished: bool,
}

/// 关节速度命令（rad/s）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointVelocities {
    pub dq: [f64; JOINT_COUNT],
    pub motion_finished: bool,
}

/// 笛卡尔位姿命令（齐次变换矩阵，列主序）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartesianPose {
    pub o_t_ee: [f64; POSE_ELEMENTS],
    pub motion_finished: bool,
}

/// 笛卡尔速度命令（vx, vy, vz, ωx, ωy, ωz）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CartesianVelocities {
    pub o_dp_ee: [f64; TWIST_ELEMENTS],
    pub motion_finished: bool,
}

macro_rules! impl_command_value {
    ($ty:ident, $field:ident, $len:expr) => {
        impl $ty {
            pub fn new($field: [f64; $len]) -> Self {
                Self {
                    $field,
                    motion_finished: false,
                }
            }

            /// 标记运动结束（本周期命令即最后一条命令）
            pub fn finished(mut self) -> Self {
                self.motion_finished = true;
                self
            }

            pub fn values(&self) -> &[f64] {
                &self.$field
            }
        }

        impl From<[f64; $len]> for $ty {
            fn from($field: [f64; $len]) -> Self {
                Self::new($field)
            }
        }
    };
}

impl_command_value!(Torques, tau_j, JOINT_COUNT);
impl_command_value!(JointValues, q, JOINT_COUNT);
impl_command_value!(JointVelocities, dq, JOINT_COUNT);
impl_command_value!(CartesianPose, o_t_ee, POSE_ELEMENTS);
impl_command_value!(CartesianVelocities, o_dp_ee, TWIST_ELEMENTS);

// ============================================================================
// 命令类型标签
// ============================================================================

/// 运动生成器类型（线上 `motion_kind` 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotionGeneratorKind {
    JointPosition = 0x01,
    JointVelocity = 0x02,
    CartesianPose = 0x03,
    CartesianVelocity = 0x04,
}

/// 命令类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Torques,
    Motion(MotionGeneratorKind),
}

// ============================================================================
// Command（回调输出的联合类型）
// ============================================================================

/// 回调输出的命令
///
/// 五种命令值的联合，回调产出后由控制循环按组合模式校验。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Torques(Torques),
    JointValues(JointValues),
    JointVelocities(JointVelocities),
    CartesianPose(CartesianPose),
    CartesianVelocities(CartesianVelocities),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Torques(_) => CommandKind::Torques,
            Command::JointValues(_) => CommandKind::Motion(MotionGeneratorKind::JointPosition),
            Command::JointVelocities(_) => CommandKind::Motion(MotionGeneratorKind::JointVelocity),
            Command::CartesianPose(_) => CommandKind::Motion(MotionGeneratorKind::CartesianPose),
            Command::CartesianVelocities(_) => {
                CommandKind::Motion(MotionGeneratorKind::CartesianVelocity)
            },
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Command::Torques(c) => c.values(),
            Command::JointValues(c) => c.values(),
            Command::JointVelocities(c) => c.values(),
            Command::CartesianPose(c) => c.values(),
            Command::CartesianVelocities(c) => c.values(),
        }
    }

    pub fn motion_finished(&self) -> bool {
        match self {
            Command::Torques(c) => c.motion_finished,
            Command::JointValues(c) => c.motion_finished,
            Command::JointVelocities(c) => c.motion_finished,
            Command::CartesianPose(c) => c.motion_finished,
            Command::CartesianVelocities(c) => c.motion_finished,
        }
    }

    /// 所有数值字段均为有限值（非 NaN / ∞）
    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }

    /// 转换为运动生成器命令（力矩命令返回 `None`）
    pub fn into_motion(self) -> Option<MotionGeneratorCommand> {
        match self {
            Command::Torques(_) => None,
            Command::JointValues(c) => Some(MotionGeneratorCommand::JointPosition(c)),
            Command::JointVelocities(c) => Some(MotionGeneratorCommand::JointVelocity(c)),
            Command::CartesianPose(c) => Some(MotionGeneratorCommand::CartesianPose(c)),
            Command::CartesianVelocities(c) => Some(MotionGeneratorCommand::CartesianVelocity(c)),
        }
    }

    pub fn into_torques(self) -> Option<Torques> {
        match self {
            Command::Torques(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Torques> for Command {
    fn from(value: Torques) -> Self {
        Command::Torques(value)
    }
}

impl From<JointValues> for Command {
    fn from(value: JointValues) -> Self {
        Command::JointValues(value)
    }
}

impl From<JointVelocities> for Command {
    fn from(value: JointVelocities) -> Self {
        Command::JointVelocities(value)
    }
}

impl From<CartesianPose> for Command {
    fn from(value: CartesianPose) -> Self {
        Command::CartesianPose(value)
    }
}

impl From<CartesianVelocities> for Command {
    fn from(value: CartesianVelocities) -> Self {
        Command::CartesianVelocities(value)
    }
}

// ============================================================================
// 运动生成器命令
// ============================================================================

/// 运动生成器命令（不含力矩）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionGeneratorCommand {
    JointPosition(JointValues),
    JointVelocity(JointVelocities),
    CartesianPose(CartesianPose),
    CartesianVelocity(CartesianVelocities),
}

impl MotionGeneratorCommand {
    pub fn kind(&self) -> MotionGeneratorKind {
        match self {
            MotionGeneratorCommand::JointPosition(_) => MotionGeneratorKind::JointPosition,
            MotionGeneratorCommand::JointVelocity(_) => MotionGeneratorKind::JointVelocity,
            MotionGeneratorCommand::CartesianPose(_) => MotionGeneratorKind::CartesianPose,
            MotionGeneratorCommand::CartesianVelocity(_) => MotionGeneratorKind::CartesianVelocity,
        }
    }

    pub fn values(&self) -> &[f64] {
        match self {
            MotionGeneratorCommand::JointPosition(c) => c.values(),
            MotionGeneratorCommand::JointVelocity(c) => c.values(),
            MotionGeneratorCommand::CartesianPose(c) => c.values(),
            MotionGeneratorCommand::CartesianVelocity(c) => c.values(),
        }
    }

    pub fn motion_finished(&self) -> bool {
        match self {
            MotionGeneratorCommand::JointPosition(c) => c.motion_finished,
            MotionGeneratorCommand::JointVelocity(c) => c.motion_finished,
            MotionGeneratorCommand::CartesianPose(c) => c.motion_finished,
            MotionGeneratorCommand::CartesianVelocity(c) => c.motion_finished,
        }
    }

    fn from_slots(
        kind: MotionGeneratorKind,
        slots: &[f64; MOTION_SLOTS],
        motion_finished: bool,
    ) -> Self {
        fn take<const N: usize>(slots: &[f64; MOTION_SLOTS]) -> [f64; N] {
            let mut values = [0.0; N];
            values.copy_from_slice(&slots[..N]);
            values
        }

        match kind {
            MotionGeneratorKind::JointPosition => MotionGeneratorCommand::JointPosition(JointValues {
                q: take(slots),
                motion_finished,
            }),
            MotionGeneratorKind::JointVelocity => {
                MotionGeneratorCommand::JointVelocity(JointVelocities {
                    dq: take(slots),
                    motion_finished,
                })
            },
            MotionGeneratorKind::CartesianPose => MotionGeneratorCommand::CartesianPose(CartesianPose {
                o_t_ee: take(slots),
                motion_finished,
            }),
            MotionGeneratorKind::CartesianVelocity => {
                MotionGeneratorCommand::CartesianVelocity(CartesianVelocities {
                    o_dp_ee: take(slots),
                    motion_finished,
                })
            },
        }
    }
}

// ============================================================================
// RobotCommand（每周期发送的组合命令）
// ============================================================================

/// 命令标志位域
///
/// - Bit 0: 携带运动生成器数据
/// - Bit 1: 携带力矩数据
/// - Bit 2: 运动生成器报告运动结束
/// - Bit 3: 力矩控制器报告运动结束
/// - Bit 4-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct CommandFlags {
    pub has_motion: bool,
    pub has_torques: bool,
    pub motion_generator_finished: bool,
    pub controller_finished: bool,
    pub reserved: u4,
}

/// 每周期发送到控制器的组合命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotCommand {
    /// 回应的状态消息 ID
    pub message_id: u64,
    pub motion: Option<MotionGeneratorCommand>,
    pub torques: Option<Torques>,
}

impl RobotCommand {
    /// 任一回调报告运动结束
    pub fn motion_finished(&self) -> bool {
        self.motion.is_some_and(|m| m.motion_finished())
            || self.torques.is_some_and(|t| t.motion_finished)
    }

    /// 编码为 `Command` 消息
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + COMMAND_PAYLOAD_LEN);
        MessageHeader::new(MessageKind::Command, COMMAND_PAYLOAD_LEN).encode(&mut buf);

        let mut flags = CommandFlags::from(u8::new(0));
        flags.set_has_motion(self.motion.is_some());
        flags.set_has_torques(self.torques.is_some());
        flags.set_motion_generator_finished(self.motion.is_some_and(|m| m.motion_finished()));
        flags.set_controller_finished(self.torques.is_some_and(|t| t.motion_finished));

        buf.put_u64_le(self.message_id);
        buf.put_u8(u8::from(flags).value());
        buf.put_u8(self.motion.map(|m| u8::from(m.kind())).unwrap_or(0));

        let mut motion_slots = [0.0; MOTION_SLOTS];
        if let Some(motion) = &self.motion {
            let values = motion.values();
            motion_slots[..values.len()].copy_from_slice(values);
        }
        put_f64_slice(&mut buf, &motion_slots);

        let torque_slots = self.torques.map(|t| t.tau_j).unwrap_or([0.0; JOINT_COUNT]);
        put_f64_slice(&mut buf, &torque_slots);

        buf.freeze()
    }

    /// 从 `Command` 消息解码（控制器侧 / 测试使用）
    pub fn decode(message: &[u8]) -> Result<Self, ProtocolError> {
        let mut payload = expect_payload(message, MessageKind::Command, COMMAND_PAYLOAD_LEN)?;

        let message_id = payload.get_u64_le();
        let flags = CommandFlags::from(u8::new(payload.get_u8()));
        let raw_kind = payload.get_u8();
        let motion_slots: [f64; MOTION_SLOTS] = get_f64_array(&mut payload);
        let torque_slots: [f64; JOINT_COUNT] = get_f64_array(&mut payload);

        let motion = match (flags.has_motion(), raw_kind) {
            (false, 0) => None,
            (true, raw) if raw != 0 => {
                let kind = MotionGeneratorKind::try_from(raw).map_err(|_| {
                    ProtocolError::InvalidValue {
                        field: "motion_kind",
                        value: raw,
                    }
                })?;
                Some(MotionGeneratorCommand::from_slots(
                    kind,
                    &motion_slots,
                    flags.motion_generator_finished(),
                ))
            },
            (_, raw) => {
                return Err(ProtocolError::InvalidValue {
                    field: "motion_kind",
                    value: raw,
                });
            },
        };

        let torques = flags.has_torques().then(|| Torques {
            tau_j: torque_slots,
            motion_finished: flags.controller_finished(),
        });

        Ok(Self {
            message_id,
            motion,
            torques,
        })
    }
}
