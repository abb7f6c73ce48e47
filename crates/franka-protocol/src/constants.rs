//! 协议常量定义

/// 服务端版本号类型
pub type ServerVersion = u16;

/// 本库编译时固定的协议版本
///
/// 握手时要求控制器报告的版本与此值完全一致（严格绑定，不做前向兼容）。
pub const PROTOCOL_VERSION: ServerVersion = 2;

/// 机械臂关节数
pub const JOINT_COUNT: usize = 7;

/// 笛卡尔位姿元素数（4x4 齐次变换矩阵，列主序）
pub const POSE_ELEMENTS: usize = 16;

/// 笛卡尔速度/力旋量元素数（3 平移 + 3 旋转）
pub const TWIST_ELEMENTS: usize = 6;

/// 命令中运动生成器数据槽数量（取所有运动类型中最大者）
pub const MOTION_SLOTS: usize = POSE_ELEMENTS;

/// 服务通道（握手）默认端口
pub const DEFAULT_SERVICE_PORT: u16 = 1337;

/// 消息头长度（字节）
pub const HEADER_LEN: usize = 4;

/// 握手请求负载长度：version(u16) + realtime_port(u16)
pub const CONNECT_REQUEST_LEN: usize = 4;

/// 握手响应负载长度：status(u8) + reserved(u8) + version(u16)
pub const CONNECT_RESPONSE_LEN: usize = 4;

/// 状态消息负载长度
///
/// message_id(u64) + time_us(u64) + q/dq/tau_j(3 x 7 x f64)
/// + O_T_EE(16 x f64) + O_F_ext_hat_K(6 x f64) + flags(u8) + fault_code(u8)
pub const STATE_PAYLOAD_LEN: usize =
    8 + 8 + 3 * JOINT_COUNT * 8 + POSE_ELEMENTS * 8 + TWIST_ELEMENTS * 8 + 1 + 1;

/// 命令消息负载长度
///
/// message_id(u64) + flags(u8) + motion_kind(u8) + 运动槽(16 x f64) + 力矩槽(7 x f64)
pub const COMMAND_PAYLOAD_LEN: usize = 8 + 1 + 1 + MOTION_SLOTS * 8 + JOINT_COUNT * 8;
