//! 会话门面
//!
//! `Robot` 独占传输链路与握手结果，对外提供 control / read / read_once /
//! server_version。所有循环入口都需要 `&mut self`，因此同一会话上不可能
//! 同时运行两个循环（编译期保证单写者）。

use crate::config::{RealtimeConfig, SessionConfig};
use crate::engine::{ControlLoop, CycleCallback, read_loop};
use crate::error::{FrankaError, Result};
use crate::handshake::negotiate;
use crate::mode::CombinationMode;
use crate::realtime::{self, RealtimeScheduler, ThreadPriorityScheduler};
use franka_net::{ConnectOptions, Connector, NetworkConnector};
use franka_protocol::{
    CartesianPose, CartesianVelocities, Command, JointValues, JointVelocities,
    MotionGeneratorKind, RobotState, ServerVersion, Torques,
};
use std::time::Duration;
use tracing::{debug, info};

impl SessionConfig {
    /// 网络连接参数
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            service_port: self.service_port,
            realtime_port: self.realtime_port,
            connect_timeout: self.connect_timeout(),
        }
    }
}

/// 与控制器的会话
///
/// # 示例
///
/// ```rust,no_run
/// use franka_client::{RealtimeConfig, Robot, Torques};
///
/// let mut robot = Robot::connect("172.16.0.2", RealtimeConfig::Enforce)?;
/// let mut cycles = 0;
/// robot.control_torques(|_state, _period| {
///     cycles += 1;
///     let torques = Torques::new([0.0; 7]);
///     if cycles == 1000 { torques.finished() } else { torques }
/// })?;
/// # Ok::<(), franka_client::FrankaError>(())
/// ```
pub struct Robot<C: Connector = NetworkConnector> {
    connector: C,
    address: String,
    config: SessionConfig,
    transport: C::Transport,
    server_version: ServerVersion,
    scheduler: Box<dyn RealtimeScheduler>,
}

impl Robot<NetworkConnector> {
    /// 连接控制器（默认配置 + 指定实时策略）
    ///
    /// # 错误
    ///
    /// - `Network`: 无法打开链路
    /// - `Protocol`: 握手响应结构异常
    /// - `IncompatibleVersion`: 版本不一致
    pub fn connect(address: &str, realtime: RealtimeConfig) -> Result<Self> {
        Self::connect_with_config(address, SessionConfig::default().with_realtime(realtime))
    }

    /// 使用完整配置连接控制器
    pub fn connect_with_config(address: &str, config: SessionConfig) -> Result<Self> {
        let connector = NetworkConnector::new(config.connect_options());
        Self::connect_with(connector, address, config)
    }
}

impl<C: Connector> Robot<C> {
    /// 使用自定义 `Connector` 连接（测试中注入 Mock 传输）
    pub fn connect_with(mut connector: C, address: &str, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let (transport, server_version) = Self::open(&mut connector, address, &config)?;
        Ok(Self {
            connector,
            address: address.to_string(),
            config,
            transport,
            server_version,
            scheduler: Box::new(ThreadPriorityScheduler),
        })
    }

    fn open(
        connector: &mut C,
        address: &str,
        config: &SessionConfig,
    ) -> Result<(C::Transport, ServerVersion)> {
        info!("Connecting to controller at {}", address);
        let mut transport = connector.connect(address)?;
        let version = negotiate(&mut transport, config.handshake_timeout())?;
        info!("Connected to {} (server version {})", address, version);
        Ok((transport, version))
    }

    /// 替换实时调度实现
    pub fn with_scheduler(mut self, scheduler: impl RealtimeScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// 重新建立链路并重新握手
    ///
    /// 用于 `Network` 故障之后；失败时原链路保持不变。
    pub fn reconnect(&mut self) -> Result<()> {
        info!("Attempting to reconnect to {}", self.address);
        let (transport, version) = Self::open(&mut self.connector, &self.address, &self.config)?;
        self.transport = transport;
        self.server_version = version;
        info!("Reconnection successful");
        Ok(())
    }

    /// 握手时协商的控制器版本（不访问网络）
    pub fn server_version(&self) -> ServerVersion {
        self.server_version
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        self.config.realtime
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    // ==================== 读取 ====================

    /// 只读循环，谓词返回 `false` 时结束，不发送任何命令
    pub fn read<F>(&mut self, mut predicate: F) -> Result<()>
    where
        F: FnMut(&RobotState) -> bool,
    {
        read_loop(
            &mut self.transport,
            self.config.cycle_timeout(),
            &mut predicate,
        )
    }

    /// 读取一条状态
    pub fn read_once(&mut self) -> Result<RobotState> {
        let mut received = None;
        self.read(|state| {
            received = Some(state.clone());
            false
        })?;
        received.ok_or_else(|| FrankaError::protocol("read loop ended without a state"))
    }

    // ==================== 控制 ====================

    /// 按组合模式运行控制循环（所有 `control_*` 入口最终都经过这里）
    ///
    /// # 错误
    ///
    /// - `InvalidArgument`: 回调槽位与模式不匹配（不访问网络）
    /// - `Realtime`: 使用力矩回调、策略为 `Enforce` 且无法提升优先级（不访问网络）
    /// - `Network` / `Protocol` / `Control`: 循环中的故障
    pub fn control_with_mode<'cb>(
        &mut self,
        mode: CombinationMode,
        motion: Option<&mut CycleCallback<'cb>>,
        torque: Option<&mut CycleCallback<'cb>>,
    ) -> Result<()> {
        let mut engine = ControlLoop::new(
            &mut self.transport,
            mode,
            motion,
            torque,
            self.config.cycle_timeout(),
        )?;

        if mode.uses_torque() {
            realtime::acquire(self.config.realtime, self.scheduler.as_ref())?;
        }

        engine.run()
    }

    /// 力矩控制
    pub fn control_torques<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(&RobotState, Duration) -> Torques,
    {
        let mut torque = |state: &RobotState, period: Duration| Command::from(callback(state, period));
        self.control_with_mode(CombinationMode::TorqueOnly, None, Some(&mut torque))
    }

    /// 关节位置运动生成
    pub fn control_joint_positions<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&RobotState, Duration) -> JointValues,
    {
        self.control_motion(MotionGeneratorKind::JointPosition, callback)
    }

    /// 关节速度运动生成
    pub fn control_joint_velocities<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&RobotState, Duration) -> JointVelocities,
    {
        self.control_motion(MotionGeneratorKind::JointVelocity, callback)
    }

    /// 笛卡尔位姿运动生成
    pub fn control_cartesian_pose<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&RobotState, Duration) -> CartesianPose,
    {
        self.control_motion(MotionGeneratorKind::CartesianPose, callback)
    }

    /// 笛卡尔速度运动生成
    pub fn control_cartesian_velocities<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&RobotState, Duration) -> CartesianVelocities,
    {
        self.control_motion(MotionGeneratorKind::CartesianVelocity, callback)
    }

    /// 力矩 + 关节位置运动生成
    pub fn control_torques_and_joint_positions<T, M>(&mut self, torque: T, motion: M) -> Result<()>
    where
        T: FnMut(&RobotState, Duration) -> Torques,
        M: FnMut(&RobotState, Duration) -> JointValues,
    {
        self.control_motion_with_torques(MotionGeneratorKind::JointPosition, torque, motion)
    }

    /// 力矩 + 关节速度运动生成
    pub fn control_torques_and_joint_velocities<T, M>(&mut self, torque: T, motion: M) -> Result<()>
    where
        T: FnMut(&RobotState, Duration) -> Torques,
        M: FnMut(&RobotState, Duration) -> JointVelocities,
    {
        self.control_motion_with_torques(MotionGeneratorKind::JointVelocity, torque, motion)
    }

    /// 力矩 + 笛卡尔位姿运动生成
    pub fn control_torques_and_cartesian_pose<T, M>(&mut self, torque: T, motion: M) -> Result<()>
    where
        T: FnMut(&RobotState, Duration) -> Torques,
        M: FnMut(&RobotState, Duration) -> CartesianPose,
    {
        self.control_motion_with_torques(MotionGeneratorKind::CartesianPose, torque, motion)
    }

    /// 力矩 + 笛卡尔速度运动生成
    pub fn control_torques_and_cartesian_velocities<T, M>(
        &mut self,
        torque: T,
        motion: M,
    ) -> Result<()>
    where
        T: FnMut(&RobotState, Duration) -> Torques,
        M: FnMut(&RobotState, Duration) -> CartesianVelocities,
    {
        self.control_motion_with_torques(MotionGeneratorKind::CartesianVelocity, torque, motion)
    }

    fn control_motion<V, F>(&mut self, kind: MotionGeneratorKind, mut callback: F) -> Result<()>
    where
        V: Into<Command>,
        F: FnMut(&RobotState, Duration) -> V,
    {
        let mut motion = |state: &RobotState, period: Duration| -> Command { callback(state, period).into() };
        self.control_with_mode(CombinationMode::Motion(kind), Some(&mut motion), None)
    }

    fn control_motion_with_torques<V, T, M>(
        &mut self,
        kind: MotionGeneratorKind,
        mut torque: T,
        mut motion: M,
    ) -> Result<()>
    where
        V: Into<Command>,
        T: FnMut(&RobotState, Duration) -> Torques,
        M: FnMut(&RobotState, Duration) -> V,
    {
        let mut motion = |state: &RobotState, period: Duration| -> Command { motion(state, period).into() };
        let mut torque = |state: &RobotState, period: Duration| Command::from(torque(state, period));
        self.control_with_mode(
            CombinationMode::MotionWithTorque(kind),
            Some(&mut motion),
            Some(&mut torque),
        )
    }
}

impl<C: Connector> Drop for Robot<C> {
    fn drop(&mut self) {
        debug!("Closing session to {}", self.address);
    }
}
