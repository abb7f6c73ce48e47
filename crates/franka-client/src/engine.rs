//! 控制循环引擎
//!
//! 驱动一次 control/read 调用的状态机：
//!
//! ```text
//! Idle → AwaitState → Dispatch → Validate → Send ─┬→ AwaitState（下一周期）
//!                                                 ├→ Finishing → Finished
//!            任一阶段失败 ────────────────────────→ Faulted
//! ```
//!
//! 每周期：接收一条状态 → 先调用运动生成器回调、再调用力矩回调 →
//! 校验命令类型与数值 → 组合并发送。回调报告运动结束时，携带结束标志的
//! 命令即为最后一条命令。
//!
//! 任何故障立即中止循环（不再发送），故障原样返回给调用方，不做重试。

use crate::error::{FrankaError, Result};
use crate::mode::CombinationMode;
use franka_net::{Channel, Transport};
use franka_protocol::{Command, CommandKind, RobotCommand, RobotState};
use std::time::Duration;
use tracing::{debug, error, trace};

/// 每周期回调：输入本周期状态与距上一周期的时间间隔，输出命令
pub type CycleCallback<'cb> = dyn FnMut(&RobotState, Duration) -> Command + 'cb;

/// 循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopPhase {
    Idle,
    AwaitState,
    Dispatch,
    Validate,
    Send,
    Finishing,
    Finished,
    Faulted,
}

impl LoopPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopPhase::Finished | LoopPhase::Faulted)
    }
}

// ============================================================================
// 状态接收（control / read 共用）
// ============================================================================

/// 按周期截止时间接收并解码状态，检查跨周期顺序
#[derive(Debug)]
pub(crate) struct StateReceiver {
    timeout: Duration,
    last_message_id: Option<u64>,
    last_time: Option<Duration>,
}

impl StateReceiver {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_message_id: None,
            last_time: None,
        }
    }

    /// 接收下一条状态，返回状态与距上一状态的时间间隔（首个周期为 0）
    ///
    /// # 错误
    ///
    /// - `Network`: 截止时间内未收到、链路断开
    /// - `Protocol`: 消息结构异常，或 message_id 未严格递增（乱序 / 重复）
    pub(crate) fn next<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<(RobotState, Duration)> {
        let message = transport.receive(Channel::Realtime, self.timeout)?;
        let state = RobotState::decode(&message)?;

        if let Some(previous) = self.last_message_id {
            if state.message_id <= previous {
                return Err(FrankaError::protocol(format!(
                    "out-of-order or duplicate state: message id {} after {}",
                    state.message_id, previous
                )));
            }
        }

        let period = self
            .last_time
            .map(|last| state.time.saturating_sub(last))
            .unwrap_or(Duration::ZERO);

        self.last_message_id = Some(state.message_id);
        self.last_time = Some(state.time);
        Ok((state, period))
    }
}

// ============================================================================
// 控制循环
// ============================================================================

/// 一次控制调用的循环引擎
///
/// 引擎只在一次 `control` 调用期间存在，借用会话的传输与用户回调。
pub struct ControlLoop<'a, 'cb, T: Transport + ?Sized> {
    transport: &'a mut T,
    mode: CombinationMode,
    motion: Option<&'a mut CycleCallback<'cb>>,
    torque: Option<&'a mut CycleCallback<'cb>>,
    receiver: StateReceiver,
    phase: LoopPhase,
    commands_sent: u64,
}

impl<'a, 'cb, T: Transport + ?Sized> ControlLoop<'a, 'cb, T> {
    /// 创建控制循环
    ///
    /// # 错误
    ///
    /// 回调槽位与组合模式不匹配时返回 `InvalidArgument`：
    /// 只读模式、缺少模式要求的回调、或提供了模式不使用的回调。
    pub fn new(
        transport: &'a mut T,
        mode: CombinationMode,
        motion: Option<&'a mut CycleCallback<'cb>>,
        torque: Option<&'a mut CycleCallback<'cb>>,
        cycle_timeout: Duration,
    ) -> Result<Self> {
        if mode.is_read_only() {
            return Err(FrankaError::invalid_argument(
                "control loop requires at least one callback; use read() for read-only access",
            ));
        }
        if mode.motion_kind().is_some() != motion.is_some() {
            return Err(FrankaError::invalid_argument(format!(
                "motion generator callback does not match mode {}",
                mode
            )));
        }
        if mode.uses_torque() != torque.is_some() {
            return Err(FrankaError::invalid_argument(format!(
                "torque callback does not match mode {}",
                mode
            )));
        }

        Ok(Self {
            transport,
            mode,
            motion,
            torque,
            receiver: StateReceiver::new(cycle_timeout),
            phase: LoopPhase::Idle,
            commands_sent: 0,
        })
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// 已发送命令数
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// 运行至结束或故障（阻塞）
    ///
    /// 引擎只运行一次：进入 `Finished` / `Faulted` 后再次调用返回 `InvalidArgument`。
    pub fn run(&mut self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(FrankaError::invalid_argument(format!(
                "control loop already ended ({:?})",
                self.phase
            )));
        }
        debug!("Control loop started (mode: {})", self.mode);

        match self.run_cycles() {
            Ok(()) => {
                self.phase = LoopPhase::Finished;
                debug!(
                    "Control loop finished after {} commands",
                    self.commands_sent
                );
                Ok(())
            },
            Err(e) => {
                error!(
                    "Control loop faulted in {:?} after {} commands: {}",
                    self.phase, self.commands_sent, e
                );
                self.phase = LoopPhase::Faulted;
                Err(e)
            },
        }
    }

    fn run_cycles(&mut self) -> Result<()> {
        loop {
            self.phase = LoopPhase::AwaitState;
            let (state, period) = self.receiver.next(&mut *self.transport)?;

            self.phase = LoopPhase::Dispatch;
            if let Some(fault) = state.fault {
                return Err(FrankaError::control(format!(
                    "controller rejected motion: {}",
                    fault
                )));
            }
            let (motion, torque) = self.dispatch(&state, period);

            self.phase = LoopPhase::Validate;
            let command = self.validate(state.message_id, motion, torque)?;

            self.phase = LoopPhase::Send;
            self.transport.send(Channel::Realtime, &command.encode())?;
            self.commands_sent += 1;
            trace!(
                "Cycle {} sent (finished: {})",
                state.message_id,
                command.motion_finished()
            );

            if command.motion_finished() {
                self.phase = LoopPhase::Finishing;
                return Ok(());
            }
        }
    }

    /// 固定顺序调用回调：运动生成器在前，力矩在后
    fn dispatch(
        &mut self,
        state: &RobotState,
        period: Duration,
    ) -> (Option<Command>, Option<Command>) {
        let motion = self.motion.as_mut().map(|callback| callback(state, period));
        let torque = self.torque.as_mut().map(|callback| callback(state, period));
        (motion, torque)
    }

    /// 校验回调输出并组合为线上命令
    fn validate(
        &self,
        message_id: u64,
        motion: Option<Command>,
        torque: Option<Command>,
    ) -> Result<RobotCommand> {
        let motion = match (self.mode.expected_motion(), motion) {
            (Some(expected), Some(command)) => {
                check_command(&command, expected, self.mode)?;
                command.into_motion()
            },
            _ => None,
        };

        let torques = match torque {
            Some(command) => {
                check_command(&command, CommandKind::Torques, self.mode)?;
                command.into_torques()
            },
            None => None,
        };

        Ok(RobotCommand {
            message_id,
            motion,
            torques,
        })
    }
}

/// 命令类型必须与槽位期望一致，且所有数值有限
fn check_command(command: &Command, expected: CommandKind, mode: CombinationMode) -> Result<()> {
    if command.kind() != expected {
        return Err(FrankaError::control(format!(
            "callback returned {:?} command, expected {:?} in mode {}",
            command.kind(),
            expected,
            mode
        )));
    }
    if !command.is_finite() {
        return Err(FrankaError::control(format!(
            "callback returned non-finite value in {:?} command",
            command.kind()
        )));
    }
    Ok(())
}

// ============================================================================
// 只读循环
// ============================================================================

/// 只读循环：每周期接收一条状态并调用谓词，谓词返回 `false` 时结束
///
/// 从不发送命令。状态中的控制器故障标志原样交给谓词，不视为故障。
pub fn read_loop<T: Transport + ?Sized>(
    transport: &mut T,
    cycle_timeout: Duration,
    predicate: &mut dyn FnMut(&RobotState) -> bool,
) -> Result<()> {
    let mut receiver = StateReceiver::new(cycle_timeout);
    let mut cycles = 0u64;
    debug!("Read loop started");

    loop {
        let (state, _) = receiver.next(transport).inspect_err(|e| {
            error!("Read loop faulted after {} states: {}", cycles, e);
        })?;
        cycles += 1;

        if !predicate(&state) {
            debug!("Read loop finished after {} states", cycles);
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use franka_net::{MockTransport, SentLog};
    use franka_protocol::{
        ControllerFault, JOINT_COUNT, JointValues, MotionGeneratorKind, Torques,
    };

    const CYCLE: Duration = Duration::from_millis(1);

    fn state(message_id: u64) -> RobotState {
        RobotState {
            message_id,
            time: Duration::from_millis(message_id),
            ..RobotState::default()
        }
    }

    fn scripted(ids: impl IntoIterator<Item = u64>) -> (MockTransport, SentLog) {
        let mut transport = MockTransport::new();
        for id in ids {
            transport.push_message(Channel::Realtime, state(id).encode());
        }
        let log = transport.sent_log();
        (transport, log)
    }

    #[test]
    fn test_torque_loop_finishes_on_flag() {
        let (mut transport, log) = scripted(1..=10);
        let mut torque = |s: &RobotState, _: Duration| {
            let cmd = Torques::new([0.5; JOINT_COUNT]);
            Command::from(if s.message_id == 10 { cmd.finished() } else { cmd })
        };

        let mut engine = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap();
        assert_eq!(engine.phase(), LoopPhase::Idle);
        engine.run().unwrap();
        assert_eq!(engine.phase(), LoopPhase::Finished);
        assert!(engine.phase().is_terminal());
        assert_eq!(engine.commands_sent(), 10);

        let sent = log.messages(Channel::Realtime);
        assert_eq!(sent.len(), 10);
        let last = RobotCommand::decode(&sent[9]).unwrap();
        assert_eq!(last.message_id, 10);
        assert!(last.motion_finished());
        assert!(last.motion.is_none());
    }

    #[test]
    fn test_engine_runs_only_once() {
        let (mut transport, log) = scripted(1..=3);
        let mut torque = |_: &RobotState, _: Duration| {
            Command::from(Torques::new([0.0; JOINT_COUNT]).finished())
        };

        let mut engine = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap();
        engine.run().unwrap();

        let err = engine.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(engine.phase(), LoopPhase::Finished);
        assert_eq!(engine.commands_sent(), 1);
        assert_eq!(log.count(Channel::Realtime), 1);
    }

    #[test]
    fn test_motion_dispatched_before_torque() {
        let (mut transport, _log) = scripted([1]);
        let order = std::cell::RefCell::new(Vec::new());

        let mut motion = |_: &RobotState, _: Duration| {
            order.borrow_mut().push("motion");
            Command::from(JointValues::new([0.0; JOINT_COUNT]).finished())
        };
        let mut torque = |_: &RobotState, _: Duration| {
            order.borrow_mut().push("torque");
            Command::from(Torques::new([0.0; JOINT_COUNT]))
        };

        ControlLoop::new(
            &mut transport,
            CombinationMode::MotionWithTorque(MotionGeneratorKind::JointPosition),
            Some(&mut motion),
            Some(&mut torque),
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap();

        assert_eq!(*order.borrow(), vec!["motion", "torque"]);
    }

    #[test]
    fn test_period_between_states() {
        let mut transport = MockTransport::new();
        for (id, ms) in [(1, 100), (2, 101), (3, 103)] {
            let s = RobotState {
                time: Duration::from_millis(ms),
                ..state(id)
            };
            transport.push_message(Channel::Realtime, s.encode());
        }

        let mut periods = Vec::new();
        let mut torque = |s: &RobotState, period: Duration| {
            periods.push(period);
            let cmd = Torques::new([0.0; JOINT_COUNT]);
            Command::from(if s.message_id == 3 { cmd.finished() } else { cmd })
        };
        ControlLoop::new(&mut transport, CombinationMode::TorqueOnly, None, Some(&mut torque), CYCLE)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(
            periods,
            vec![Duration::ZERO, Duration::from_millis(1), Duration::from_millis(2)]
        );
    }

    #[test]
    fn test_timeout_faults_loop() {
        let (mut transport, log) = scripted(1..=4);
        let mut torque = |_: &RobotState, _: Duration| Command::from(Torques::new([0.0; JOINT_COUNT]));

        let mut engine = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap();
        let err = engine.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(engine.phase(), LoopPhase::Faulted);
        assert_eq!(log.count(Channel::Realtime), 4);
    }

    #[test]
    fn test_non_finite_command_is_control_failure() {
        let (mut transport, log) = scripted(1..=5);
        let mut torque = |s: &RobotState, _: Duration| {
            let mut tau = [0.0; JOINT_COUNT];
            if s.message_id == 3 {
                tau[2] = f64::NAN;
            }
            Command::from(Torques::new(tau))
        };

        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Control);
        assert!(err.message().contains("non-finite"));
        assert_eq!(log.count(Channel::Realtime), 2);
    }

    #[test]
    fn test_mode_mismatch_is_control_failure() {
        let (mut transport, log) = scripted([1]);
        // 关节位置模式下运动回调返回关节速度
        let mut motion = |_: &RobotState, _: Duration| {
            Command::from(franka_protocol::JointVelocities::new([0.0; JOINT_COUNT]))
        };

        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::Motion(MotionGeneratorKind::JointPosition),
            Some(&mut motion),
            None,
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Control);
        assert!(log.is_empty());
    }

    #[test]
    fn test_torque_slot_rejects_motion_command() {
        let (mut transport, _log) = scripted([1]);
        let mut torque =
            |_: &RobotState, _: Duration| Command::from(JointValues::new([0.0; JOINT_COUNT]));

        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Control);
    }

    #[test]
    fn test_controller_fault_stops_before_dispatch() {
        let mut transport = MockTransport::new();
        transport.push_message(Channel::Realtime, state(1).encode());
        transport.push_message(
            Channel::Realtime,
            RobotState {
                fault: Some(ControllerFault::JointVelocityViolation),
                ..state(2)
            }
            .encode(),
        );
        let log = transport.sent_log();

        let mut calls = 0;
        let mut torque = |_: &RobotState, _: Duration| {
            calls += 1;
            Command::from(Torques::new([0.0; JOINT_COUNT]))
        };
        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Control);
        assert!(err.message().contains("joint velocity violation"));
        assert_eq!(calls, 1);
        assert_eq!(log.count(Channel::Realtime), 1);
    }

    #[test]
    fn test_duplicate_state_is_protocol_failure() {
        let (mut transport, log) = scripted([1, 2, 2]);
        let mut torque = |_: &RobotState, _: Duration| Command::from(Torques::new([0.0; JOINT_COUNT]));

        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap()
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(log.count(Channel::Realtime), 2);
    }

    #[test]
    fn test_send_failure_is_network_failure() {
        let (mut transport, _log) = scripted(1..=3);
        transport.fail_sends_after(1);
        let mut torque = |_: &RobotState, _: Duration| Command::from(Torques::new([0.0; JOINT_COUNT]));

        let mut engine = ControlLoop::new(
            &mut transport,
            CombinationMode::TorqueOnly,
            None,
            Some(&mut torque),
            CYCLE,
        )
        .unwrap();
        assert_eq!(engine.run().unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(engine.commands_sent(), 1);
    }

    #[test]
    fn test_slot_preconditions() {
        let mut transport = MockTransport::new();
        let mut cb = |_: &RobotState, _: Duration| Command::from(Torques::new([0.0; JOINT_COUNT]));

        let err = ControlLoop::new(&mut transport, CombinationMode::ReadOnly, None, None, CYCLE)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = ControlLoop::new(
            &mut transport,
            CombinationMode::Motion(MotionGeneratorKind::CartesianPose),
            None,
            Some(&mut cb),
            CYCLE,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_read_loop_sends_nothing() {
        let (mut transport, log) = scripted(1..=5);
        let mut seen = Vec::new();
        read_loop(&mut transport, CYCLE, &mut |s: &RobotState| {
            seen.push(s.message_id);
            s.message_id < 3
        })
        .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(log.is_empty());
        assert_eq!(transport.pending(Channel::Realtime), 2);
    }

    #[test]
    fn test_read_loop_passes_controller_fault_through() {
        let mut transport = MockTransport::new();
        transport.push_message(
            Channel::Realtime,
            RobotState {
                fault: Some(ControllerFault::CartesianReflex),
                ..state(1)
            }
            .encode(),
        );

        let mut fault = None;
        read_loop(&mut transport, CYCLE, &mut |s: &RobotState| {
            fault = s.fault;
            false
        })
        .unwrap();
        assert_eq!(fault, Some(ControllerFault::CartesianReflex));
    }

    proptest::proptest! {
        /// 第 n 个周期产生非有限命令时，恰好发送 n-1 条命令
        #[test]
        fn prop_non_finite_stops_before_send(bad in 1u64..20, joint in 0usize..JOINT_COUNT) {
            let (mut transport, log) = scripted(1..=20);
            let mut torque = |s: &RobotState, _: Duration| {
                let mut tau = [0.0; JOINT_COUNT];
                if s.message_id == bad {
                    tau[joint] = f64::NAN;
                }
                Command::from(Torques::new(tau))
            };

            let mut engine = ControlLoop::new(
                &mut transport,
                CombinationMode::TorqueOnly,
                None,
                Some(&mut torque),
                CYCLE,
            )
            .unwrap();
            let err = engine.run().unwrap_err();

            proptest::prop_assert_eq!(err.kind(), ErrorKind::Control);
            proptest::prop_assert_eq!(engine.phase(), LoopPhase::Faulted);
            proptest::prop_assert_eq!(engine.commands_sent(), bad - 1);
            proptest::prop_assert_eq!(log.count(Channel::Realtime) as u64, bad - 1);
        }
    }
}
