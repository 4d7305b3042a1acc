//! Starts/stops IDLE on inactivity, with a NOOP fallback for servers that
//! lack it (C13, §4.13).

use std::time::Duration;

/// The supervisor's internal state. `conn::session` drives the actual
/// timer and wire I/O; this module only decides the next action so the
/// logic stays unit-testable without a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// No idle timer armed (a command is queued or about to be).
    Inactive,
    /// Idle timer running, nothing sent yet.
    Waiting,
    /// `TAG IDLE` sent, awaiting the `+` continuation.
    AwaitingContinuation,
    /// `+` received; genuinely idling on the wire.
    Idling,
    /// `DONE` written, awaiting the tagged `OK` that ends IDLE.
    Stopping,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartTimer,
    SendIdleOrFallback,
    WriteDone,
    RestartIdle,
    RunFallbackCommand,
}

#[derive(Debug)]
pub struct IdleSupervisor {
    state: IdleState,
    pub inactivity_delay: Duration,
    pub max_idle_time: Duration,
    pub server_supports_idle: bool,
    pub fallback_command: String,
}

impl IdleSupervisor {
    pub fn new(max_idle_time: Duration, fallback_command: impl Into<String>) -> Self {
        IdleSupervisor {
            state: IdleState::Inactive,
            inactivity_delay: Duration::from_secs(15),
            max_idle_time,
            server_supports_idle: true,
            fallback_command: fallback_command.into(),
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    fn transition(&mut self, next: IdleState) {
        log::debug!("idle supervisor: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// A command was dequeued for sending; if idling, it must be broken
    /// first (§4.13 "any subsequent command dequeue").
    pub fn on_command_dequeued(&mut self) -> Action {
        match self.state {
            IdleState::Idling | IdleState::AwaitingContinuation => {
                self.transition(IdleState::Stopping);
                Action::WriteDone
            }
            _ => {
                self.transition(IdleState::Inactive);
                Action::None
            }
        }
    }

    /// Called once `DONE`'s tagged `OK` arrives.
    pub fn on_idle_command_completed(&mut self) {
        // Do not re-arm immediately after IDLE terminates itself (§4.13).
        self.transition(IdleState::Inactive);
    }

    /// The connection has been idle for `inactivity_delay`; mailbox is
    /// selected, and no command is queued.
    pub fn on_inactivity_timer_fired(&mut self) -> Action {
        self.transition(IdleState::AwaitingContinuation);
        if self.server_supports_idle {
            Action::SendIdleOrFallback
        } else {
            Action::RunFallbackCommand
        }
    }

    pub fn on_continuation_received(&mut self) {
        if self.state == IdleState::AwaitingContinuation {
            self.transition(IdleState::Idling);
        }
    }

    /// `max_idle_time` elapsed while idling: break and restart
    /// automatically.
    pub fn on_max_idle_time_elapsed(&mut self) -> Action {
        if self.state == IdleState::Idling {
            self.transition(IdleState::Stopping);
            Action::WriteDone
        } else {
            Action::None
        }
    }

    /// A socket-idle timeout fired while idling: issue NOOP and re-enter
    /// IDLE (§4.13).
    pub fn on_socket_idle_during_idle(&mut self) -> Action {
        if self.state == IdleState::Idling {
            Action::RestartIdle
        } else {
            Action::None
        }
    }

    pub fn begin_waiting(&mut self) -> Action {
        if self.state == IdleState::Inactive {
            self.transition(IdleState::Waiting);
            Action::StartTimer
        } else {
            Action::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeuing_a_command_while_idling_writes_done() {
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.begin_waiting();
        idle.on_inactivity_timer_fired();
        idle.on_continuation_received();
        assert_eq!(idle.state(), IdleState::Idling);

        let action = idle.on_command_dequeued();
        assert_eq!(action, Action::WriteDone);
        assert_eq!(idle.state(), IdleState::Stopping);
    }

    #[test]
    fn idle_does_not_rearm_immediately_after_self_termination() {
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.begin_waiting();
        idle.on_inactivity_timer_fired();
        idle.on_continuation_received();
        idle.on_max_idle_time_elapsed();
        idle.on_idle_command_completed();
        assert_eq!(idle.state(), IdleState::Inactive);
    }

    #[test]
    fn servers_without_idle_use_the_fallback_command() {
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.server_supports_idle = false;
        idle.begin_waiting();
        let action = idle.on_inactivity_timer_fired();
        assert_eq!(action, Action::RunFallbackCommand);
    }

    #[test]
    fn socket_idle_while_idling_restarts_idle() {
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.begin_waiting();
        idle.on_inactivity_timer_fired();
        idle.on_continuation_received();
        assert_eq!(idle.on_socket_idle_during_idle(), Action::RestartIdle);
    }
}
