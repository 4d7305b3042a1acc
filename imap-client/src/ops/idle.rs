//! Wires [`IdleSupervisor`]'s state machine to the scheduler: turns its
//! [`Action`]s into either a queued `IDLE`/fallback command or a raw
//! `DONE` write the I/O loop performs directly (§4.13).

use imap_types::error::Result;
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::idle::{Action, IdleSupervisor};
use crate::scheduler::{PendingRequest, RequestOptions};
use crate::session::Connection;

use super::require_state;

/// What the I/O loop should do in response to one supervisor transition.
#[derive(Debug)]
pub enum IdleEffect {
    None,
    StartTimer,
    /// `IDLE` or the configured fallback command was enqueued; await this
    /// receiver like any other operation.
    Enqueued(oneshot::Receiver<Result<Response>>),
    /// Write a bare `DONE\r\n` to end the in-progress `IDLE` (not a
    /// tagged command, so there is nothing to enqueue).
    WriteDone,
    /// Socket-idle timeout while idling: write `DONE`, then immediately
    /// re-issue `IDLE` once the tagged `OK` for `DONE` arrives.
    RestartIdle,
}

fn enqueue(conn: &mut Connection, command: impl Into<String>) -> oneshot::Receiver<Result<Response>> {
    let tag = conn.next_tag();
    let (request, rx) = PendingRequest::new(tag, command, vec![], RequestOptions::default());
    conn.enqueue(request);
    rx
}

fn from_action(conn: &mut Connection, action: Action) -> IdleEffect {
    match action {
        Action::None => IdleEffect::None,
        Action::StartTimer => IdleEffect::StartTimer,
        Action::SendIdleOrFallback => IdleEffect::Enqueued(enqueue(conn, "IDLE")),
        Action::WriteDone => IdleEffect::WriteDone,
        Action::RestartIdle => IdleEffect::RestartIdle,
        Action::RunFallbackCommand => {
            let fallback = conn.options.idle_fallback_command.clone();
            IdleEffect::Enqueued(enqueue(conn, fallback))
        }
    }
}

/// Arms the inactivity timer once the connection has nothing else queued.
pub fn begin_waiting(idle: &mut IdleSupervisor) -> IdleEffect {
    match idle.begin_waiting() {
        Action::StartTimer => IdleEffect::StartTimer,
        _ => IdleEffect::None,
    }
}

/// The inactivity timer fired; requires a selected mailbox, since `IDLE`
/// only makes sense with one (§4.13 precondition).
pub fn on_inactivity_timer_fired(conn: &mut Connection, idle: &mut IdleSupervisor) -> Result<IdleEffect> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    Ok(from_action(conn, idle.on_inactivity_timer_fired()))
}

pub fn on_continuation_received(idle: &mut IdleSupervisor) {
    idle.on_continuation_received();
}

/// A real command was dequeued from the scheduler; break `IDLE` first if
/// it is running.
pub fn on_command_dequeued(conn: &mut Connection, idle: &mut IdleSupervisor) -> IdleEffect {
    from_action(conn, idle.on_command_dequeued())
}

pub fn on_max_idle_time_elapsed(conn: &mut Connection, idle: &mut IdleSupervisor) -> IdleEffect {
    from_action(conn, idle.on_max_idle_time_elapsed())
}

pub fn on_socket_idle_during_idle(conn: &mut Connection, idle: &mut IdleSupervisor) -> IdleEffect {
    from_action(conn, idle.on_socket_idle_during_idle())
}

pub fn on_idle_command_completed(idle: &mut IdleSupervisor) {
    idle.on_idle_command_completed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectOptions;
    use std::time::Duration;

    fn selected_conn() -> Connection {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.state = ConnectionState::Selected;
        conn
    }

    #[test]
    fn inactivity_timer_enqueues_idle_when_supported() {
        let mut conn = selected_conn();
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.begin_waiting();
        let effect = on_inactivity_timer_fired(&mut conn, &mut idle).unwrap();
        assert!(matches!(effect, IdleEffect::Enqueued(_)));
        assert!(conn.scheduler.try_send(conn.literal_support).is_some());
    }

    #[test]
    fn inactivity_timer_falls_back_when_server_lacks_idle() {
        let mut conn = selected_conn();
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.server_supports_idle = false;
        idle.begin_waiting();
        let effect = on_inactivity_timer_fired(&mut conn, &mut idle).unwrap();
        assert!(matches!(effect, IdleEffect::Enqueued(_)));
        let fragment = conn.scheduler.try_send(conn.literal_support).unwrap();
        let crate::compiler::Fragment::Line(bytes) = fragment else {
            panic!("expected a single line fragment");
        };
        assert!(String::from_utf8(bytes).unwrap().contains("NOOP"));
    }

    #[test]
    fn inactivity_timer_requires_a_selected_mailbox() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        assert!(on_inactivity_timer_fired(&mut conn, &mut idle).is_err());
    }

    #[test]
    fn dequeuing_a_command_while_idling_yields_write_done() {
        let mut conn = selected_conn();
        let mut idle = IdleSupervisor::new(Duration::from_secs(1740), "NOOP");
        idle.begin_waiting();
        on_inactivity_timer_fired(&mut conn, &mut idle).unwrap();
        on_continuation_received(&mut idle);
        let effect = on_command_dequeued(&mut conn, &mut idle);
        assert!(matches!(effect, IdleEffect::WriteDone));
    }
}
