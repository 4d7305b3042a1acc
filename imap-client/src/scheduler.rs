//! FIFO of tagged commands with a single in-flight slot (C9, §4.9).
//!
//! Modeled per §9's "promise-based scheduler" guidance: the queue holds
//! [`PendingRequest`]s, each carrying a completion channel instead of a
//! callback; the in-flight slot is a plain `Option`, and the `+`
//! continuation is a state transition on that slot rather than a nested
//! callback chain.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use imap_types::core::Node;
use imap_types::error::{Error, Result};
use imap_types::response::Response;
use tokio::sync::oneshot;

use crate::compiler::{compile, Fragment, Request};
use crate::session::LiteralSupport;

pub type UntaggedOverride = Arc<dyn Fn(&Response) + Send + Sync>;
/// Invoked on a `+` continuation when the request wants to write its own
/// payload instead of the scheduler popping the next literal fragment
/// (used for SASL continuations).
pub type OnPlusTag = Arc<dyn Fn(&Response) -> Option<Vec<u8>> + Send + Sync>;

/// Options narrowing how one request's untagged/continuation traffic is
/// handled, scoped to that request's lifetime only (§3 "PendingRequest").
#[derive(Default, Clone)]
pub struct RequestOptions {
    pub untagged: HashMap<String, UntaggedOverride>,
    pub on_plus_tag: Option<OnPlusTag>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("untagged", &self.untagged.keys().collect::<Vec<_>>())
            .field("on_plus_tag", &self.on_plus_tag.is_some())
            .finish()
    }
}

/// A queued or in-flight tagged command (§3 "PendingRequest").
#[derive(Debug)]
pub struct PendingRequest {
    pub tag: String,
    pub command: String,
    pub attributes: Vec<Node>,
    pub options: RequestOptions,
    resolver: Option<oneshot::Sender<Result<Response>>>,
}

impl PendingRequest {
    pub fn new(
        tag: impl Into<String>,
        command: impl Into<String>,
        attributes: Vec<Node>,
        options: RequestOptions,
    ) -> (Self, oneshot::Receiver<Result<Response>>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingRequest {
                tag: tag.into(),
                command: command.into(),
                attributes,
                options,
                resolver: Some(tx),
            },
            rx,
        )
    }

    fn request(&self) -> Request {
        Request {
            tag: self.tag.clone(),
            command: self.command.clone(),
            attributes: self.attributes.clone(),
        }
    }

    fn settle(&mut self, outcome: Result<Response>) {
        if let Some(tx) = self.resolver.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Tracks the in-flight request's unsent compiled fragments so the
/// scheduler can resume writing after each `+` continuation.
#[derive(Debug)]
struct InFlight {
    request: PendingRequest,
    remaining: std::collections::VecDeque<Fragment>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<PendingRequest>,
    in_flight: Option<InFlight>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: PendingRequest) {
        self.queue.push_back(request);
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// If nothing is in flight and the queue is non-empty, compiles the
    /// next request and returns its first fragment plus any remaining
    /// fragments still to be written (stashed internally).
    pub fn try_send(&mut self, literal_support: LiteralSupport) -> Option<Fragment> {
        if self.in_flight.is_some() {
            return None;
        }
        let request = self.queue.pop_front()?;
        let mut fragments = compile(&request.request(), literal_support);
        let first = fragments.pop_front();
        self.in_flight = Some(InFlight {
            request,
            remaining: fragments,
        });
        first
    }

    /// On a `+` continuation: either hands control to the request's
    /// `on_plus_tag` handler, or pops and returns the next stashed literal
    /// fragment (§4.9 "Resume").
    pub fn on_continuation(&mut self, response: &Response) -> ContinuationAction {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return ContinuationAction::Ignore;
        };
        if let Some(handler) = in_flight.request.options.on_plus_tag.clone() {
            return match handler(response) {
                Some(bytes) => ContinuationAction::WriteRaw(bytes),
                None => ContinuationAction::Ignore,
            };
        }
        match in_flight.remaining.pop_front() {
            Some(fragment) => ContinuationAction::WriteFragment(fragment),
            None => ContinuationAction::Ignore,
        }
    }

    /// Looks up a per-request untagged override for `command`, if the
    /// in-flight request registered one.
    pub fn in_flight_override(&self, command: &str) -> Option<UntaggedOverride> {
        self.in_flight
            .as_ref()
            .and_then(|f| f.request.options.untagged.get(&command.to_ascii_uppercase()).cloned())
    }

    pub fn in_flight_tag(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.request.tag.as_str())
    }

    /// Completes the in-flight request with `outcome` and attempts to send
    /// the next queued request (§4.9 "Complete").
    pub fn complete(&mut self, outcome: Result<Response>, literal_support: LiteralSupport) -> Option<Fragment> {
        if let Some(mut in_flight) = self.in_flight.take() {
            in_flight.request.settle(outcome);
        }
        self.try_send(literal_support)
    }

    /// Rejects the in-flight request and every queued one with
    /// `NoConnection` (§7 terminal-error propagation).
    pub fn reject_all_with_no_connection(&mut self) {
        if let Some(mut in_flight) = self.in_flight.take() {
            in_flight.request.settle(Err(Error::NoConnection));
        }
        while let Some(mut request) = self.queue.pop_front() {
            request.settle(Err(Error::NoConnection));
        }
    }
}

#[derive(Debug)]
pub enum ContinuationAction {
    WriteFragment(Fragment),
    WriteRaw(Vec<u8>),
    Ignore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use imap_types::core::{ResponseTag, Tag};

    fn ok_response(tag: &str) -> Response {
        Response {
            tag: ResponseTag::Tagged(Tag(tag.to_string())),
            command: "OK".to_string(),
            attributes: vec![],
        }
    }

    #[test]
    fn only_one_request_is_in_flight_at_a_time() {
        let mut sched = Scheduler::new();
        let (r1, _rx1) = PendingRequest::new("A1", "NOOP", vec![], RequestOptions::default());
        let (r2, _rx2) = PendingRequest::new("A2", "NOOP", vec![], RequestOptions::default());
        sched.enqueue(r1);
        sched.enqueue(r2);

        assert!(sched.try_send(LiteralSupport::None).is_some());
        assert!(sched.has_in_flight());
        assert!(sched.try_send(LiteralSupport::None).is_none());
    }

    #[test]
    fn completing_the_in_flight_request_sends_the_next_one() {
        let mut sched = Scheduler::new();
        let (r1, rx1) = PendingRequest::new("A1", "NOOP", vec![], RequestOptions::default());
        let (r2, _rx2) = PendingRequest::new("A2", "NOOP", vec![], RequestOptions::default());
        sched.enqueue(r1);
        sched.enqueue(r2);
        sched.try_send(LiteralSupport::None);

        let next = sched.complete(Ok(ok_response("A1")), LiteralSupport::None);
        assert!(next.is_some());
        assert_eq!(sched.in_flight_tag(), Some("A2"));
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn rejecting_all_settles_queued_and_in_flight_requests() {
        let mut sched = Scheduler::new();
        let (r1, rx1) = PendingRequest::new("A1", "NOOP", vec![], RequestOptions::default());
        let (r2, rx2) = PendingRequest::new("A2", "NOOP", vec![], RequestOptions::default());
        sched.enqueue(r1);
        sched.enqueue(r2);
        sched.try_send(LiteralSupport::None);

        sched.reject_all_with_no_connection();
        assert!(matches!(rx1.try_recv().unwrap(), Err(Error::NoConnection)));
        assert!(matches!(rx2.try_recv().unwrap(), Err(Error::NoConnection)));
    }
}
