//! Connection lifecycle and per-connection state (C11, §4.11, §3).

use std::collections::HashMap;
use std::time::Duration;

use imap_types::capability::CapabilitySet;
use imap_types::core::{Node, ResponseTag};
use imap_types::error::{Error, Result};
use imap_types::mailbox::Mailbox;
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::auth::{Credentials, LoginChallenge, Mechanism};
use crate::compiler::{compile, Fragment, Request};
use crate::compress::{Compressor, Decompressor};
use crate::framer::Framer;
use crate::io::{BoxedStream, Dialer, TlsOptions, TlsVersion, TlsWrapper};
use crate::lock::LockQueue;
use crate::scheduler::{PendingRequest, Scheduler};

/// Which literal form the compiler is allowed to use, derived from the
/// negotiated capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralSupport {
    LiteralPlus,
    LiteralMinus,
    None,
}

impl LiteralSupport {
    pub fn from_capabilities(caps: &CapabilitySet) -> Self {
        if caps.has("LITERAL+") {
            LiteralSupport::LiteralPlus
        } else if caps.has("LITERAL-") {
            LiteralSupport::LiteralMinus
        } else {
            LiteralSupport::None
        }
    }
}

/// How the client should attempt a TLS upgrade, mirroring the STARTTLS
/// policy of §4.11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTlsPolicy {
    /// Connect straight into TLS (port 993 by default).
    ImplicitTls,
    /// Require STARTTLS; fail with `TlsFailure` if unavailable.
    Required,
    /// Never upgrade, even if advertised.
    Disabled,
    /// Upgrade opportunistically if the server advertises it.
    Opportunistic,
}

/// Caller-supplied connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub servername: Option<String>,
    pub tls_policy: StartTlsPolicy,
    pub enable_condstore: bool,
    pub enable_qresync: bool,
    pub enable_utf8_accept: bool,
    pub idle_fallback_command: String,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub greeting_timeout: Duration,
    pub upgrade_timeout: Duration,
    pub socket_idle_timeout: Duration,
    /// Opt into `COMPRESS=DEFLATE` once authenticated, if the server
    /// advertises it (§4.11).
    pub enable_compress: bool,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectOptions {
            host: host.into(),
            port,
            servername: None,
            tls_policy: StartTlsPolicy::Opportunistic,
            enable_condstore: false,
            enable_qresync: false,
            enable_utf8_accept: false,
            idle_fallback_command: "NOOP".to_string(),
            max_idle_time: Duration::from_secs(29 * 60),
            connect_timeout: Duration::from_secs(90),
            greeting_timeout: Duration::from_secs(16),
            upgrade_timeout: Duration::from_secs(10),
            socket_idle_timeout: Duration::from_secs(5 * 60),
            enable_compress: false,
        }
    }

    pub fn secure(host: impl Into<String>, port: u16) -> Self {
        let mut opts = Self::new(host, port);
        opts.tls_policy = StartTlsPolicy::ImplicitTls;
        opts
    }
}

pub type UntaggedHandler = std::sync::Arc<dyn Fn(&imap_types::response::Response) + Send + Sync>;

/// Owns everything about one IMAP connection that is not the socket
/// itself: negotiated capabilities, the currently selected mailbox, the
/// tagged-command FIFO (via [`Scheduler`]), and the session-wide untagged
/// handler table (§3 "Connection").
pub struct Connection {
    pub options: ConnectOptions,
    pub state: ConnectionState,
    pub capabilities: CapabilitySet,
    pub enabled: std::collections::HashSet<String>,
    pub mailbox: Option<Mailbox>,
    pub namespace_prefix: Option<String>,
    pub literal_support: LiteralSupport,
    tag_counter: u64,
    pub scheduler: Scheduler,
    pub lock_queue: LockQueue,
    session_handlers: HashMap<String, UntaggedHandler>,
    compressor: Option<Compressor>,
    decompressor: Option<Decompressor>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("mailbox", &self.mailbox)
            .field("literal_support", &self.literal_support)
            .field("compression_active", &self.compressor.is_some())
            .finish()
    }
}

impl Connection {
    pub fn new(options: ConnectOptions) -> Self {
        Connection {
            options,
            state: ConnectionState::NotAuthenticated,
            capabilities: CapabilitySet::new(),
            enabled: std::collections::HashSet::new(),
            mailbox: None,
            namespace_prefix: None,
            literal_support: LiteralSupport::None,
            tag_counter: 0,
            scheduler: Scheduler::new(),
            lock_queue: LockQueue::new(),
            session_handlers: HashMap::new(),
            compressor: None,
            decompressor: None,
        }
    }

    /// Next client tag, per §4.9: a monotonically increasing uppercase-hex
    /// counter prefixed with `A`.
    pub fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{:X}", self.tag_counter)
    }

    pub fn refresh_literal_support(&mut self) {
        self.literal_support = LiteralSupport::from_capabilities(&self.capabilities);
        log::debug!("literal support: {:?}", self.literal_support);
    }

    /// Registers a session-wide untagged handler (e.g. `EXISTS`, `EXPUNGE`,
    /// `FLAGS`), overridable per-request via [`PendingRequest::untagged`].
    pub fn on_untagged(&mut self, command: impl Into<String>, handler: UntaggedHandler) {
        self.session_handlers
            .insert(command.into().to_ascii_uppercase(), handler);
    }

    pub fn session_handler(&self, command: &str) -> Option<&UntaggedHandler> {
        self.session_handlers.get(&command.to_ascii_uppercase())
    }

    /// Transitions into `Logout` and drains the scheduler, rejecting every
    /// pending/in-flight request with `NoConnection` (§7 terminal errors).
    pub fn close(&mut self) {
        self.state = ConnectionState::Logout;
        self.mailbox = None;
        self.scheduler.reject_all_with_no_connection();
        self.lock_queue.reject_all();
    }

    pub fn enqueue(&mut self, request: PendingRequest) {
        self.scheduler.enqueue(request);
    }

    /// Builds the attribute vector for an `ENABLE` command from the
    /// caller's opted-in extensions and what the server actually
    /// advertises (best-effort per §4.11).
    pub fn enable_attributes(&self) -> Vec<Node> {
        let mut attrs = Vec::new();
        if self.options.enable_condstore && self.capabilities.has("CONDSTORE") {
            attrs.push(Node::atom("CONDSTORE"));
        }
        if self.options.enable_utf8_accept && self.capabilities.has("UTF8=ACCEPT") {
            attrs.push(Node::atom("UTF8=ACCEPT"));
        }
        if self.options.enable_qresync && self.capabilities.has("QRESYNC") {
            attrs.push(Node::atom("QRESYNC"));
        }
        attrs
    }

    pub fn utf8_accept_enabled(&self) -> bool {
        self.enabled.contains("UTF8=ACCEPT")
    }

    pub fn compression_active(&self) -> bool {
        self.compressor.is_some()
    }

    fn install_compression(&mut self) {
        self.compressor = Some(Compressor::new());
        self.decompressor = Some(Decompressor::new());
    }

    /// Passes outgoing bytes through the deflate compressor once
    /// `COMPRESS=DEFLATE` is active (§4.11, §6); a no-op otherwise.
    pub fn encode_outgoing(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        match &mut self.compressor {
            Some(c) => c
                .flush_chunk(bytes)
                .map_err(|e| Error::ProtocolViolation(e.to_string())),
            None => Ok(bytes.to_vec()),
        }
    }

    /// Inflates incoming bytes once `COMPRESS=DEFLATE` is active; a no-op
    /// otherwise.
    pub fn decode_incoming(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        match &mut self.decompressor {
            Some(d) => d
                .push(bytes)
                .map_err(|e| Error::ProtocolViolation(e.to_string())),
            None => Ok(bytes.to_vec()),
        }
    }
}

/// Drives the handshake of §4.11: dial, greeting, capabilities, an
/// optional `STARTTLS` upgrade, authentication, a second capability round
/// (the server must discard whatever it advertised before `STARTTLS`),
/// an optional `COMPRESS=DEFLATE`, and `ENABLE`. Returns the connection
/// plus the now fully negotiated socket; the caller owns the event loop
/// that reads/writes it afterward (see the [`ops`](crate::ops) module doc
/// comment).
pub async fn connect(
    options: ConnectOptions,
    dialer: &dyn Dialer,
    tls: &dyn TlsWrapper,
    creds: Option<&Credentials>,
) -> Result<(Connection, BoxedStream)> {
    let mut conn = Connection::new(options.clone());

    let mut stream = timeout(options.connect_timeout, dialer.connect(&options.host, options.port))
        .await
        .map_err(|_| Error::ConnectTimeout)??;

    if options.tls_policy == StartTlsPolicy::ImplicitTls {
        let tls_options = tls_options_for(&options);
        timeout(options.upgrade_timeout, swap_tls(&mut stream, tls, &tls_options))
            .await
            .map_err(|_| Error::UpgradeTimeout)??;
    }

    let mut framer = Framer::new();
    read_greeting(&mut conn, &mut stream, &mut framer, options.greeting_timeout).await?;

    if conn.capabilities.is_empty() {
        request_capabilities(&mut conn, &mut stream, &mut framer).await?;
    }

    maybe_start_tls(&mut conn, &mut stream, &mut framer, tls, &options).await?;

    if conn.state == ConnectionState::NotAuthenticated {
        let creds = creds.ok_or_else(|| Error::AuthenticationFailure {
            reason: "no credentials supplied".to_string(),
        })?;
        authenticate(&mut conn, &mut stream, &mut framer, creds).await?;
        request_capabilities(&mut conn, &mut stream, &mut framer).await?;
    }

    if options.enable_compress && conn.capabilities.has("COMPRESS=DEFLATE") {
        maybe_compress(&mut conn, &mut stream, &mut framer).await?;
    }

    let enable_attrs = conn.enable_attributes();
    if !enable_attrs.is_empty() {
        enable_extensions(&mut conn, &mut stream, &mut framer, enable_attrs).await?;
    }

    conn.refresh_literal_support();
    Ok((conn, stream))
}

fn tls_options_for(options: &ConnectOptions) -> TlsOptions {
    TlsOptions {
        servername: options.servername.clone().unwrap_or_else(|| options.host.clone()),
        verify: true,
        min_version: TlsVersion::Tls12,
    }
}

/// Swaps `*stream` for its TLS-wrapped equivalent. The placeholder
/// written in between is never read from; `tls.wrap` takes ownership of
/// the real stream before this function returns it.
async fn swap_tls(stream: &mut BoxedStream, tls: &dyn TlsWrapper, options: &TlsOptions) -> Result<()> {
    let taken = std::mem::replace(stream, Box::new(tokio::io::duplex(1).0));
    *stream = tls.wrap(taken, options).await?;
    Ok(())
}

async fn write_all(conn: &mut Connection, stream: &mut BoxedStream, bytes: &[u8]) -> Result<()> {
    let encoded = conn.encode_outgoing(bytes)?;
    stream
        .write_all(&encoded)
        .await
        .map_err(|e| Error::ProtocolViolation(e.to_string()))?;
    stream.flush().await.map_err(|e| Error::ProtocolViolation(e.to_string()))
}

/// Reads exactly one response, pulling fresh socket bytes into the framer
/// as needed. A unit that fails to parse is silently dropped (§4.2); the
/// loop just keeps reading.
async fn read_response(conn: &mut Connection, stream: &mut BoxedStream, framer: &mut Framer) -> Result<Response> {
    loop {
        match framer.next_unit() {
            Ok(Some(unit)) => {
                framer.ack();
                if let Some(response) = crate::parser::parse_or_log(&unit) {
                    return Ok(response);
                }
            }
            Ok(None) => {
                let mut buf = [0u8; 4096];
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| Error::ProtocolViolation(e.to_string()))?;
                if n == 0 {
                    return Err(Error::ProtocolViolation("connection closed by server".to_string()));
                }
                let decoded = conn.decode_incoming(&buf[..n])?;
                framer.enqueue_bytes(&decoded);
            }
            Err(err) => return Err(Error::ProtocolViolation(err.to_string())),
        }
    }
}

/// Folds capability/enable information out of one untagged (or the final
/// tagged) response: a bare `* CAPABILITY ...`/`* ENABLE ...` line, or a
/// `[CAPABILITY ...]` response code attached to a greeting/tagged `OK`.
fn observe_untagged(conn: &mut Connection, response: &Response) {
    for attr in &response.attributes {
        if let Node::Section { children, .. } = attr {
            if let Some(tag) = children.first().and_then(Node::as_atom) {
                if tag.eq_ignore_ascii_case("CAPABILITY") {
                    let tokens: Vec<&str> = children[1..].iter().filter_map(Node::as_atom).collect();
                    conn.capabilities.fold_all(tokens);
                }
            }
        }
    }
    if response.command.eq_ignore_ascii_case("CAPABILITY") {
        let tokens: Vec<&str> = response.attributes.iter().filter_map(Node::as_atom).collect();
        conn.capabilities.fold_all(tokens);
    }
    if response.command.eq_ignore_ascii_case("ENABLE") {
        for attr in &response.attributes {
            if let Some(name) = attr.as_atom() {
                conn.enabled.insert(name.to_ascii_uppercase());
            }
        }
    }
}

async fn read_greeting(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    greeting_timeout: Duration,
) -> Result<()> {
    let response = timeout(greeting_timeout, read_response(conn, stream, framer))
        .await
        .map_err(|_| Error::GreetingTimeout)??;
    observe_untagged(conn, &response);
    match response.command.to_ascii_uppercase().as_str() {
        "OK" => {
            conn.state = ConnectionState::NotAuthenticated;
            Ok(())
        }
        "PREAUTH" => {
            conn.state = ConnectionState::Authenticated;
            Ok(())
        }
        "BYE" => Err(Error::ProtocolViolation(response.text())),
        other => Err(Error::InvalidResponse(format!("unexpected greeting {other:?}"))),
    }
}

/// Writes `request`'s compiled fragments, pausing for a `+` continuation
/// before any synchronizing literal (§4.3, §4.9). `on_continuation` lets
/// SASL-style exchanges answer a continuation with their own payload
/// instead of the next stashed literal.
async fn send_request(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    request: &Request,
    mut on_continuation: impl FnMut(&Response) -> Option<Vec<u8>>,
) -> Result<()> {
    let mut fragments = compile(request, conn.literal_support);
    while let Some(fragment) = fragments.pop_front() {
        match fragment {
            Fragment::Line(bytes) => write_all(conn, stream, &bytes).await?,
            Fragment::Literal { data, sync } => {
                if sync {
                    loop {
                        let response = read_response(conn, stream, framer).await?;
                        if response.tag == ResponseTag::Continuation {
                            if let Some(bytes) = on_continuation(&response) {
                                write_all(conn, stream, &bytes).await?;
                            }
                            break;
                        }
                        if response.tag == ResponseTag::Untagged {
                            observe_untagged(conn, &response);
                        }
                    }
                }
                write_all(conn, stream, &data).await?;
            }
        }
    }
    Ok(())
}

/// Reads responses until `tag`'s terminator arrives, folding untagged
/// capability/enable traffic along the way and classifying the result
/// exactly as the live dispatcher would (§4.10).
async fn await_tag(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    tag: &str,
    executed_command: &str,
) -> Result<Response> {
    loop {
        let response = read_response(conn, stream, framer).await?;
        match &response.tag {
            ResponseTag::Untagged => observe_untagged(conn, &response),
            ResponseTag::Continuation => {}
            ResponseTag::Tagged(t) if t.as_ref() == tag => {
                observe_untagged(conn, &response);
                let is_bye = response.command.eq_ignore_ascii_case("BYE");
                let outcome = crate::dispatch::classify_tagged(&response, executed_command);
                if is_bye {
                    conn.state = ConnectionState::Logout;
                }
                return outcome;
            }
            ResponseTag::Tagged(_) => continue,
        }
    }
}

async fn run_simple_command(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    command: &str,
    attributes: Vec<Node>,
) -> Result<Response> {
    let tag = conn.next_tag();
    let request = Request {
        tag: tag.clone(),
        command: command.to_string(),
        attributes,
    };
    send_request(conn, stream, framer, &request, |_| None).await?;
    await_tag(conn, stream, framer, &tag, command).await
}

async fn request_capabilities(conn: &mut Connection, stream: &mut BoxedStream, framer: &mut Framer) -> Result<()> {
    run_simple_command(conn, stream, framer, "CAPABILITY", vec![]).await?;
    conn.refresh_literal_support();
    Ok(())
}

async fn maybe_start_tls(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    tls: &dyn TlsWrapper,
    options: &ConnectOptions,
) -> Result<()> {
    if matches!(options.tls_policy, StartTlsPolicy::ImplicitTls | StartTlsPolicy::Disabled) {
        return Ok(());
    }
    let available = conn.capabilities.has("STARTTLS");
    if !available {
        return match options.tls_policy {
            StartTlsPolicy::Required => Err(Error::TlsFailure("server does not advertise STARTTLS".to_string())),
            _ => Ok(()),
        };
    }

    run_simple_command(conn, stream, framer, "STARTTLS", vec![]).await?;
    let tls_options = tls_options_for(options);
    timeout(options.upgrade_timeout, swap_tls(stream, tls, &tls_options))
        .await
        .map_err(|_| Error::UpgradeTimeout)??;
    // The server must discard whatever it advertised pre-TLS (§4.11).
    *framer = Framer::new();
    conn.capabilities.clear();
    request_capabilities(conn, stream, framer).await
}

fn login_failure(err: Error) -> Error {
    match err {
        Error::CommandFailed { text, .. } => Error::AuthenticationFailure { reason: text },
        other => other,
    }
}

async fn authenticate(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    creds: &Credentials,
) -> Result<()> {
    let advertised = conn.capabilities.auth_mechanisms();
    match Mechanism::negotiate(&advertised, creds) {
        Some(mechanism) => authenticate_sasl(conn, stream, framer, mechanism, creds).await,
        None if conn.capabilities.has("LOGINDISABLED") => Err(Error::AuthenticationFailure {
            reason: "LOGINDISABLED and no usable SASL mechanism advertised".to_string(),
        }),
        None => login_command(conn, stream, framer, creds).await,
    }
}

async fn login_command(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    creds: &Credentials,
) -> Result<()> {
    let password = creds.password.as_deref().ok_or_else(|| Error::AuthenticationFailure {
        reason: "LOGIN requires a password".to_string(),
    })?;
    let attrs = vec![Node::quoted(creds.username.clone()), Node::sensitive(password.to_string())];
    run_simple_command(conn, stream, framer, "LOGIN", attrs)
        .await
        .map_err(login_failure)?;
    conn.state = ConnectionState::Authenticated;
    Ok(())
}

async fn authenticate_sasl(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    mechanism: Mechanism,
    creds: &Credentials,
) -> Result<()> {
    let tag = conn.next_tag();
    let mut attrs = vec![Node::atom(mechanism.name())];
    if let Some(initial) = crate::auth::initial_response(mechanism, creds) {
        attrs.push(Node::sensitive(initial));
    }
    let request = Request {
        tag: tag.clone(),
        command: "AUTHENTICATE".to_string(),
        attributes: attrs,
    };
    send_request(conn, stream, framer, &request, |_| None).await?;

    let mut login_challenge = (mechanism == Mechanism::Login)
        .then(|| LoginChallenge::new(creds))
        .flatten();

    loop {
        let response = read_response(conn, stream, framer).await?;
        match &response.tag {
            ResponseTag::Untagged => observe_untagged(conn, &response),
            ResponseTag::Continuation => {
                let payload = match &mut login_challenge {
                    Some(challenge) if !challenge.is_done() => challenge.respond(),
                    _ => crate::auth::error_acknowledgement().to_string(),
                };
                let mut line = payload.into_bytes();
                line.extend_from_slice(b"\r\n");
                write_all(conn, stream, &line).await?;
            }
            ResponseTag::Tagged(t) if t.as_ref() == tag => {
                observe_untagged(conn, &response);
                let executed = format!("{tag} AUTHENTICATE {}", mechanism.name());
                let is_bye = response.command.eq_ignore_ascii_case("BYE");
                let outcome = crate::dispatch::classify_tagged(&response, &executed);
                if is_bye {
                    conn.state = ConnectionState::Logout;
                }
                return match outcome {
                    Ok(_) => {
                        conn.state = ConnectionState::Authenticated;
                        Ok(())
                    }
                    Err(err) => Err(login_failure(err)),
                };
            }
            ResponseTag::Tagged(_) => continue,
        }
    }
}

async fn maybe_compress(conn: &mut Connection, stream: &mut BoxedStream, framer: &mut Framer) -> Result<()> {
    run_simple_command(conn, stream, framer, "COMPRESS", vec![Node::atom("DEFLATE")]).await?;
    conn.install_compression();
    Ok(())
}

async fn enable_extensions(
    conn: &mut Connection,
    stream: &mut BoxedStream,
    framer: &mut Framer,
    attrs: Vec<Node>,
) -> Result<()> {
    run_simple_command(conn, stream, framer, "ENABLE", attrs).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_monotonic_uppercase_hex() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        assert_eq!(conn.next_tag(), "A1");
        assert_eq!(conn.next_tag(), "A2");
        for _ in 0..14 {
            conn.next_tag();
        }
        assert_eq!(conn.next_tag(), "A11");
    }

    #[test]
    fn literal_support_prefers_plus_over_minus() {
        let mut caps = CapabilitySet::new();
        caps.fold_all(["LITERAL+", "LITERAL-"]);
        assert_eq!(LiteralSupport::from_capabilities(&caps), LiteralSupport::LiteralPlus);
    }

    #[test]
    fn close_transitions_to_logout_and_drops_mailbox() {
        let mut conn = Connection::new(ConnectOptions::new("example.com", 993));
        conn.mailbox = Some(Mailbox::new("INBOX"));
        conn.close();
        assert_eq!(conn.state, ConnectionState::Logout);
        assert!(conn.mailbox.is_none());
    }
}
