#![deny(missing_debug_implementations)]

//! A single-connection, cooperatively-scheduled IMAP4rev1 client.
//!
//! Three layers, leaves first:
//!
//! - The **wire codec** ([`framer`], [`parser`], [`compiler`]) turns TCP
//!   bytes into a generic [`imap_types::core::Node`] AST and back, with
//!   support for non-synchronizing literals.
//! - The **session engine** ([`scheduler`], [`dispatch`], [`session`],
//!   [`lock`], [`idle`]) owns the connection lifecycle, the tagged-command
//!   queue, and the untagged-response dispatch table.
//! - The **semantic layer** ([`semantic`], [`search`], [`range`],
//!   [`path`], [`download`], [`ops`]) turns the generic AST into typed
//!   mailbox/message values and back.
//!
//! See `SPEC_FULL.md` at the repository root for the full design.

pub mod auth;
pub mod classify;
pub mod compiler;
pub mod compress;
pub mod dispatch;
pub mod download;
pub mod framer;
pub mod idle;
pub mod io;
pub mod lock;
pub mod ops;
pub mod parser;
pub mod path;
pub mod range;
pub mod scheduler;
pub mod search;
pub mod semantic;
pub mod session;

pub use imap_types::error::{Error, Result};
pub use session::{Connection, ConnectOptions};
