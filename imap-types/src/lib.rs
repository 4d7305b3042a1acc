#![deny(missing_debug_implementations)]

//! Misuse-resistant data structures shared between the wire codec and the
//! session engine of an IMAP4rev1 client.
//!
//! This crate knows nothing about sockets, scheduling, or TLS. It only
//! describes the shapes that flow across that boundary: the generic wire AST
//! produced by the parser, the higher-level mailbox/message/envelope model
//! built on top of it, and the error taxonomy both layers report through.

pub mod body;
pub mod capability;
pub mod core;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod flag;
pub mod mailbox;
pub mod response;
pub mod sequence;
pub mod state;
