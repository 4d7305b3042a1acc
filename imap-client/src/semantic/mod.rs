//! Turns the generic wire [`imap_types::core::Node`] AST into the typed
//! mailbox/message values of §3 (C6, C7).

pub mod body;
pub mod envelope;
pub mod fetch;
