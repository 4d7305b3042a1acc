//! Starts the chunked partial-FETCH download pipeline (§4.14) for one or
//! many messages, issuing the first `UID FETCH BODY.PEEK[<part><range>]`
//! probe and handing back the [`Download`] state machine the caller pumps
//! with further `fetch()` calls as each chunk arrives.

use imap_types::error::Result;
use imap_types::response::Response;
use imap_types::state::ConnectionState;
use tokio::sync::oneshot;

use crate::download::{Download, DownloadOptions};
use crate::ops::fetch::{fetch, FetchItems};
use crate::range::resolve_from_search;
use crate::session::Connection;

use super::require_state;

fn probe_section(part: &str, start: u64, length: u64) -> String {
    format!("{part}<{start}.{length}>")
}

/// Starts a download for `uid`, enqueuing the first chunk's `UID FETCH`.
pub fn download(
    conn: &mut Connection,
    uid: u32,
    options: DownloadOptions,
) -> Result<(Download, oneshot::Receiver<Result<Response>>)> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    let mut state = Download::new(options);
    state.observe_uid(uid);
    let (start, length) = state.next_range();
    let range = resolve_from_search([uid].into_iter().collect());
    let items = FetchItems {
        sections: vec![probe_section(&state.options.part, start, length)],
        peek: true,
        ..Default::default()
    };
    let rx = fetch(conn, &range, &items, None)?;
    Ok((state, rx))
}

/// Starts one independent download pipeline per UID in `uids`. Each
/// message's `UID FETCH` is enqueued up front; they drain through the
/// scheduler's single in-flight slot in the order given.
pub fn download_many(
    conn: &mut Connection,
    uids: &[u32],
    options: DownloadOptions,
) -> Result<Vec<(Download, oneshot::Receiver<Result<Response>>)>> {
    require_state(conn.state, &[ConnectionState::Selected])?;
    uids.iter()
        .map(|&uid| download(conn, uid, options.clone()))
        .collect()
}
