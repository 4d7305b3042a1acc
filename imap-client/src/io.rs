//! Transport collaborator traits (§6): TCP dialer, TLS wrapper, and proxy
//! dialer. The core depends only on these contracts; concrete
//! implementations are wired up by the embedding application.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream: anything satisfying both halves of `tokio::io`'s
/// async I/O traits, `Unpin` so it can live behind a trait object, `Send`
/// so the connection can move across an executor's tasks.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub servername: String,
    pub verify: bool,
    pub min_version: TlsVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// `connect(host, port) -> byte-duplex stream` (§6).
pub trait Dialer: Send + Sync {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, imap_types::error::Result<BoxedStream>>;
}

/// `wrap(stream, options) -> byte-duplex stream` (§6). The production
/// implementation wraps [`tokio_rustls::TlsConnector`]; tests can supply a
/// pass-through fake.
pub trait TlsWrapper: Send + Sync {
    fn wrap<'a>(
        &'a self,
        stream: BoxedStream,
        options: &'a TlsOptions,
    ) -> BoxFuture<'a, imap_types::error::Result<BoxedStream>>;
}

/// `dial(url, host, port) -> byte-duplex stream` for HTTP-CONNECT and
/// SOCKS proxies (§6). Out of scope for this crate's own implementation;
/// only the contract is defined here.
pub trait ProxyDialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        proxy_url: &'a str,
        host: &'a str,
        port: u16,
    ) -> BoxFuture<'a, imap_types::error::Result<BoxedStream>>;
}

/// Builds a `rustls` client config trusting the platform's native
/// certificate store, mirroring how most long-lived IMAP/SMTP clients in
/// this ecosystem configure TLS when no custom CA is supplied.
pub fn native_roots_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    if let Ok(native) = rustls_native_certs::load_native_certs() {
        for cert in native {
            let _ = roots.add(&rustls::Certificate(cert.0));
        }
    }
    if roots.is_empty() {
        roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
    }
    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth()
}
