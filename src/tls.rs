// src/tls.rs

//! Builds the mutually-authenticated `rustls::ServerConfig`/`ClientConfig`
//! pair the agent port requires: certificate/key loading from PEM files, a
//! `WebPkiClientVerifier` built over a private cluster CA rather than the
//! public Web PKI root set, and a client side that presents its own identity
//! certificate so the server's verifier accepts it.

use anyhow::{Context, Result, anyhow};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Where to find the cluster CA and this endpoint's own identity
/// certificate/key. The same three paths configure both the control
/// service's server-side acceptor and the agent's client-side connector,
/// since every peer on the agent port presents a certificate signed by the
/// same cluster CA.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub ca_path: String,
    pub cert_path: String,
    pub key_path: String,
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("failed to open certificate file '{path}'"))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates from '{path}'"))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in '{path}'"));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("failed to open private key file '{path}'"))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("failed to parse private key from '{path}'"))?
        .ok_or_else(|| anyhow!("no private key found in '{path}'"))
}

fn load_root_store(ca_path: &str) -> Result<RootCertStore> {
    let ca_certs = load_certs(ca_path)?;
    let mut store = RootCertStore::empty();
    let (added, rejected) = store.add_parsable_certificates(ca_certs);
    if added == 0 {
        return Err(anyhow!("no usable CA certificates in '{ca_path}'"));
    }
    if rejected > 0 {
        tracing::warn!("{rejected} certificate(s) in '{ca_path}' could not be parsed");
    }
    Ok(store)
}

/// Builds the control service's agent-facing `TlsAcceptor`: requires every
/// connecting agent to present a certificate signed by the cluster CA
/// (mutual authentication), and presents the control service's own identity
/// certificate in return.
pub fn server_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor> {
    let root_store = load_root_store(&material.ca_path)?;
    let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store))
        .build()
        .context("failed to build client certificate verifier")?;

    let certs = load_certs(&material.cert_path)?;
    let key = load_key(&material.key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)
        .context("failed to build server TLS config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds an agent's `TlsConnector` for dialing the control service: verifies
/// the control service's certificate against the cluster CA and presents the
/// agent's own identity certificate in return, so the control service's
/// `WebPkiClientVerifier` accepts it.
pub fn client_connector(material: &TlsMaterial) -> Result<TlsConnector> {
    let root_store = load_root_store(&material.ca_path)?;
    let certs = load_certs(&material.cert_path)?;
    let key = load_key(&material.key_path)?;

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_client_auth_cert(certs, key)
        .context("failed to build client TLS config")?;
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parses `host` into the `ServerName` the control service's certificate's
/// identity is checked against.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string()).map_err(|_| anyhow!("invalid control service host name '{host}'"))
}
