//! TLS client configuration for directory connections
//!
//! A rustls configuration is only built when CA or client certificate
//! material is configured. Otherwise `ldap3` uses its defaults (system
//! roots, optional skipped verification).

use dirauth_core::{Error, Result, TlsOptions};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use rustls_pemfile::Item;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Build the client configuration for `tls`, or `None` when the adapter
/// defaults apply.
pub fn client_config(tls: &TlsOptions) -> Result<Option<Arc<ClientConfig>>> {
    tls.validate()?;
    if !tls.has_custom_material() {
        return Ok(None);
    }
    if tls.skip_verify {
        warn!("Certificate verification is disabled, ignoring configured CA material");
        return Ok(None);
    }

    let roots = if tls.has_ca_material() {
        custom_roots(tls)?
    } else {
        native_roots()?
    };
    info!("Loaded {} trusted root certificate(s)", roots.len());

    let builder = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots);

    let config = match (&tls.client_cert_path, &tls.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            debug!("Presenting client certificate from {:?}", cert_path);
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| Error::InvalidConfig(format!("Client certificate rejected: {}", e)))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Some(Arc::new(config)))
}

fn custom_roots(tls: &TlsOptions) -> Result<RootCertStore> {
    let mut certs = Vec::new();
    if let Some(path) = &tls.ca_cert_path {
        certs.extend(load_certs(path)?);
    }
    if let Some(pem) = &tls.ca_cert_pem {
        certs.extend(parse_certs(&mut pem.as_bytes(), "inline CA material")?);
    }

    let mut roots = RootCertStore::empty();
    for cert in &certs {
        roots
            .add(cert)
            .map_err(|e| Error::InvalidConfig(format!("Failed to add CA certificate: {}", e)))?;
    }
    Ok(roots)
}

fn native_roots() -> Result<RootCertStore> {
    let certs = rustls_native_certs::load_native_certs().map_err(|e| {
        Error::InvalidConfig(format!("Failed to load system root certificates: {}", e))
    })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(&certs);
    if ignored > 0 {
        debug!("Skipped {} unparsable system root certificate(s)", ignored);
    }
    if added == 0 {
        return Err(Error::InvalidConfig(
            "No usable system root certificates".to_string(),
        ));
    }
    Ok(roots)
}

/// Load certificates from PEM file
fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let file = File::open(path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to open certificate file {:?}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);
    parse_certs(&mut reader, &format!("{:?}", path))
}

fn parse_certs(reader: &mut dyn BufRead, source: &str) -> Result<Vec<Certificate>> {
    let certs = rustls_pemfile::certs(reader).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse certificates in {}: {}", source, e))
    })?;

    if certs.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "No certificates found in {}",
            source
        )));
    }

    Ok(certs.into_iter().map(Certificate).collect())
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from PEM file
fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let file = File::open(path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to open key file {:?}: {}", path, e))
    })?;
    let mut reader = BufReader::new(file);

    loop {
        let item = rustls_pemfile::read_one(&mut reader).map_err(|e| {
            Error::InvalidConfig(format!("Failed to parse key file {:?}: {}", path, e))
        })?;
        match item {
            Some(Item::PKCS8Key(key)) | Some(Item::RSAKey(key)) | Some(Item::ECKey(key)) => {
                return Ok(PrivateKey(key))
            }
            Some(_) => continue,
            None => break,
        }
    }

    Err(Error::InvalidConfig(format!(
        "No private key found in {:?}",
        path
    )))
}
