//! Server-side TLS for pgwire connections.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsPaths;

/// Build an acceptor from the configured PEM files. Errors name the
/// offending file.
pub fn load_acceptor(paths: &TlsPaths) -> io::Result<TlsAcceptor> {
    let certs = read_certs(&paths.cert)?;
    let key = read_key(&paths.key)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open_pem(path: &Path) -> io::Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn read_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open_pem(path)?).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{}: no certificates found", path.display()),
        ));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open_pem(path)?)?.ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("{}: no private key found", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pem_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("inncontrol_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_is_named() {
        let paths = TlsPaths {
            cert: PathBuf::from("/nonexistent/inncontrol/cert.pem"),
            key: PathBuf::from("/nonexistent/inncontrol/key.pem"),
        };
        let err = load_acceptor(&paths).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn empty_pem_files_are_rejected() {
        let cert = pem_file("empty_cert.pem", "not a certificate\n");
        let err = read_certs(&cert).unwrap_err();
        assert!(err.to_string().contains("no certificates found"));

        let key = pem_file("empty_key.pem", "");
        let err = read_key(&key).unwrap_err();
        assert!(err.to_string().contains("no private key found"));
    }
}
