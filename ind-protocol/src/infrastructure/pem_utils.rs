//! Reading the CA chains that client configs point at.

use std::{fs::File, io::BufReader, path::Path};

use rustls::Certificate;

use crate::IndError;

/// Every certificate of the PEM file at `path`, in file order. Blocks other
/// than certificates are skipped.
pub fn read_certificates(path: impl AsRef<Path>) -> Result<Vec<Certificate>, IndError> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    Ok(rustls_pemfile::certs(&mut reader)?
        .into_iter()
        .map(Certificate)
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn certificates_are_read_in_order() {
        let path = std::env::temp_dir().join(format!("ind-ca-chain-{}.pem", std::process::id()));
        std::fs::write(
            &path,
            "-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----\n\
             -----BEGIN CERTIFICATE-----\nBAUG\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let certificates = read_certificates(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            certificates,
            vec![Certificate(vec![1, 2, 3]), Certificate(vec![4, 5, 6])]
        );
    }

    #[test]
    fn missing_files_are_io_errors() {
        assert!(matches!(
            read_certificates("/nonexistent/ind-ca-chain.pem"),
            Err(IndError::Io(_))
        ));
    }
}
