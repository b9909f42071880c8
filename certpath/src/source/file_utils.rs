//! The file_utils module contains utility functions related to interactions with the filesystem
//! and to unpacking certificate bundles.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use const_oid::db::rfc5911::ID_SIGNED_DATA;
use der::Decode;
use log::{error, info};
use walkdir::WalkDir;
use x509_cert::crl::CertificateList;

use crate::util::error::*;
use crate::util::pdv_utilities::valid_at_time;
use crate::validator::pdv_certificate::*;

/// File extensions processed when harvesting certificates from a folder
pub const CERT_FILE_EXTENSIONS: &[&str] = &["der", "crt", "cer", "p7c", "p7b"];

/// File extensions processed when harvesting CRLs from a folder
pub const CRL_FILE_EXTENSIONS: &[&str] = &["crl"];

/// `get_file_as_byte_vec` takes a Path containing a file name and returns a vector of bytes
/// containing the contents of that file or an [Error::StdIoError].
pub fn get_file_as_byte_vec(filename: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(filename)?)
}

/// `get_file_as_byte_vec_pem` reads a file and, if the contents are PEM encoded, decodes them
/// prior to returning the vector of bytes.
pub fn get_file_as_byte_vec_pem(filename: &Path) -> Result<Vec<u8>> {
    let b = get_file_as_byte_vec(filename)?;
    if b.first() == Some(&0x2D) {
        return match pem_rfc7468::decode_vec(b.as_slice()) {
            Ok((_label, der)) => Ok(der),
            Err(e) => {
                error!("Failed to parse PEM data from {:?}: {:?}", filename, e);
                Err(Error::ParseError)
            }
        };
    }
    Ok(b)
}

/// `certs_from_bytes` parses a buffer containing either a single DER encoded certificate or a
/// PKCS #7 certs-only SignedData bundle. The locator is saved as metadata on each certificate.
pub fn certs_from_bytes(bytes: &[u8], locator: &str) -> Result<Vec<PDVCertificate>> {
    if let Ok(mut cert) = PDVCertificate::try_from(bytes) {
        let mut md = Asn1Metadata::new();
        md.insert(
            MD_LOCATOR.to_string(),
            Asn1MetadataTypes::String(locator.to_string()),
        );
        cert.metadata = Some(md);
        return Ok(vec![cert]);
    }

    let ci = match ContentInfo::from_der(bytes) {
        Ok(ci) => ci,
        Err(e) => {
            error!(
                "Failed to parse {} as a certificate or PKCS #7 bundle: {}",
                locator, e
            );
            return Err(Error::ParseError);
        }
    };
    if ci.content_type != ID_SIGNED_DATA {
        error!(
            "Unexpected content type {} in PKCS #7 bundle from {}",
            ci.content_type, locator
        );
        return Err(Error::ParseError);
    }
    let sd = ci.content.decode_as::<SignedData>()?;
    let mut certs = vec![];
    if let Some(cert_set) = sd.certificates {
        for choice in cert_set.0.iter() {
            if let CertificateChoices::Certificate(c) = choice {
                match PDVCertificate::try_from(c.clone()) {
                    Ok(mut cert) => {
                        let mut md = Asn1Metadata::new();
                        md.insert(
                            MD_LOCATOR.to_string(),
                            Asn1MetadataTypes::String(locator.to_string()),
                        );
                        cert.metadata = Some(md);
                        certs.push(cert);
                    }
                    Err(e) => error!("Failed to re-encode certificate from {}: {}", locator, e),
                }
            }
        }
    }
    Ok(certs)
}

/// `crl_from_bytes` parses a buffer containing a DER encoded CRL.
pub fn crl_from_bytes(bytes: &[u8], locator: &str) -> Result<CertificateList> {
    match CertificateList::from_der(bytes) {
        Ok(crl) => Ok(crl),
        Err(e) => {
            error!("Failed to parse CRL from {}: {}", locator, e);
            Err(Error::ParseError)
        }
    }
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) => exts.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// `cert_folder_to_vec` recursively traverses a folder collecting certificates from files with
/// .der, .crt, .cer, .p7c or .p7b extensions. Certificates that are not valid at the time of
/// interest are ignored. Pass 0 for `time_of_interest` to skip the validity check.
pub fn cert_folder_to_vec(certs_dir: &str, time_of_interest: u64) -> Result<Vec<PDVCertificate>> {
    if !Path::is_dir(Path::new(certs_dir)) {
        error!("{} does not exist or is not a directory", certs_dir);
        return Err(Error::NotFound);
    }

    let mut certs: Vec<PDVCertificate> = vec![];
    for entry in WalkDir::new(certs_dir) {
        let e = match entry {
            Ok(e) => e,
            Err(e) => {
                error!("Failed to read entry beneath {}: {}", certs_dir, e);
                continue;
            }
        };
        let path = e.path();
        if e.file_type().is_dir() || !has_extension(path, CERT_FILE_EXTENSIONS) {
            continue;
        }
        let buffer = match get_file_as_byte_vec_pem(path) {
            Ok(b) => b,
            Err(_) => continue,
        };
        let locator = path.to_str().unwrap_or("");
        let parsed = match certs_from_bytes(&buffer, locator) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        for cert in parsed {
            if valid_at_time(&cert.decoded_cert.tbs_certificate, time_of_interest, true).is_err() {
                info!(
                    "Ignored certificate from {} as not valid at indicated time of interest",
                    locator
                );
                continue;
            }
            if !certs.contains(&cert) {
                certs.push(cert);
            }
        }
    }
    Ok(certs)
}

/// `crl_folder_to_vec` recursively traverses a folder collecting CRLs from files with a .crl
/// extension.
pub fn crl_folder_to_vec(crls_dir: &str) -> Result<Vec<CertificateList>> {
    if !Path::is_dir(Path::new(crls_dir)) {
        error!("{} does not exist or is not a directory", crls_dir);
        return Err(Error::NotFound);
    }

    let mut crls = vec![];
    for entry in WalkDir::new(crls_dir).into_iter().flatten() {
        let path = entry.path();
        if entry.file_type().is_dir() || !has_extension(path, CRL_FILE_EXTENSIONS) {
            continue;
        }
        if let Ok(buffer) = get_file_as_byte_vec_pem(path) {
            if let Ok(crl) = crl_from_bytes(&buffer, path.to_str().unwrap_or("")) {
                crls.push(crl);
            }
        }
    }
    Ok(crls)
}
