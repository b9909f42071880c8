//! Builds and optionally checks the status of a certification path as directed by command line
//! arguments.

use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};

use certpath::*;

use crate::args::*;

/// Applies command line overrides to settings read from the optional settings file.
pub(crate) fn prepare_settings(args: &PathfinderArgs) -> Result<PathSettings> {
    let mut ps = read_settings(&args.settings)?;

    if let Some(toi) = args.time_of_interest {
        ps.set_time_of_interest(toi);
    } else if ps.0.get(PS_TIME_OF_INTEREST).is_none() {
        ps.set_time_of_interest(get_now_as_unix_epoch());
    }
    if let Some(mpl) = args.max_path_length {
        ps.set_max_path_length(mpl);
    }
    if args.follow_aia {
        ps.set_follow_aia(true);
    }
    if let Some(allowed) = &args.allowed_aia_locations {
        ps.set_allowed_aia_locations(allowed.clone());
    }
    if args.check_ocsp {
        ps.set_check_ocsp_from_aia(true);
    }
    if let Some(ta_folder) = &args.ta_folder {
        ps.set_trust_anchor_folder(ta_folder.clone());
    }
    if let Some(ca_folder) = &args.ca_folder {
        ps.set_certification_authority_folder(ca_folder.clone());
    }
    Ok(ps)
}

fn load_trust_anchors(ps: &PathSettings) -> Result<Vec<TrustAnchor>> {
    let ta_folder = match ps.get_trust_anchor_folder() {
        Some(f) => f,
        None => {
            error!("A trust anchor folder must be provided via the command line or settings file");
            return Err(Error::Misconfiguration);
        }
    };
    if !Path::new(&ta_folder).is_dir() {
        error!("Trust anchor folder {} does not exist", ta_folder);
        return Err(Error::Misconfiguration);
    }

    let mut ta_source = TaSource::new();
    let count = ta_source.add_folder(&ta_folder, ps.get_time_of_interest())?;
    info!("Loaded {} trust anchors from {}", count, ta_folder);
    Ok(ta_source.into_trust_anchors())
}

fn load_target(args: &PathfinderArgs) -> Result<PDVCertificate> {
    let ee_file = match &args.end_entity_file {
        Some(f) => f,
        None => {
            error!("An end entity certificate file must be provided");
            return Err(Error::Misconfiguration);
        }
    };
    let buffer = get_file_as_byte_vec_pem(Path::new(ee_file))?;
    parse_cert(&buffer, ee_file)
}

#[cfg(feature = "remote")]
fn configure_aia_fetching(pe: &mut PkiEnvironment, ps: &PathSettings) -> Result<()> {
    if !ps.get_follow_aia() {
        return Ok(());
    }
    let filter = match ps.get_allowed_aia_locations() {
        Some(allowed) => AiaLocationFilter::parse(&allowed),
        None => AiaLocationFilter::from_env(),
    };
    let fetcher = HttpFetcher::with_timeouts(
        ps.get_remote_timeouts(RemoteKind::Cert),
        ps.get_remote_timeouts(RemoteKind::Crl),
    )?;
    pe.set_uri_store_cache(Arc::new(
        UriStoreCache::new(Arc::new(fetcher)).with_filter(filter),
    ));
    Ok(())
}

#[cfg(feature = "remote")]
fn check_target_status(
    pe: &PkiEnvironment,
    ps: &PathSettings,
    path: &CertificationPath,
) -> Result<()> {
    let transport = HttpOcspTransport::with_timeouts(ps.get_remote_timeouts(RemoteKind::Ocsp))?;
    let target = &path.certificates[0];
    let issuer: OcspIssuer<'_> = match path.certificates.get(1) {
        Some(ca) => ca.into(),
        None => (&path.trust_anchor).into(),
    };
    let status = check_revocation_ocsp(pe, ps, &transport, target, issuer);
    println!("Revocation status: {}", status);
    match status {
        PathValidationStatus::CertificateRevoked => Err(Error::PathValidation(status)),
        _ => Ok(()),
    }
}

fn print_path(path: &CertificationPath) {
    println!("Certification path:");
    for (i, cert) in path.certificates.iter().enumerate() {
        println!("  [{}] {}", i, name_to_string(cert.subject()));
    }
    println!("  Trust anchor: {}", path.trust_anchor.describe());
}

/// Builds a certification path for the end entity certificate named in `args`, prints it and, when
/// requested, determines the revocation status of the end entity certificate using OCSP.
pub fn run(args: &PathfinderArgs) -> Result<()> {
    let ps = prepare_settings(args)?;
    let trust_anchors = load_trust_anchors(&ps)?;
    let target = load_target(args)?;

    let mut pe = PkiEnvironment::default();
    populate_5280_pki_environment(&mut pe);
    pe.set_algorithm_constraints(algorithm_constraints_from_settings(&ps)?);

    #[cfg(feature = "remote")]
    configure_aia_fetching(&mut pe, &ps)?;

    let mut params = BuilderParams::for_target(ps.clone(), &target, trust_anchors)?;
    if let Some(ca_folder) = ps.get_certification_authority_folder() {
        let mut store = CollectionCertStore::new();
        let count = store.add_folder(&ca_folder, ps.get_time_of_interest())?;
        info!("Loaded {} CA certificates from {}", count, ca_folder);
        params.add_store(Arc::new(store));
    }

    let result = build_path(&pe, &params)?;
    print_path(&result.path);
    debug!(
        "Valid policies for path: {:?}",
        result.validation.valid_policies
    );

    #[cfg(feature = "remote")]
    if ps.get_check_ocsp_from_aia() {
        check_target_status(&pe, &ps, &result.path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_settings() {
        let args = PathfinderArgs {
            ta_folder: Some("tas".to_string()),
            time_of_interest: Some(1798761600),
            max_path_length: Some(2),
            follow_aia: true,
            allowed_aia_locations: Some("http://ca.example.com/".to_string()),
            ..Default::default()
        };
        let ps = prepare_settings(&args).unwrap();
        assert_eq!(1798761600, ps.get_time_of_interest());
        assert_eq!(2, ps.get_max_path_length());
        assert!(ps.get_follow_aia());
        assert!(!ps.get_check_ocsp_from_aia());
        assert_eq!(Some("tas".to_string()), ps.get_trust_anchor_folder());
        assert_eq!(None, ps.get_certification_authority_folder());
        assert_eq!(
            Some("http://ca.example.com/".to_string()),
            ps.get_allowed_aia_locations()
        );
    }

    #[test]
    fn missing_inputs_are_misconfiguration() {
        let ps = prepare_settings(&PathfinderArgs::default()).unwrap();
        assert_eq!(Some(Error::Misconfiguration), load_trust_anchors(&ps).err());
        assert_eq!(
            Some(Error::Misconfiguration),
            load_target(&PathfinderArgs::default()).err()
        );
    }
}
