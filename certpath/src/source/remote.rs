//! Timeout configuration for remote interactions and, with the `remote` feature, reqwest-backed
//! implementations of [`UriFetcher`](crate::UriFetcher) and [`OcspTransport`](crate::OcspTransport).

use std::env;
use std::time::Duration;

use log::error;

/// Default connect and read timeout, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 15000;

/// Category of remote interaction, used to select timeout environment variables
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemoteKind {
    /// OCSP requests
    Ocsp,
    /// CRL retrieval
    Crl,
    /// Certificate retrieval
    Cert,
}

impl RemoteKind {
    fn connect_var(&self) -> &'static str {
        match self {
            RemoteKind::Ocsp => "CERTPATH_OCSP_CONNECT_TIMEOUT",
            RemoteKind::Crl => "CERTPATH_CRL_CONNECT_TIMEOUT",
            RemoteKind::Cert => "CERTPATH_CERT_CONNECT_TIMEOUT",
        }
    }

    fn read_var(&self) -> &'static str {
        match self {
            RemoteKind::Ocsp => "CERTPATH_OCSP_READ_TIMEOUT",
            RemoteKind::Crl => "CERTPATH_CRL_READ_TIMEOUT",
            RemoteKind::Cert => "CERTPATH_CERT_READ_TIMEOUT",
        }
    }
}

/// Connect and read timeouts. `None` means no timeout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemoteTimeouts {
    /// Connect timeout
    pub connect: Option<Duration>,
    /// Read timeout
    pub read: Option<Duration>,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        RemoteTimeouts {
            connect: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            read: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }
}

/// Interprets a timeout in milliseconds where 0 disables the timeout.
pub fn timeout_from_millis(ms: u64) -> Option<Duration> {
    if 0 == ms {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

fn timeout_from_var(var: &str) -> Option<Duration> {
    match env::var(var) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(ms) => timeout_from_millis(ms),
            Err(_) => {
                error!(
                    "Ignoring invalid value {} for {}; using {} ms",
                    v, var, DEFAULT_TIMEOUT_MS
                );
                timeout_from_millis(DEFAULT_TIMEOUT_MS)
            }
        },
        Err(_) => timeout_from_millis(DEFAULT_TIMEOUT_MS),
    }
}

impl RemoteTimeouts {
    /// Reads the timeouts for the kind of interaction from the environment, defaulting each to
    /// 15 seconds.
    pub fn from_env(kind: RemoteKind) -> RemoteTimeouts {
        RemoteTimeouts {
            connect: timeout_from_var(kind.connect_var()),
            read: timeout_from_var(kind.read_var()),
        }
    }
}

#[cfg(feature = "remote")]
pub use reqwest_impl::*;

#[cfg(feature = "remote")]
mod reqwest_impl {
    use log::{debug, error};
    use reqwest::blocking::Client;
    use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
    use reqwest::StatusCode;

    use super::*;
    use crate::environment::pki_environment_traits::*;
    use crate::util::error::*;

    fn build_client(timeouts: &RemoteTimeouts) -> Result<Client> {
        let mut builder = Client::builder().timeout(timeouts.read);
        if let Some(connect) = timeouts.connect {
            builder = builder.connect_timeout(connect);
        }
        match builder.build() {
            Ok(c) => Ok(c),
            Err(e) => {
                error!("Failed to prepare HTTP client: {}", e);
                Err(Error::NetworkError)
            }
        }
    }

    fn read_body(uri: &str, response: reqwest::blocking::Response) -> Result<Vec<u8>> {
        match response.bytes() {
            Ok(b) => Ok(b.to_vec()),
            Err(e) => {
                error!("Failed to read response from {}: {}", uri, e);
                Err(Error::NetworkError)
            }
        }
    }

    /// [`HttpFetcher`] retrieves certificates and CRLs over http and https using reqwest.
    pub struct HttpFetcher {
        cert_client: Client,
        crl_client: Client,
    }

    impl HttpFetcher {
        /// Creates a fetcher whose timeouts are read from the environment
        pub fn new() -> Result<HttpFetcher> {
            Self::with_timeouts(
                RemoteTimeouts::from_env(RemoteKind::Cert),
                RemoteTimeouts::from_env(RemoteKind::Crl),
            )
        }

        /// Creates a fetcher with explicit timeouts for certificate and CRL retrieval
        pub fn with_timeouts(cert: RemoteTimeouts, crl: RemoteTimeouts) -> Result<HttpFetcher> {
            Ok(HttpFetcher {
                cert_client: build_client(&cert)?,
                crl_client: build_client(&crl)?,
            })
        }
    }

    impl UriFetcher for HttpFetcher {
        fn fetch(
            &self,
            uri: &str,
            kind: FetchKind,
            last_modified: Option<&str>,
        ) -> Result<FetchResponse> {
            if !uri.starts_with("http://") && !uri.starts_with("https://") {
                error!("Retrieval of {} is not supported", uri);
                return Err(Error::Unsupported);
            }
            let client = match kind {
                FetchKind::Certificates => &self.cert_client,
                FetchKind::Crl => &self.crl_client,
            };
            let mut request = client.get(uri);
            if let Some(lm) = last_modified {
                request = request.header(IF_MODIFIED_SINCE, lm);
            }
            let response = match request.send() {
                Ok(r) => r,
                Err(e) => {
                    error!("Failed to retrieve {}: {}", uri, e);
                    return Err(Error::NetworkError);
                }
            };
            let status = response.status();
            if StatusCode::NOT_MODIFIED == status {
                return Ok(FetchResponse::NotModified);
            }
            if StatusCode::OK != status {
                error!("Unexpected HTTP status {} from {}", status, uri);
                return Err(Error::UnexpectedHttpStatus(status.as_u16()));
            }
            let lm = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let bytes = read_body(uri, response)?;
            debug!("Retrieved {} bytes from {}", bytes.len(), uri);
            Ok(FetchResponse::Content {
                bytes,
                last_modified: lm,
            })
        }
    }

    /// [`HttpOcspTransport`] sends OCSP requests using reqwest.
    pub struct HttpOcspTransport {
        client: Client,
    }

    impl HttpOcspTransport {
        /// Creates a transport whose timeouts are read from the environment
        pub fn new() -> Result<HttpOcspTransport> {
            Self::with_timeouts(RemoteTimeouts::from_env(RemoteKind::Ocsp))
        }

        /// Creates a transport with explicit timeouts
        pub fn with_timeouts(timeouts: RemoteTimeouts) -> Result<HttpOcspTransport> {
            Ok(HttpOcspTransport {
                client: build_client(&timeouts)?,
            })
        }

        fn finish(
            &self,
            url: &str,
            response: reqwest::Result<reqwest::blocking::Response>,
        ) -> Result<Vec<u8>> {
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    error!("OCSP request to {} failed: {}", url, e);
                    return Err(Error::NetworkError);
                }
            };
            let status = response.status();
            if StatusCode::OK != status {
                error!("OCSP responder {} returned HTTP status {}", url, status);
                return Err(Error::UnexpectedHttpStatus(status.as_u16()));
            }
            read_body(url, response)
        }
    }

    impl OcspTransport for HttpOcspTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.finish(url, self.client.get(url).send())
        }

        fn post(&self, url: &str, request: &[u8]) -> Result<Vec<u8>> {
            self.finish(
                url,
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, "application/ocsp-request")
                    .header(CONTENT_LENGTH, request.len())
                    .body(request.to_vec())
                    .send(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts() {
        assert_eq!(None, timeout_from_millis(0));
        assert_eq!(Some(Duration::from_millis(500)), timeout_from_millis(500));
        let d = RemoteTimeouts::default();
        assert_eq!(Some(Duration::from_secs(15)), d.connect);
        assert_eq!(Some(Duration::from_secs(15)), d.read);

        env::set_var("CERTPATH_CRL_CONNECT_TIMEOUT", "0");
        env::set_var("CERTPATH_CRL_READ_TIMEOUT", "2500");
        let t = RemoteTimeouts::from_env(RemoteKind::Crl);
        assert_eq!(None, t.connect);
        assert_eq!(Some(Duration::from_millis(2500)), t.read);

        env::set_var("CERTPATH_CERT_READ_TIMEOUT", "soon");
        let t = RemoteTimeouts::from_env(RemoteKind::Cert);
        assert_eq!(Some(Duration::from_secs(15)), t.read);
    }
}
