//! A `tough` transport that can fetch TUF files from a container registry.
//! Metadata is usually served over plain HTTP(S) while targets may live in
//! a registry; `oci://` target base URLs are resolved by fetching the raw
//! manifest bytes for the referenced tag or digest.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use oci_distribution::client::{Client, ClientConfig};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use tokio::sync::Mutex;
use tough::{
    DefaultTransport, Transport, TransportError, TransportErrorKind, TransportStream,
};
use url::Url;

use crate::artifact::oci::{CR_PASSWORD_ENV, CR_USERNAME_ENV, MANIFEST_MEDIA_TYPES};

/// URL scheme that selects the registry path of the transport.
pub const OCI_SCHEME: &str = "oci";

#[derive(Clone)]
pub struct RegistryTransport {
    http: DefaultTransport,
    client: Arc<Mutex<Client>>,
    credentials: Option<(String, String)>,
}

impl fmt::Debug for RegistryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryTransport")
            .field("http", &self.http)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl RegistryTransport {
    pub fn new(credentials: Option<(String, String)>) -> Self {
        RegistryTransport {
            http: DefaultTransport::new(),
            client: Arc::new(Mutex::new(Client::new(ClientConfig::default()))),
            credentials,
        }
    }

    /// Credentials are sourced from `TUFRA_CR_USERNAME`/`TUFRA_CR_PASSWORD`.
    pub fn from_env() -> Self {
        let credentials = match (
            std::env::var(CR_USERNAME_ENV),
            std::env::var(CR_PASSWORD_ENV),
        ) {
            (Ok(username), Ok(password)) => Some((username, password)),
            _ => None,
        };
        Self::new(credentials)
    }

    fn auth(&self) -> RegistryAuth {
        match &self.credentials {
            Some((username, password)) => {
                RegistryAuth::Basic(username.clone(), password.clone())
            }
            None => RegistryAuth::Anonymous,
        }
    }

    /// Turn an `oci://registry/repository:tag` (or `@digest`) URL into a
    /// registry reference. A reference without tag or digest cannot be
    /// resolved to content.
    fn reference_for(url: &Url) -> Result<Reference, TransportError> {
        let mut raw = String::new();
        if let Some(host) = url.host_str() {
            raw.push_str(host);
        }
        if let Some(port) = url.port() {
            raw.push_str(&format!(":{port}"));
        }
        let path = percent_encoding_decode(url.path());
        raw.push_str(&path);

        let reference: Reference = raw.parse().map_err(|err| {
            TransportError::new_with_cause(
                TransportErrorKind::Failure,
                url.clone(),
                format!("invalid registry reference {raw:?}: {err}"),
            )
        })?;
        if reference.tag().is_none() && reference.digest().is_none() {
            return Err(TransportError::new(
                TransportErrorKind::FileNotFound,
                url.clone(),
            ));
        }
        Ok(reference)
    }
}

fn percent_encoding_decode(path: &str) -> String {
    // Url encodes `@` and `:` inside path segments; the registry reference
    // grammar needs them back.
    path.replace("%40", "@").replace("%3A", ":")
}

#[async_trait]
impl Transport for RegistryTransport {
    async fn fetch(&self, url: Url) -> Result<TransportStream, TransportError> {
        match url.scheme() {
            OCI_SCHEME => {
                let reference = Self::reference_for(&url)?;
                let auth = self.auth();
                let mut client = self.client.lock().await;
                let (raw, _digest) = client
                    .pull_manifest_raw(&reference, &auth, MANIFEST_MEDIA_TYPES)
                    .await
                    .map_err(|err| {
                        TransportError::new_with_cause(
                            TransportErrorKind::Failure,
                            url.clone(),
                            err,
                        )
                    })?;
                Ok(Box::pin(futures::stream::once(async move {
                    Ok(Bytes::from(raw))
                })))
            }
            _ => self.http.fetch(url).await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reference_for_tagged_url() {
        let url = Url::parse("oci://ghcr.io/acme/targets:latest").unwrap();
        let reference = RegistryTransport::reference_for(&url).expect("no reference");
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.repository(), "acme/targets");
        assert_eq!(reference.tag(), Some("latest"));
    }

    #[test]
    fn test_reference_for_digest_url() {
        let url = Url::parse(
            "oci://ghcr.io/acme/targets@sha256:0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        let reference = RegistryTransport::reference_for(&url).expect("no reference");
        assert!(reference.digest().is_some());
    }

    #[test]
    fn test_reference_for_registry_with_port() {
        let url = Url::parse("oci://registry.local:5000/acme/targets:1.0").unwrap();
        let reference = RegistryTransport::reference_for(&url).expect("no reference");
        assert_eq!(reference.registry(), "registry.local:5000");
        assert_eq!(reference.tag(), Some("1.0"));
    }

    #[test]
    fn test_reference_without_tag_or_digest_is_not_found() {
        let url = Url::parse("oci://ghcr.io/acme/targets").unwrap();
        let err = RegistryTransport::reference_for(&url).unwrap_err();
        assert!(matches!(err.kind(), TransportErrorKind::FileNotFound));
    }
}
