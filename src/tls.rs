use crate::Result;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsBackend {
    RustlsRing,
    NativeTls,
}

impl TlsBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RustlsRing => "rustls-ring",
            Self::NativeTls => "native-tls",
        }
    }

    pub(crate) const fn is_available(self) -> bool {
        match self {
            Self::RustlsRing => cfg!(feature = "tls-rustls-ring"),
            Self::NativeTls => cfg!(feature = "tls-native"),
        }
    }
}

impl Default for TlsBackend {
    fn default() -> Self {
        if cfg!(feature = "tls-rustls-ring") {
            Self::RustlsRing
        } else {
            Self::NativeTls
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TlsRootStore {
    #[default]
    BackendDefault,
    WebPki,
    System,
    /// Only the roots added through [`TlsOptions`].
    Specific,
}

#[derive(Clone, Debug)]
enum TlsRootCertificate {
    Pem(Vec<u8>),
    Der(Vec<u8>),
}

#[derive(Clone, Debug)]
struct TlsClientIdentity {
    cert_chain_pem: Vec<u8>,
    private_key_pem: Vec<u8>,
}

/// TLS context settings shared by every connection a client opens.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    backend: TlsBackend,
    root_store: TlsRootStore,
    root_certificates: Vec<TlsRootCertificate>,
    client_identity: Option<TlsClientIdentity>,
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: TlsBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn root_store(mut self, root_store: TlsRootStore) -> Self {
        self.root_store = root_store;
        self
    }

    pub fn add_root_certificate_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates
            .push(TlsRootCertificate::Pem(pem.into()));
        self
    }

    pub fn add_root_certificate_der(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.root_certificates
            .push(TlsRootCertificate::Der(der.into()));
        self
    }

    pub fn client_identity_pem(
        mut self,
        cert_chain_pem: impl Into<Vec<u8>>,
        private_key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        self.client_identity = Some(TlsClientIdentity {
            cert_chain_pem: cert_chain_pem.into(),
            private_key_pem: private_key_pem.into(),
        });
        self
    }

    pub fn selected_backend(&self) -> TlsBackend {
        self.backend
    }

    pub(crate) fn to_ureq_config(&self) -> Result<ureq::tls::TlsConfig> {
        let backend = self.backend;
        if !backend.is_available() {
            return Err(tls_config_error(
                backend,
                "backend is not compiled in; enable its cargo feature",
            ));
        }
        let provider = match backend {
            TlsBackend::RustlsRing => ureq::tls::TlsProvider::Rustls,
            TlsBackend::NativeTls => ureq::tls::TlsProvider::NativeTls,
        };
        let mut tls_config_builder = ureq::tls::TlsConfig::builder().provider(provider);

        let mut roots = Vec::new();
        for root_certificate in &self.root_certificates {
            match root_certificate {
                TlsRootCertificate::Pem(pem) => {
                    roots.extend(parse_pem_certificates(backend, pem, "root certificate")?);
                }
                TlsRootCertificate::Der(der) => {
                    roots.push(ureq::tls::Certificate::from_der(der).to_owned());
                }
            }
        }

        if !roots.is_empty() && self.root_store != TlsRootStore::Specific {
            return Err(tls_config_error(
                backend,
                "custom root CAs require root_store(TlsRootStore::Specific)",
            ));
        }

        match self.root_store {
            TlsRootStore::BackendDefault => {}
            TlsRootStore::WebPki => {
                tls_config_builder = tls_config_builder.root_certs(ureq::tls::RootCerts::WebPki);
            }
            TlsRootStore::System => {
                tls_config_builder =
                    tls_config_builder.root_certs(ureq::tls::RootCerts::PlatformVerifier);
            }
            TlsRootStore::Specific => {
                if roots.is_empty() {
                    return Err(tls_config_error(
                        backend,
                        "root_store(TlsRootStore::Specific) requires at least one root CA",
                    ));
                }
                tls_config_builder =
                    tls_config_builder.root_certs(ureq::tls::RootCerts::new_with_certs(&roots));
            }
        }

        if let Some(identity) = &self.client_identity {
            let cert_chain =
                parse_pem_certificates(backend, &identity.cert_chain_pem, "client certificate")?;
            let private_key = ureq::tls::PrivateKey::from_pem(&identity.private_key_pem)
                .map_err(|source| {
                    tls_config_error(
                        backend,
                        format!("failed to parse client private key PEM: {source}"),
                    )
                })?;
            tls_config_builder = tls_config_builder.client_cert(Some(
                ureq::tls::ClientCert::new_with_certs(&cert_chain, private_key),
            ));
        }

        Ok(tls_config_builder.build())
    }
}

fn parse_pem_certificates(
    backend: TlsBackend,
    pem_bundle: &[u8],
    context: &str,
) -> Result<Vec<ureq::tls::Certificate<'static>>> {
    let mut certificates = Vec::new();
    for item in ureq::tls::parse_pem(pem_bundle) {
        let item = item.map_err(|source| {
            tls_config_error(backend, format!("failed to parse PEM {context}: {source}"))
        })?;
        if let ureq::tls::PemItem::Certificate(certificate) = item {
            certificates.push(certificate);
        }
    }
    if certificates.is_empty() {
        return Err(tls_config_error(
            backend,
            format!("no certificate blocks found in PEM {context}"),
        ));
    }
    Ok(certificates)
}

pub(crate) fn tls_config_error(backend: TlsBackend, message: impl Into<String>) -> Error {
    Error::TlsConfig {
        backend: backend.as_str(),
        message: message.into(),
    }
}
