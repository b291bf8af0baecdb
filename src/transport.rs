//! Byte streams to receiver devices.
//!
//! A [`Connector`] opens a fresh [`Transport`] each time the client needs to
//! (re)connect. [`TlsConnector`] is the production implementation: TCP to
//! the device's control port, then a TLS client handshake.
//!
//! Receiver devices present certificates signed by a device-specific
//! chain that no public root store knows about, so the certificate itself
//! is not verified. Handshake signatures still are.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{self, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, SignatureScheme,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{config::Config, error::Result};

/// Any duplex byte stream.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// An established, not yet framed, connection to a device.
pub struct Transport {
    pub stream: Box<dyn Stream>,

    /// Local end of the connection, as seen by the device.
    pub local_addr: Option<SocketAddr>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

/// Opens connections to a device.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached or the handshake
    /// fails.
    async fn connect(&self) -> Result<Transport>;
}

/// Connects over TCP and TLS to the device's control port.
#[derive(Clone)]
pub struct TlsConnector {
    host: String,
    port: u16,
    timeout: Duration,
    connector: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// # Errors
    ///
    /// Returns an error if the TLS client configuration cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let provider = Arc::new(crypto::ring::default_provider());
        let client_config = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeviceCertVerifier { provider }))
            .with_no_client_auth();

        Ok(Self {
            host: config.address.clone(),
            port: config.port,
            timeout: config.connect_timeout,
            connector: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
        })
    }

    async fn handshake(&self) -> Result<Transport> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        let local_addr = tcp.local_addr().ok();

        let server_name = match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => ServerName::IpAddress(ip.into()),
            Err(_) => ServerName::try_from(self.host.clone())?,
        };
        let tls = self.connector.connect(server_name, tcp).await?;

        Ok(Transport {
            stream: Box::new(tls),
            local_addr,
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<Transport> {
        debug!("connecting to {}:{}", self.host, self.port);
        let transport = tokio::time::timeout(self.timeout, self.handshake()).await??;
        info!(
            "connected to {}:{} from {}",
            self.host,
            self.port,
            transport
                .local_addr
                .map_or_else(|| "unknown address".to_owned(), |addr| addr.to_string())
        );
        Ok(transport)
    }
}

/// Accepts any device certificate, but verifies handshake signatures.
#[derive(Debug)]
struct DeviceCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for DeviceCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn tls_config_builds_with_defaults() {
        assert!(TlsConnector::new(&Config::new("192.168.1.20")).is_ok());
    }

    #[tokio::test]
    async fn unreachable_devices_fail_to_connect() {
        // Port 1 on localhost is closed on any sane test host.
        let mut config = Config::new("127.0.0.1");
        config.port = 1;
        config.connect_timeout = Duration::from_secs(2);

        let connector = TlsConnector::new(&config).unwrap();
        let err = connector.connect().await.unwrap_err();
        assert_ne!(err.kind, ErrorKind::Internal);
    }
}
