//! Peer-certificate validation for mutually authenticated bus connections
//!
//! The bus server is expected to present a certificate whose leaf common
//! name sits inside the configured trust domain. This is a hard security
//! gate: a handshake that fails the check must not proceed to subscription.

use crate::error::BusError;
use crate::transport::PeerVerifyFn;
use regex::Regex;
use rustls::pki_types::CertificateDer;
use std::sync::Arc;
use tracing::warn;
use x509_parser::prelude::*;

/// Validates the peer's verified certificate chains against the expected
/// naming pattern `^[a-zA-Z0-9*-]*\.<trust-domain>$`
pub struct PeerCertificateValidator {
    trust_domain: String,
    pattern: Regex,
}

impl PeerCertificateValidator {
    pub fn new(trust_domain: &str) -> Self {
        // The trust domain is escaped, so the pattern itself is always valid.
        let pattern = Regex::new(&format!(
            "^[a-zA-Z0-9*-]*\\.{}$",
            regex::escape(trust_domain)
        ))
        .expect("peer CN pattern must compile");

        Self {
            trust_domain: trust_domain.to_string(),
            pattern,
        }
    }

    /// Succeeds if any chain's leaf certificate common name matches the
    /// trust-domain pattern. Chains with zero certificates are skipped, not
    /// treated as a match.
    pub fn verify(&self, chains: &[Vec<CertificateDer<'static>>]) -> Result<(), BusError> {
        for chain in chains {
            let Some(leaf) = chain.first() else {
                continue;
            };
            let cert = match parse_x509_certificate(leaf.as_ref()) {
                Ok((_, cert)) => cert,
                Err(e) => {
                    warn!("Skipping unparseable peer certificate: {e}");
                    continue;
                }
            };
            let common_name = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok());
            if let Some(cn) = common_name {
                if self.pattern.is_match(cn) {
                    return Ok(());
                }
            }
        }

        Err(BusError::Authentication(format!(
            "Server certificate common name does not match *.{}",
            self.trust_domain
        )))
    }

    /// Wrap the validator as the handshake callback installed on
    /// [`crate::transport::TlsInfo`]
    pub fn into_callback(self) -> PeerVerifyFn {
        Arc::new(move |chains| self.verify(chains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PEER_TRUST_DOMAIN;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn cert_with_common_name(cn: &str) -> CertificateDer<'static> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn validator() -> PeerCertificateValidator {
        PeerCertificateValidator::new(DEFAULT_PEER_TRUST_DOMAIN)
    }

    #[test]
    fn test_rejects_empty_chain_list() {
        let err = validator().verify(&[]).unwrap_err();
        assert!(matches!(err, BusError::Authentication(_)));
    }

    #[test]
    fn test_skips_chains_with_zero_certificates() {
        let err = validator().verify(&[vec![]]).unwrap_err();
        assert!(matches!(err, BusError::Authentication(_)));
    }

    #[test]
    fn test_accepts_leaf_inside_trust_domain() {
        let chain = vec![cert_with_common_name("worker-7.nats.bosh-internal")];
        assert!(validator().verify(&[chain]).is_ok());
    }

    #[test]
    fn test_accepts_wildcard_common_name() {
        let chain = vec![cert_with_common_name("*.nats.bosh-internal")];
        assert!(validator().verify(&[chain]).is_ok());
    }

    #[test]
    fn test_rejects_leaf_outside_trust_domain() {
        let chain = vec![cert_with_common_name("evil.example.com")];
        let err = validator().verify(&[chain]).unwrap_err();
        assert!(err.to_string().contains("nats.bosh-internal"));
    }

    #[test]
    fn test_rejects_suffix_smuggled_into_subdomain() {
        // The dot before the trust domain is mandatory, so a CN that merely
        // embeds the domain elsewhere must not pass.
        let chain = vec![cert_with_common_name("nats.bosh-internal.evil.example.com")];
        assert!(validator().verify(&[chain]).is_err());
    }

    #[test]
    fn test_any_matching_chain_is_sufficient() {
        let bad = vec![cert_with_common_name("evil.example.com")];
        let good = vec![cert_with_common_name("director.nats.bosh-internal")];
        assert!(validator().verify(&[bad, good]).is_ok());
    }

    #[test]
    fn test_custom_trust_domain() {
        let validator = PeerCertificateValidator::new("mbus.internal");
        let chain = vec![cert_with_common_name("director.mbus.internal")];
        assert!(validator.verify(&[chain]).is_ok());

        let chain = vec![cert_with_common_name("director.nats.bosh-internal")];
        assert!(validator.verify(&[chain]).is_err());
    }
}
