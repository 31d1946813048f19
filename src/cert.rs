//! Certificate data model.
//!
//! A [`Certificate`] is an immutable snapshot of one parsed X.509
//! certificate: identity fields, validity window, public key record, and the
//! two extension-derived URLs the revocation checker needs (OCSP responder
//! from Authority Information Access, CRL distribution point). The raw DER is
//! retained because OCSP request construction and CRL serial matching both
//! work from it.

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::pkey::Id;
use openssl::x509::{X509NameRef, X509Ref};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

use crate::error::InspectionError;

// AIA access method for OCSP, RFC 5280 §4.2.2.1
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Distinguished-name fields extracted from a subject or issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub common_name: String,
    pub organization: String,
    pub organization_unit: String,
    pub country_or_region: String,
    pub state_or_province: String,
    pub locality: String,
}

/// Public key record: algorithm family and key size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: String,
    pub size_bits: u32,
}

/// One parsed certificate from a fetched chain. Immutable once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
    /// Serial number, uppercase hex
    pub serial: String,
    pub subject: Name,
    pub issuer: Name,
    /// Not-before instant as rendered by openssl (UTC)
    pub not_before: String,
    /// Not-after instant as rendered by openssl (UTC)
    pub not_after: String,
    /// Whole days until expiry; negative once expired
    pub validity_days: i32,
    pub is_expired: bool,
    pub is_not_yet_valid: bool,
    pub public_key: PublicKey,
    pub signature_algorithm: String,
    /// DNS entries from Subject Alternative Name
    pub sans: Vec<String>,
    /// Basic-constraints CA flag
    pub is_ca: bool,
    /// OCSP responder URL from Authority Information Access, if any
    pub ocsp_responder: Option<String>,
    /// HTTP CRL distribution point, if any
    pub crl_distribution_point: Option<String>,
    /// Raw DER encoding, kept for revocation checking
    #[serde(skip)]
    pub der: Vec<u8>,
}

impl Certificate {
    /// Parses a certificate out of an openssl handle.
    ///
    /// Fails with a Crypto error when either openssl or the DER re-parse
    /// rejects the certificate.
    pub fn from_x509(cert: &X509Ref) -> Result<Certificate, InspectionError> {
        let now = Asn1Time::days_from_now(0)?;
        let der = cert.to_der()?;
        let (ocsp_responder, crl_distribution_point, is_ca) = extension_fields(&der)?;

        let serial = cert.serial_number().to_bn()?.to_hex_str()?.to_string();

        Ok(Certificate {
            serial,
            subject: parse_name(cert.subject_name()),
            issuer: parse_name(cert.issuer_name()),
            not_before: cert.not_before().to_string(),
            not_after: cert.not_after().to_string(),
            validity_days: days_until(&now, cert.not_after()),
            is_expired: cert.not_after() < now,
            is_not_yet_valid: cert.not_before() > now,
            public_key: parse_public_key(cert),
            signature_algorithm: cert.signature_algorithm().object().to_string(),
            sans: parse_sans(cert),
            is_ca,
            ocsp_responder,
            crl_distribution_point,
            der,
        })
    }

    /// Self-signed certificates act as trust anchors; they are never
    /// revocation-checked.
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

fn parse_name(name: &X509NameRef) -> Name {
    Name {
        common_name: name_entry(name, Nid::COMMONNAME),
        organization: name_entry(name, Nid::ORGANIZATIONNAME),
        organization_unit: name_entry(name, Nid::ORGANIZATIONALUNITNAME),
        country_or_region: name_entry(name, Nid::COUNTRYNAME),
        state_or_province: name_entry(name, Nid::STATEORPROVINCENAME),
        locality: name_entry(name, Nid::LOCALITYNAME),
    }
}

fn name_entry(name: &X509NameRef, nid: Nid) -> String {
    name.entries_by_nid(nid)
        .next()
        .and_then(|e| e.data().to_string().ok())
        .unwrap_or_default()
}

fn parse_public_key(cert: &X509Ref) -> PublicKey {
    match cert.public_key() {
        Ok(key) => {
            let id = key.id();
            let algorithm = if id == Id::RSA {
                "RSA".to_string()
            } else if id == Id::EC {
                "EC".to_string()
            } else if id == Id::DSA {
                "DSA".to_string()
            } else if id == Id::ED25519 {
                "Ed25519".to_string()
            } else if id == Id::ED448 {
                "Ed448".to_string()
            } else {
                format!("{:?}", id)
            };
            PublicKey {
                algorithm,
                size_bits: key.bits(),
            }
        }
        Err(_) => PublicKey::default(),
    }
}

fn parse_sans(cert: &X509Ref) -> Vec<String> {
    cert.subject_alt_names()
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.dnsname().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn days_until(now: &Asn1Time, not_after: &Asn1TimeRef) -> i32 {
    now.diff(not_after).map(|diff| diff.days).unwrap_or(0)
}

/// Re-parses the DER to pull out the AIA OCSP responder URL, the first HTTP
/// CRL distribution point, and the basic-constraints CA flag.
fn extension_fields(
    der: &[u8],
) -> Result<(Option<String>, Option<String>, bool), InspectionError> {
    let (_, parsed) = X509Certificate::from_der(der)
        .map_err(|e| InspectionError::crypto(format!("certificate DER parse failed: {:?}", e)))?;

    let is_ca = parsed.is_ca();

    let mut ocsp = None;
    if let Ok(Some(ext)) =
        parsed.get_extension_unique(&x509_parser::oid_registry::OID_PKIX_AUTHORITY_INFO_ACCESS)
    {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_string() == OID_AD_OCSP {
                    if let GeneralName::URI(uri) = &desc.access_location {
                        ocsp = Some(uri.to_string());
                        break;
                    }
                }
            }
        }
    }

    let mut crl = None;
    if let Ok(Some(ext)) = parsed
        .get_extension_unique(&x509_parser::oid_registry::OID_X509_EXT_CRL_DISTRIBUTION_POINTS)
    {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            'outer: for point in &points.points {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            if uri.starts_with("http") {
                                crl = Some(uri.to_string());
                                break 'outer;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((ocsp, crl, is_ca))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(cn: &str) -> Name {
        Name {
            common_name: cn.to_string(),
            ..Name::default()
        }
    }

    #[test]
    fn test_self_signed_detection() {
        let mut cert = Certificate {
            subject: named("Root CA"),
            issuer: named("Root CA"),
            ..Certificate::default()
        };
        assert!(cert.is_self_signed());

        cert.issuer = named("Other CA");
        assert!(!cert.is_self_signed());
    }

    #[test]
    fn test_extension_fields_rejects_garbage() {
        let err = extension_fields(&[0x30, 0x01, 0xff]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Crypto);
    }

    #[test]
    fn test_from_x509_extracts_identity_fields() {
        use openssl::bn::BigNum;
        use openssl::ec::{EcGroup, EcKey};
        use openssl::hash::MessageDigest;
        use openssl::pkey::PKey;
        use openssl::x509::{X509, X509NameBuilder};

        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "parse.example.com")
            .unwrap();
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Example Org")
            .unwrap();
        let name = name.build();

        let serial = BigNum::from_u32(0x2a).unwrap().to_asn1_integer().unwrap();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        let cert = Certificate::from_x509(&builder.build()).unwrap();
        assert_eq!(cert.serial, "2A");
        assert_eq!(cert.subject.common_name, "parse.example.com");
        assert_eq!(cert.subject.organization, "Example Org");
        assert!(cert.is_self_signed());
        assert!(!cert.is_expired);
        assert!(!cert.is_not_yet_valid);
        assert!(!cert.is_ca);
        assert_eq!(cert.public_key.algorithm, "EC");
        assert!(cert.ocsp_responder.is_none());
        assert!(cert.crl_distribution_point.is_none());
        assert!(!cert.der.is_empty());
    }
}
