//! Throwaway certificate chains for tests.

use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
use rustls::pki_types::CertificateDer;

pub(crate) struct IssuedChain {
    pub ca_pem: String,
    pub ca_der: Vec<u8>,
    pub leaf_pem: String,
    pub leaf_der: Vec<u8>,
    pub leaf_key_pem: String,
    pub leaf_key_der: Vec<u8>,
}

impl IssuedChain {
    pub fn ca_der(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.ca_der.clone())
    }

    pub fn leaf_der(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.leaf_der.clone())
    }

    /// Leaf certificate followed by its unencrypted key
    pub fn identity_pem(&self) -> String {
        format!("{}{}", self.leaf_pem, self.leaf_key_pem)
    }

    /// Leaf certificate followed by its key encrypted with `password`
    pub fn encrypted_identity_pem(&self, password: &str) -> String {
        use pkcs8::pkcs5::pbes2;

        let salt = [7u8; 16];
        let iv = [9u8; 16];
        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, &salt, &iv).unwrap();
        let info = pkcs8::PrivateKeyInfo::try_from(self.leaf_key_der.as_slice()).unwrap();
        let encrypted = info.encrypt_with_params(params, password).unwrap();
        let block = pem::Pem::new("ENCRYPTED PRIVATE KEY", encrypted.as_bytes().to_vec());
        format!("{}{}", self.leaf_pem, pem::encode(&block))
    }
}

/// A CA and a leaf for `dns_name` signed by it
pub(crate) fn issue_chain(dns_name: &str) -> IssuedChain {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let leaf = CertificateParams::new(vec![dns_name.to_string()])
        .unwrap()
        .signed_by(&leaf_key, &ca, &ca_key)
        .unwrap();

    IssuedChain {
        ca_pem: ca.pem(),
        ca_der: ca.der().to_vec(),
        leaf_pem: leaf.pem(),
        leaf_der: leaf.der().to_vec(),
        leaf_key_pem: leaf_key.serialize_pem(),
        leaf_key_der: leaf_key.serialize_der(),
    }
}
