//! Shared test fixtures: a small generated PKI hierarchy.
//!
//! Builds `CA -> Intermediate1 -> Intermediate2 -> Leaf` plus a separate
//! three-certificate issuance cycle (`A` issued by `B`, `B` by `C`, `C` by
//! `A`) for cycle-detection tests. Key material is freshly generated per
//! fixture; tests never depend on external files.

use std::sync::Arc;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Name};

use crate::cert::Certificate;

pub(crate) struct TestPki {
    pub root: Arc<Certificate>,
    pub intermediate1: Arc<Certificate>,
    pub intermediate2: Arc<Certificate>,
    pub leaf: Arc<Certificate>,
}

impl TestPki {
    pub fn new() -> Self {
        let root_key = keypair();
        let int1_key = keypair();
        let int2_key = keypair();
        let leaf_key = keypair();

        let root = issue("CA", &root_key, "CA", &root_key, true);
        let int1 = issue("Intermediate1", &int1_key, "CA", &root_key, true);
        let int2 = issue("Intermediate2", &int2_key, "Intermediate1", &int1_key, true);
        let leaf = issue("Leaf", &leaf_key, "Intermediate2", &int2_key, false);

        Self {
            root: Arc::new(root),
            intermediate1: Arc::new(int1),
            intermediate2: Arc::new(int2),
            leaf: Arc::new(leaf),
        }
    }

    /// A second, unrelated hierarchy: `OtherCA -> OtherLeaf`.
    pub fn other() -> (Arc<Certificate>, Arc<Certificate>) {
        let ca_key = keypair();
        let leaf_key = keypair();
        let ca = issue("OtherCA", &ca_key, "OtherCA", &ca_key, true);
        let leaf = issue("OtherLeaf", &leaf_key, "OtherCA", &ca_key, false);
        (Arc::new(ca), Arc::new(leaf))
    }

    /// Three certificates forming an issuance cycle: `A` issued by `B`,
    /// `B` issued by `C`, `C` issued by `A`.
    pub fn cycle() -> (Arc<Certificate>, Arc<Certificate>, Arc<Certificate>) {
        let key_a = keypair();
        let key_b = keypair();
        let key_c = keypair();
        let a = issue("A", &key_a, "B", &key_b, true);
        let b = issue("B", &key_b, "C", &key_c, true);
        let c = issue("C", &key_c, "A", &key_a, true);
        (Arc::new(a), Arc::new(b), Arc::new(c))
    }
}

fn keypair() -> PKey<Private> {
    let rsa = Rsa::generate(2048).expect("generate RSA key");
    PKey::from_rsa(rsa).expect("wrap RSA key")
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509Name::builder().expect("name builder");
    builder
        .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, cn)
        .expect("set CN");
    builder.build()
}

fn issue(
    subject_cn: &str,
    subject_key: &PKey<Private>,
    issuer_cn: &str,
    issuer_key: &PKey<Private>,
    ca: bool,
) -> Certificate {
    let mut builder = X509::builder().expect("x509 builder");
    builder.set_version(2).expect("set version");

    let mut serial = BigNum::new().expect("serial bignum");
    serial
        .rand(128, MsbOption::MAYBE_ZERO, false)
        .expect("random serial");
    let serial = serial.to_asn1_integer().expect("asn1 serial");
    builder.set_serial_number(&serial).expect("set serial");

    let subject = name(subject_cn);
    let issuer = name(issuer_cn);
    builder.set_subject_name(&subject).expect("set subject");
    builder.set_issuer_name(&issuer).expect("set issuer");

    let not_before = Asn1Time::days_from_now(0).expect("not_before");
    let not_after = Asn1Time::days_from_now(365).expect("not_after");
    builder.set_not_before(&not_before).expect("set not_before");
    builder.set_not_after(&not_after).expect("set not_after");

    builder.set_pubkey(subject_key).expect("set pubkey");

    if ca {
        let mut bc = BasicConstraints::new();
        bc.critical().ca();
        builder
            .append_extension(bc.build().expect("basic constraints"))
            .expect("append basic constraints");
        let mut ku = KeyUsage::new();
        ku.critical().key_cert_sign().crl_sign();
        builder
            .append_extension(ku.build().expect("key usage"))
            .expect("append key usage");
    }

    builder
        .sign(issuer_key, MessageDigest::sha256())
        .expect("sign certificate");
    Certificate::from_x509(builder.build()).expect("wrap certificate")
}
