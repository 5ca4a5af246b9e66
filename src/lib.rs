//! # CertForge - A Test-Fixture PKI Generator
//!
//! CertForge generates and manages a small public-key infrastructure for
//! testing: a self-signed certificate authority and the leaf certificates
//! it issues, each exportable as PEM, DER, or PKCS#12. All cryptographic
//! primitives and certificate serialization are delegated to the `openssl`
//! command-line toolkit, invoked as an opaque capability; this crate
//! contributes the issuance engine: distinguished-name composition,
//! signing with correct extensions (SAN, key usage, key identifiers), and
//! scoped handling of ephemeral secrets.
//!
//! This is an offline issuance engine for fixtures, not a production CA:
//! there is no revocation, no OCSP/CRL, no TLS serving, and the default
//! PKCS#12 password is a fixed placeholder.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certforge::authority::{CaOptions, CertificateAuthority, IssueOptions};
//!
//! # fn main() -> certforge::error::Result<()> {
//! // Open (or bootstrap) an authority in a home directory. The CA root
//! // is self-signed on first use and reused on every later open.
//! let mut authority = CertificateAuthority::open(
//!     CaOptions::builder().home("/tmp/pki1".into()).build(),
//! )?;
//!
//! // Issue a server certificate with a DNS subjectAltName. Calling
//! // `create` again with the same alias returns the same certificate
//! // without re-issuing.
//! let server = authority.create(
//!     "server1",
//!     IssueOptions::builder()
//!         .dns(vec!["server1.local".to_string()])
//!         .build(),
//! )?;
//!
//! // Export it, key and CA chain included, for a TLS test harness.
//! server.save_pkcs12("/tmp/pki1/server1.p12", Some("secret"), true)?;
//!
//! // The CA certificate itself exports without its key.
//! authority.ca().save_pem("/tmp/pki1/trust-anchor.pem")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuring the toolkit
//!
//! Key algorithm, key size, signature digest, and validity period are held
//! by the invoker and shared by every operation of one authority:
//!
//! ```rust,no_run
//! use certforge::authority::{CaOptions, CertificateAuthority};
//! use certforge::dn::DistinguishedName;
//! use certforge::invoker::OpensslTool;
//!
//! # fn main() -> certforge::error::Result<()> {
//! let authority = CertificateAuthority::open(
//!     CaOptions::builder()
//!         .home("/tmp/pki2".into())
//!         .dn(DistinguishedName::builder()
//!             .common_name("Integration CA".to_string())
//!             .organization("Example Corp".to_string())
//!             .country("US".to_string())
//!             .build())
//!         .tool(OpensslTool::builder()
//!             .key_size(3072)
//!             .validity_days(30)
//!             .build())
//!         .build(),
//! )?;
//! println!("CA subject: {}", authority.ca().subject());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`authority`]: the certificate authority factory and issuance flow
//! - [`cert`]: issued-certificate handles and export operations
//! - [`dn`]: distinguished-name values and their serialization
//! - [`invoker`]: the closed set of toolkit operations and the `openssl`
//!   invoker
//! - [`secret`]: scoped temporary files for passphrases and config blocks
//! - [`error`]: error types and the crate `Result` alias
//!
//! ## Concurrency
//!
//! One authority instance belongs to one execution context. The internal
//! state is reference-counted with `Rc`, so authorities and certificates
//! are `!Send`; serialize issuance across processes yourself if several
//! share a home directory.

pub mod authority;
pub mod cert;
pub mod dn;
pub mod error;
pub mod invoker;
pub mod secret;
