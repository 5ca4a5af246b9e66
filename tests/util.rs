use std::path::Path;

use certforge::authority::{CaOptions, CertificateAuthority, IssueOptions};

/// Opens an authority in `home` with default toolkit settings,
/// bootstrapping the CA root on first use. Requires `openssl` on PATH,
/// like every integration test in this suite.
pub fn open_authority(home: &Path) -> CertificateAuthority {
    CertificateAuthority::open(CaOptions::builder().home(home.to_path_buf()).build())
        .expect("failed to open authority")
}

/// Issues a throwaway leaf certificate with no subjectAltName.
#[allow(dead_code)]
pub fn issue_plain(authority: &mut CertificateAuthority, alias: &str) -> certforge::cert::Certificate {
    authority
        .create(alias, IssueOptions::default())
        .expect("failed to issue certificate")
}
