//! Translation of logical PKI operations into invocations of the external
//! toolkit (the `openssl` command-line tool).
//!
//! Every configuration block and passphrase travels through a
//! [`SecretFile`](crate::secret::SecretFile): nothing secret appears on the
//! command line where the process list could expose it, and nothing is
//! spliced into config text by string templating. The secret files created
//! for one invocation are released before the call returns, on success and
//! on failure alike.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use bon::Builder;
use log::debug;

use crate::dn::DistinguishedName;
use crate::error::{CertForgeError, Result};
use crate::secret::SecretFile;

/// Placeholder password used for PKCS#12 bundles when the caller supplies
/// none. Insecure by design; suitable only for test fixtures.
pub const DEFAULT_EXPORT_PASSWORD: &str = "password";

/// Filesystem locations of one certificate's artifacts.
///
/// Both paths derive deterministically from the certificate alias:
/// `<home>/<alias>.pem` and `<home>/<alias>_key.pem`. Presence on disk is
/// the only persistence signal; there is no separate metadata store.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ArtifactPaths {
    pub fn for_alias(home: &Path, alias: &str) -> Self {
        Self {
            cert: home.join(format!("{alias}.pem")),
            key: home.join(format!("{alias}_key.pem")),
        }
    }

    pub fn exist(&self) -> bool {
        self.cert.exists() && self.key.exists()
    }
}

/// Key usage bits stamped into issued certificates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyUsage {
    NonRepudiation,
    DigitalSignature,
    KeyEncipherment,
}

impl KeyUsage {
    fn config_name(self) -> &'static str {
        match self {
            KeyUsage::NonRepudiation => "nonRepudiation",
            KeyUsage::DigitalSignature => "digitalSignature",
            KeyUsage::KeyEncipherment => "keyEncipherment",
        }
    }
}

/// Subject Alternative Name entries for an issued certificate.
///
/// Serialization lists all DNS names first, then all IP addresses.
#[derive(Clone, Debug, Default)]
pub struct SubjectAltName {
    pub dns: Vec<String>,
    pub ip: Vec<String>,
}

impl SubjectAltName {
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty() && self.ip.is_empty()
    }

    fn config_value(&self) -> String {
        let mut entries = Vec::with_capacity(self.dns.len() + self.ip.len());
        entries.extend(self.dns.iter().map(|name| format!("DNS: {name}")));
        entries.extend(self.ip.iter().map(|addr| format!("IP: {addr}")));
        entries.join(", ")
    }
}

/// Typed description of the X.509 extensions to stamp into a certificate.
///
/// The invoker serializes this into the toolkit's extension-section format;
/// callers never hand over pre-templated config text, so unescaped values
/// cannot smuggle extra directives in.
#[derive(Clone, Debug, Default)]
pub struct ExtensionProfile {
    /// `basicConstraints = CA:true`. Set only on the authority's root.
    pub ca: bool,
    pub key_usage: Vec<KeyUsage>,
    pub subject_alt_name: Option<SubjectAltName>,
}

impl ExtensionProfile {
    /// Extensions for a self-signed CA root.
    pub fn ca_root() -> Self {
        Self {
            ca: true,
            key_usage: Vec::new(),
            subject_alt_name: None,
        }
    }

    /// Extensions for a CA-signed leaf certificate.
    pub fn signed_leaf(subject_alt_name: Option<SubjectAltName>) -> Self {
        Self {
            ca: false,
            key_usage: vec![
                KeyUsage::NonRepudiation,
                KeyUsage::DigitalSignature,
                KeyUsage::KeyEncipherment,
            ],
            subject_alt_name,
        }
    }

    /// Renders the `[ ext ]` section. Subject and authority key
    /// identifiers are always present; the SAN line is omitted entirely
    /// when no names were supplied.
    fn to_ext_section(&self) -> String {
        let mut section = String::from("[ ext ]\n");
        if self.ca {
            section.push_str("basicConstraints = CA:true\n");
        }
        section.push_str("subjectKeyIdentifier = hash\n");
        section.push_str("authorityKeyIdentifier = keyid:always,issuer:always\n");
        if !self.key_usage.is_empty() {
            let usages: Vec<&str> = self.key_usage.iter().map(|u| u.config_name()).collect();
            let _ = writeln!(section, "keyUsage = {}", usages.join(", "));
        }
        if let Some(san) = &self.subject_alt_name {
            if !san.is_empty() {
                let _ = writeln!(section, "subjectAltName = {}", san.config_value());
            }
        }
        section
    }
}

/// One invocation of the external PKI toolkit. The set of operations is
/// closed: an implementation may shell out, link a library, or call an API,
/// but the contract stays the same.
#[derive(Debug)]
pub enum ToolOperation {
    /// Generate a key pair and a self-signed CA root certificate in one
    /// step, with CA-marking extensions.
    SelfSignRoot {
        cert: ArtifactPaths,
        subject: DistinguishedName,
    },
    /// Generate a key pair and an unsigned certificate request carrying
    /// `subject`. The request is returned as captured output, not written
    /// to disk. No CA involvement.
    GenerateRequest {
        cert: ArtifactPaths,
        subject: DistinguishedName,
    },
    /// Sign a pending request with the CA's certificate and key, under the
    /// caller-chosen serial and extension profile.
    SignRequest {
        cert: ArtifactPaths,
        ca: ArtifactPaths,
        request: Vec<u8>,
        serial: u64,
        extensions: ExtensionProfile,
    },
    /// Decode an existing certificate to human-readable text (captured
    /// output).
    ExportText { cert: ArtifactPaths },
    /// Re-encode an existing certificate as PEM at `out`.
    ExportPem { cert: ArtifactPaths, out: PathBuf },
    /// Re-encode an existing certificate as DER at `out`.
    ExportDer { cert: ArtifactPaths, out: PathBuf },
    /// Bundle a certificate into a password-protected PKCS#12 container.
    ExportPkcs12 {
        cert: ArtifactPaths,
        out: PathBuf,
        friendly_name: String,
        /// Falls back to [`DEFAULT_EXPORT_PASSWORD`] when `None`.
        password: Option<String>,
        /// CA certificate to include as the trust chain, if any.
        chain: Option<ArtifactPaths>,
        /// `false` for the CA root, whose key is a trust anchor and never
        /// bundled with its own certificate.
        include_key: bool,
    },
}

/// Builds and executes one `openssl` command per [`ToolOperation`].
///
/// Algorithm and validity parameters live here because every issuance
/// operation of one authority shares them. Nonzero toolkit exit surfaces as
/// [`CertForgeError::ToolInvocation`] with the diagnostics verbatim; the
/// invoker never retries.
#[derive(Clone, Debug, Builder)]
pub struct OpensslTool {
    /// Toolkit executable, resolved through `PATH` by default.
    #[builder(default = PathBuf::from("openssl"))]
    program: PathBuf,
    /// Directory for per-invocation secret files.
    #[builder(default = std::env::temp_dir())]
    temp_dir: PathBuf,
    /// Key algorithm name as understood by the toolkit's `-newkey`.
    #[builder(default = String::from("rsa"))]
    key_algorithm: String,
    #[builder(default = 2048)]
    key_size: u32,
    /// Digest selected for signatures, e.g. `sha256`.
    #[builder(default = String::from("sha256"))]
    signature_algorithm: String,
    #[builder(default = 825)]
    validity_days: u32,
    /// Passphrase protecting the CA private key on disk.
    #[builder(default = String::from(DEFAULT_EXPORT_PASSWORD))]
    passphrase: String,
}

impl Default for OpensslTool {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OpensslTool {
    /// Executes `operation` and returns the toolkit's captured stdout.
    ///
    /// Every [`SecretFile`] created for the invocation is dropped, and
    /// therefore removed, before this function returns.
    pub fn invoke(&self, operation: &ToolOperation) -> Result<Vec<u8>> {
        let mut args: Vec<OsString> = Vec::new();
        let mut secrets: Vec<SecretFile> = Vec::new();
        let mut stdin: Option<&[u8]> = None;

        match operation {
            ToolOperation::SelfSignRoot { cert, subject } => {
                let config = self.secret(self.request_config(subject, true).as_bytes())?;
                let passphrase = self.secret(self.passphrase.as_bytes())?;
                push_str(&mut args, ["req", "-x509", "-config"]);
                args.push(config.path().into());
                push_str(&mut args, ["-keyform", "PEM", "-keyout"]);
                args.push(cert.key.as_os_str().into());
                push_str(&mut args, ["-newkey"]);
                args.push(format!("{}:{}", self.key_algorithm, self.key_size).into());
                push_str(&mut args, ["-out"]);
                args.push(cert.cert.as_os_str().into());
                push_str(&mut args, ["-passout"]);
                args.push(file_arg(passphrase.path()));
                self.push_signature_args(&mut args);
                secrets.push(config);
                secrets.push(passphrase);
            }
            ToolOperation::GenerateRequest { cert, subject } => {
                let config = self.secret(self.request_config(subject, false).as_bytes())?;
                push_str(&mut args, ["req", "-config"]);
                args.push(config.path().into());
                push_str(&mut args, ["-keyform", "PEM", "-keyout"]);
                args.push(cert.key.as_os_str().into());
                push_str(&mut args, ["-newkey"]);
                args.push(format!("{}:{}", self.key_algorithm, self.key_size).into());
                push_str(&mut args, ["-nodes"]);
                secrets.push(config);
            }
            ToolOperation::SignRequest {
                cert,
                ca,
                request,
                serial,
                extensions,
            } => {
                let extfile = self.secret(extensions.to_ext_section().as_bytes())?;
                let passphrase = self.secret(self.passphrase.as_bytes())?;
                push_str(&mut args, ["x509", "-req", "-set_serial"]);
                args.push(serial.to_string().into());
                push_str(&mut args, ["-extfile"]);
                args.push(extfile.path().into());
                push_str(&mut args, ["-extensions", "ext"]);
                self.push_signature_args(&mut args);
                push_str(&mut args, ["-CA"]);
                args.push(ca.cert.as_os_str().into());
                push_str(&mut args, ["-CAkey"]);
                args.push(ca.key.as_os_str().into());
                push_str(&mut args, ["-passin"]);
                args.push(file_arg(passphrase.path()));
                push_str(&mut args, ["-out"]);
                args.push(cert.cert.as_os_str().into());
                stdin = Some(request.as_slice());
                secrets.push(extfile);
                secrets.push(passphrase);
            }
            ToolOperation::ExportText { cert } => {
                push_str(&mut args, ["x509", "-in"]);
                args.push(cert.cert.as_os_str().into());
                push_str(&mut args, ["-text", "-noout"]);
            }
            ToolOperation::ExportPem { cert, out } => {
                push_str(&mut args, ["x509", "-in"]);
                args.push(cert.cert.as_os_str().into());
                push_str(&mut args, ["-outform", "PEM", "-out"]);
                args.push(out.as_os_str().into());
            }
            ToolOperation::ExportDer { cert, out } => {
                push_str(&mut args, ["x509", "-in"]);
                args.push(cert.cert.as_os_str().into());
                push_str(&mut args, ["-outform", "DER", "-out"]);
                args.push(out.as_os_str().into());
            }
            ToolOperation::ExportPkcs12 {
                cert,
                out,
                friendly_name,
                password,
                chain,
                include_key,
            } => {
                let password = password.as_deref().unwrap_or(DEFAULT_EXPORT_PASSWORD);
                let passphrase = self.secret(password.as_bytes())?;
                push_str(&mut args, ["pkcs12", "-export", "-in"]);
                args.push(cert.cert.as_os_str().into());
                push_str(&mut args, ["-name"]);
                args.push(friendly_name.into());
                if *include_key {
                    push_str(&mut args, ["-inkey"]);
                    args.push(cert.key.as_os_str().into());
                } else {
                    push_str(&mut args, ["-nokeys"]);
                }
                if let Some(ca) = chain {
                    push_str(&mut args, ["-chain", "-CAfile"]);
                    args.push(ca.cert.as_os_str().into());
                }
                push_str(&mut args, ["-passout"]);
                args.push(file_arg(passphrase.path()));
                push_str(&mut args, ["-out"]);
                args.push(out.as_os_str().into());
                secrets.push(passphrase);
            }
        }

        let output = self.run(&args, stdin);
        drop(secrets);
        output
    }

    /// `[ req ]` config for key+request generation; the self-signed root
    /// additionally carries its CA-marking extension section.
    fn request_config(&self, subject: &DistinguishedName, self_signed: bool) -> String {
        let mut config = String::from("[ req ]\n");
        if self_signed {
            config.push_str("x509_extensions = ext\n");
        }
        config.push_str("distinguished_name = dn\n");
        config.push_str("prompt = no\n");
        if self_signed {
            config.push_str(&ExtensionProfile::ca_root().to_ext_section());
        }
        config.push_str(&subject.to_dn_section());
        config
    }

    fn push_signature_args(&self, args: &mut Vec<OsString>) {
        args.push(format!("-{}", self.signature_algorithm).into());
        push_str(args, ["-days"]);
        args.push(self.validity_days.to_string().into());
    }

    fn secret(&self, content: &[u8]) -> Result<SecretFile> {
        SecretFile::create_in(&self.temp_dir, content)
    }

    fn run(&self, args: &[OsString], stdin_data: Option<&[u8]>) -> Result<Vec<u8>> {
        let rendered = self.render_command(args);
        debug!("running {rendered}");

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| CertForgeError::ToolInvocation {
            command: rendered.clone(),
            diagnostics: e.to_string(),
        })?;

        if let (Some(data), Some(mut pipe)) = (stdin_data, child.stdin.take()) {
            // A toolkit that exits before draining its input breaks the
            // pipe; its actual failure is reported through the exit status
            // and stderr below.
            if let Err(e) = pipe.write_all(data) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            // pipe drops here so the toolkit sees end-of-input
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let diagnostics = if output.stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                String::from_utf8_lossy(&output.stderr).into_owned()
            };
            return Err(CertForgeError::ToolInvocation {
                command: rendered,
                diagnostics,
            });
        }
        Ok(output.stdout)
    }

    fn render_command(&self, args: &[OsString]) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

fn push_str<const N: usize>(args: &mut Vec<OsString>, literals: [&str; N]) {
    args.extend(literals.iter().map(OsString::from));
}

fn file_arg(path: &Path) -> OsString {
    let mut arg = OsString::from("file:");
    arg.push(path);
    arg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn san_lists_dns_entries_before_ip_entries() {
        let san = SubjectAltName {
            dns: vec!["b.example.com".to_string()],
            ip: vec!["10.0.0.1".to_string()],
        };
        assert_eq!(san.config_value(), "DNS: b.example.com, IP: 10.0.0.1");
    }

    #[test]
    fn leaf_ext_section_carries_key_usage_and_identifiers() {
        let section = ExtensionProfile::signed_leaf(None).to_ext_section();
        assert!(!section.contains("basicConstraints"));
        assert!(section.contains("subjectKeyIdentifier = hash\n"));
        assert!(section.contains("authorityKeyIdentifier = keyid:always,issuer:always\n"));
        assert!(
            section.contains("keyUsage = nonRepudiation, digitalSignature, keyEncipherment\n")
        );
        assert!(!section.contains("subjectAltName"));
    }

    #[test]
    fn leaf_ext_section_includes_san_when_names_are_given() {
        let san = SubjectAltName {
            dns: vec!["a.example.com".to_string()],
            ip: vec![],
        };
        let section = ExtensionProfile::signed_leaf(Some(san)).to_ext_section();
        assert!(section.contains("subjectAltName = DNS: a.example.com\n"));
        assert!(!section.contains("IP:"));
    }

    #[test]
    fn root_ext_section_marks_the_certificate_as_ca() {
        let section = ExtensionProfile::ca_root().to_ext_section();
        assert!(section.starts_with("[ ext ]\nbasicConstraints = CA:true\n"));
        assert!(!section.contains("keyUsage"));
    }

    #[test]
    fn request_config_embeds_extensions_only_for_self_signing() {
        let tool = OpensslTool::default();
        let dn = DistinguishedName::with_common_name("Test CA");

        let self_signed = tool.request_config(&dn, true);
        assert!(self_signed.contains("x509_extensions = ext\n"));
        assert!(self_signed.contains("basicConstraints = CA:true\n"));
        assert!(self_signed.contains("commonName = Test CA\n"));

        let request_only = tool.request_config(&dn, false);
        assert!(!request_only.contains("x509_extensions"));
        assert!(!request_only.contains("basicConstraints"));
        assert!(request_only.contains("prompt = no\n"));
    }

    #[test]
    fn early_toolkit_exit_reports_the_invocation_failure() {
        let temp = tempfile::tempdir().unwrap();
        let tool = OpensslTool::builder()
            .program(PathBuf::from("false"))
            .temp_dir(temp.path().to_path_buf())
            .build();

        // an input larger than the pipe buffer guarantees the write hits
        // the broken pipe once `false` has exited without reading
        let err = tool
            .invoke(&ToolOperation::SignRequest {
                cert: ArtifactPaths::for_alias(temp.path(), "leaf"),
                ca: ArtifactPaths::for_alias(temp.path(), "ca"),
                request: vec![b'x'; 1 << 20],
                serial: 7,
                extensions: ExtensionProfile::signed_leaf(None),
            })
            .unwrap_err();

        assert!(
            matches!(err, CertForgeError::ToolInvocation { .. }),
            "expected an invocation failure, got: {err}"
        );
    }

    #[test]
    fn failed_invocation_reports_the_command_and_leaves_no_secrets() {
        let temp = tempfile::tempdir().unwrap();
        let tool = OpensslTool::builder()
            .program(PathBuf::from("/nonexistent/openssl"))
            .temp_dir(temp.path().to_path_buf())
            .build();

        let cert = ArtifactPaths::for_alias(temp.path(), "leaf");
        let err = tool
            .invoke(&ToolOperation::SignRequest {
                cert: cert.clone(),
                ca: ArtifactPaths::for_alias(temp.path(), "ca"),
                request: b"not a real request".to_vec(),
                serial: 7,
                extensions: ExtensionProfile::signed_leaf(None),
            })
            .unwrap_err();

        match err {
            CertForgeError::ToolInvocation { command, .. } => {
                assert!(command.starts_with("/nonexistent/openssl x509 -req"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // secret config and passphrase files are gone despite the failure
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftovers.is_empty(), "leaked files: {leftovers:?}");
    }
}
