use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use bon::Builder;
use log::info;
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::cert::{CaContext, Certificate};
use crate::dn::DistinguishedName;
use crate::error::{CertForgeError, Result};
use crate::invoker::{ArtifactPaths, ExtensionProfile, OpensslTool, SubjectAltName, ToolOperation};

/// Alias reserved for the authority's own root certificate.
pub const CA_ALIAS: &str = "ca";

/// Options for opening a [`CertificateAuthority`].
///
/// # Fields
/// * `home` - Directory holding the authority's artifacts.
/// * `dn` - Subject of the CA root; a generic test identity by default.
///   Only consulted when the root is first created.
/// * `tool` - Toolkit configuration (program, key algorithm and size,
///   signature algorithm, validity period, CA key passphrase).
#[derive(Clone, Debug, Builder)]
pub struct CaOptions {
    pub home: PathBuf,
    pub dn: Option<DistinguishedName>,
    #[builder(default)]
    pub tool: OpensslTool,
}

/// Options for issuing one leaf certificate.
///
/// When `dn` is unset, the subject falls back to the first IP address, and
/// failing that to the alias itself, as a minimal common-name-only
/// identity. `dns` and `ip` populate the subjectAltName extension; when
/// both are empty the extension is omitted entirely.
#[derive(Clone, Debug, Default, Builder)]
pub struct IssueOptions {
    pub dn: Option<DistinguishedName>,
    #[builder(default)]
    pub dns: Vec<String>,
    #[builder(default)]
    pub ip: Vec<String>,
}

/// Factory owning a self-signed CA root and the leaf certificates it has
/// issued, cached by alias.
///
/// The disk is the authoritative record of what exists; the cache is a
/// performance layer rehydrated lazily from it. The authority is not safe
/// for concurrent mutation, since existence-check-then-create is not
/// atomic; confine one instance to one execution context (the `Rc`-based
/// internals make it `!Send`, enforcing this at compile time).
#[derive(Debug)]
pub struct CertificateAuthority {
    ctx: Rc<CaContext>,
    certs: HashMap<String, Certificate>,
}

impl CertificateAuthority {
    /// Opens the authority rooted at `options.home`, creating the
    /// directory and the self-signed CA root if they are not already
    /// present. A root found on disk is adopted as-is, never re-created.
    pub fn open(options: CaOptions) -> Result<Self> {
        fs::create_dir_all(&options.home)?;
        let root_paths = ArtifactPaths::for_alias(&options.home, CA_ALIAS);
        let ctx = Rc::new(CaContext {
            home: options.home,
            tool: options.tool,
            root: root_paths,
        });

        let subject = options.dn.unwrap_or_else(default_ca_dn);
        let root = Certificate::new(ctx.clone(), CA_ALIAS, subject, true);
        if !root.exists() {
            info!(
                "bootstrapping CA root `{}` in {}",
                root.subject(),
                ctx.home.display()
            );
            ctx.tool.invoke(&ToolOperation::SelfSignRoot {
                cert: root.paths().clone(),
                subject: root.subject().clone(),
            })?;
        }

        let mut certs = HashMap::new();
        certs.insert(CA_ALIAS.to_string(), root);
        Ok(Self { ctx, certs })
    }

    /// The authority's root certificate.
    pub fn ca(&self) -> &Certificate {
        &self.certs[CA_ALIAS]
    }

    /// The authority's home directory.
    pub fn home(&self) -> &std::path::Path {
        &self.ctx.home
    }

    /// Issues (or returns) the certificate for `alias`.
    ///
    /// The call is idempotent: a cached certificate is returned unchanged,
    /// and a certificate whose artifacts already exist on disk is adopted
    /// into the cache without re-issuing, so restarting a process never
    /// regenerates certificates. Otherwise a new key pair and
    /// request are generated and signed by the CA under a fresh random
    /// 64-bit serial. A failed issuance leaves neither artifact behind.
    pub fn create(&mut self, alias: &str, options: IssueOptions) -> Result<Certificate> {
        if let Some(cert) = self.certs.get(alias) {
            return Ok(cert.clone());
        }

        let subject = options.dn.unwrap_or_else(|| {
            let fallback = options
                .ip
                .first()
                .cloned()
                .unwrap_or_else(|| alias.to_string());
            DistinguishedName::with_common_name(fallback)
        });
        let cert = Certificate::new(self.ctx.clone(), alias, subject, false);
        if cert.exists() {
            self.certs.insert(alias.to_string(), cert.clone());
            return Ok(cert);
        }

        let subject_alt_name = SubjectAltName {
            dns: options.dns,
            ip: options.ip,
        };
        let subject_alt_name = (!subject_alt_name.is_empty()).then_some(subject_alt_name);

        let request = match self.ctx.tool.invoke(&ToolOperation::GenerateRequest {
            cert: cert.paths().clone(),
            subject: cert.subject().clone(),
        }) {
            Ok(request) => request,
            Err(e) => {
                // the toolkit writes the key pair before validating the
                // subject, so a rejected request can still leave a key
                let _ = fs::remove_file(cert.key_path());
                return Err(e);
            }
        };

        let serial = OsRng
            .try_next_u64()
            .map_err(|e| CertForgeError::Randomness(e.to_string()))?;

        let signed = self.ctx.tool.invoke(&ToolOperation::SignRequest {
            cert: cert.paths().clone(),
            ca: self.ctx.root.clone(),
            request,
            serial,
            extensions: ExtensionProfile::signed_leaf(subject_alt_name),
        });
        if let Err(e) = signed {
            // request generation already wrote the key pair; drop it so a
            // failed create leaves no half-issued certificate
            let _ = fs::remove_file(cert.key_path());
            return Err(e);
        }

        info!("issued certificate `{alias}` for {}", cert.subject());
        self.certs.insert(alias.to_string(), cert.clone());
        Ok(cert)
    }

    /// Returns the certificate for `alias` without issuing one: from the
    /// cache if present, else rehydrated from disk, else `None`.
    pub fn get(&mut self, alias: &str) -> Option<Certificate> {
        if let Some(cert) = self.certs.get(alias) {
            return Some(cert.clone());
        }
        let cert = Certificate::new(
            self.ctx.clone(),
            alias,
            DistinguishedName::with_common_name(alias),
            false,
        );
        if cert.exists() {
            self.certs.insert(alias.to_string(), cert.clone());
            Some(cert)
        } else {
            None
        }
    }

    /// Removes the certificate's key and certificate artifacts and drops
    /// the cache entry. The CA root cannot be destroyed this way; remove
    /// the home directory instead.
    pub fn destroy(&mut self, alias: &str) -> Result<()> {
        if alias == CA_ALIAS {
            return Err(CertForgeError::ArtifactState(
                "the CA root cannot be destroyed through its authority".to_string(),
            ));
        }
        let cert = self.certs.remove(alias).unwrap_or_else(|| {
            Certificate::new(
                self.ctx.clone(),
                alias,
                DistinguishedName::with_common_name(alias),
                false,
            )
        });
        cert.destroy()
    }
}

fn default_ca_dn() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name("CertForge Test CA".to_string())
        .organization("CertForge".to_string())
        .build()
}
