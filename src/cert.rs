use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::dn::DistinguishedName;
use crate::error::{CertForgeError, Result};
use crate::invoker::{ArtifactPaths, OpensslTool, ToolOperation};

/// State shared between an authority and every certificate it issued:
/// the artifact home directory, the toolkit invoker, and the location of
/// the CA root artifacts. Certificates hold this through `Rc`, a non-owning
/// back-reference to their authority; the whole object graph is
/// single-threaded by construction.
#[derive(Debug)]
pub(crate) struct CaContext {
    pub(crate) home: PathBuf,
    pub(crate) tool: OpensslTool,
    pub(crate) root: ArtifactPaths,
}

/// One issued X.509 certificate and its private key on disk.
///
/// A certificate is identified by its alias within the owning authority;
/// its artifact paths derive from that alias. Every certificate other than
/// the authority's own root is signed by that authority.
#[derive(Clone, Debug)]
pub struct Certificate {
    alias: String,
    subject: DistinguishedName,
    paths: ArtifactPaths,
    ctx: Rc<CaContext>,
    is_root: bool,
}

impl Certificate {
    pub(crate) fn new(
        ctx: Rc<CaContext>,
        alias: &str,
        subject: DistinguishedName,
        is_root: bool,
    ) -> Self {
        let paths = ArtifactPaths::for_alias(&ctx.home, alias);
        Self {
            alias: alias.to_string(),
            subject,
            paths,
            ctx,
            is_root,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// Path of the certificate artifact, `<home>/<alias>.pem`.
    pub fn certificate_path(&self) -> &Path {
        &self.paths.cert
    }

    /// Path of the private key artifact, `<home>/<alias>_key.pem`.
    pub fn key_path(&self) -> &Path {
        &self.paths.key
    }

    /// Whether this certificate is its authority's self-signed root.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub(crate) fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// True iff both the key and the certificate artifacts are on disk.
    pub fn exists(&self) -> bool {
        self.paths.exist()
    }

    /// Decodes the certificate into the toolkit's human-readable text form.
    pub fn to_text(&self) -> Result<String> {
        let output = self.ctx.tool.invoke(&ToolOperation::ExportText {
            cert: self.paths.clone(),
        })?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Writes the certificate to `path` in PEM encoding.
    pub fn save_pem(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.ctx.tool.invoke(&ToolOperation::ExportPem {
            cert: self.paths.clone(),
            out: path.as_ref().to_path_buf(),
        })?;
        Ok(self)
    }

    /// Writes the certificate to `path` in DER encoding.
    pub fn save_der(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.ctx.tool.invoke(&ToolOperation::ExportDer {
            cert: self.paths.clone(),
            out: path.as_ref().to_path_buf(),
        })?;
        Ok(self)
    }

    /// Bundles the certificate into a PKCS#12 container at `path`.
    ///
    /// With no `password` the bundle is protected by the fixed placeholder
    /// [`DEFAULT_EXPORT_PASSWORD`](crate::invoker::DEFAULT_EXPORT_PASSWORD),
    /// which is insecure and intended only for test fixtures. With
    /// `include_chain` the CA certificate is included as the trust chain.
    /// When this certificate *is* the CA root, only the public certificate
    /// is bundled: the CA key is a trust anchor and is never exported
    /// alongside its own certificate.
    pub fn save_pkcs12(
        &self,
        path: impl AsRef<Path>,
        password: Option<&str>,
        include_chain: bool,
    ) -> Result<&Self> {
        let chain = if include_chain && !self.is_root {
            Some(self.ctx.root.clone())
        } else {
            None
        };
        self.ctx.tool.invoke(&ToolOperation::ExportPkcs12 {
            cert: self.paths.clone(),
            out: path.as_ref().to_path_buf(),
            friendly_name: self.alias.clone(),
            password: password.map(str::to_string),
            chain,
            include_key: !self.is_root,
        })?;
        Ok(self)
    }

    /// Saves the certificate in the encoding implied by the extension of
    /// `path`: `.pem`, `.der`/`.cer`/`.crt`, or `.p12`/`.pfx` (with chain,
    /// placeholder password).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<&Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("pem") => self.save_pem(path),
            Some("der" | "cer" | "crt") => self.save_der(path),
            Some("p12" | "pfx") => self.save_pkcs12(path, None, true),
            _ => Err(CertForgeError::InvalidInput(format!(
                "unknown certificate extension `{}`",
                path.display()
            ))),
        }
    }

    /// Removes the private key artifact, then the certificate artifact.
    ///
    /// An artifact that is already gone is tolerated, so repeating the call
    /// is harmless; any other filesystem failure propagates. The handle
    /// must not be used for further operations afterwards.
    pub fn destroy(&self) -> Result<()> {
        remove_if_present(&self.paths.key)?;
        remove_if_present(&self.paths.cert)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
