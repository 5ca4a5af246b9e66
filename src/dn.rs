use std::fmt;

use bon::Builder;

/// Distinguished name identifying the subject of a certificate.
///
/// Only the fields that are set are ever serialized; the serialization
/// order is the conventional DN order, not alphabetical. The value is
/// immutable once built.
///
/// # Fields
/// * `country` - The country (C).
/// * `organizational_unit` - The organizational unit (OU).
/// * `organization` - The organization (O).
/// * `locality` - The locality or city (L).
/// * `state_or_province` - The state or province (ST).
/// * `common_name` - The common name (CN).
/// * `email_address` - The e-mail address (emailAddress).
#[derive(Clone, Debug, Builder, Default)]
pub struct DistinguishedName {
    pub country: Option<String>,
    pub organizational_unit: Option<String>,
    pub organization: Option<String>,
    pub locality: Option<String>,
    pub state_or_province: Option<String>,
    pub common_name: Option<String>,
    pub email_address: Option<String>,
}

impl DistinguishedName {
    /// Creates a minimal identity carrying only a common name.
    pub fn with_common_name(name: impl Into<String>) -> Self {
        Self {
            common_name: Some(name.into()),
            ..Self::default()
        }
    }

    fn section_fields(&self) -> [(&'static str, &Option<String>); 7] {
        [
            ("countryName", &self.country),
            ("organizationalUnitName", &self.organizational_unit),
            ("organizationName", &self.organization),
            ("localityName", &self.locality),
            ("stateOrProvinceName", &self.state_or_province),
            ("commonName", &self.common_name),
            ("emailAddress", &self.email_address),
        ]
    }

    /// Renders the `[ dn ]` configuration section consumed by the toolkit.
    ///
    /// Lists exactly the populated fields, one `name = value` line each, in
    /// the fixed C, OU, O, L, ST, CN, emailAddress order. Field content is
    /// passed through unvalidated; the toolkit enforces charset and length
    /// constraints and any failure it reports is surfaced unmodified.
    pub fn to_dn_section(&self) -> String {
        let mut section = String::from("[ dn ]\n");
        for (name, value) in self.section_fields() {
            if let Some(value) = value {
                section.push_str(name);
                section.push_str(" = ");
                section.push_str(value);
                section.push('\n');
            }
        }
        section
    }
}

impl fmt::Display for DistinguishedName {
    /// Formats the DN as a one-line `CN=…,OU=…` string, escaping commas
    /// inside values.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("CN", &self.common_name),
            ("OU", &self.organizational_unit),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.state_or_province),
            ("C", &self.country),
            ("emailAddress", &self.email_address),
        ];
        let mut first = true;
        for (name, value) in fields {
            if let Some(value) = value {
                if !first {
                    f.write_str(",")?;
                }
                write!(f, "{name}={}", value.replace(',', "\\,"))?;
                first = false;
            }
        }
        Ok(())
    }
}
