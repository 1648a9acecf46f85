use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use super::xml::{XmlDocument, XmlElement};
use crate::error::Error;

/// Namespace of service configuration documents.
pub const SERVICE_CONFIGURATION_NAMESPACE: &str =
    "http://schemas.microsoft.com/ServiceHosting/2008/10/ServiceConfiguration";

const ROOT: &str = "ServiceConfiguration";
const ROLE: &str = "Role";
const INSTANCES: &str = "Instances";
const SETTINGS: &str = "ConfigurationSettings";
const SETTING: &str = "Setting";
const CERTIFICATES: &str = "Certificates";
const CERTIFICATE: &str = "Certificate";
const DEFAULT_THUMBPRINT_ALGORITHM: &str = "sha1";

/// A certificate entry of a role's `Certificates` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateReference {
    pub name: String,
    pub thumbprint: String,
    pub thumbprint_algorithm: String,
}

/// Comparable view of a document: what the round-trip law is stated over.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationSnapshot {
    pub roles: Vec<(String, u32)>,
    pub certificates: BTreeSet<String>,
    pub settings: BTreeMap<String, BTreeMap<String, String>>,
}

/// Parsed deployment configuration (`.cscfg`).
///
/// Backed by the full XML tree, so content the typed accessors do not know
/// about is written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDocument {
    xml: XmlDocument,
}

impl ConfigurationDocument {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let xml = XmlDocument::parse(input.trim_start_matches('\u{feff}'))?;
        let document = Self { xml };
        document.validate()?;
        Ok(document)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            Error::InvalidConfiguration(format!("configuration is not valid utf-8: {e}"))
        })?;
        Self::parse(text)
    }

    pub fn to_xml_string(&self) -> Result<String, Error> {
        self.xml.to_xml_string()
    }

    /// Checks the structural invariants: a `ServiceConfiguration` root, unique
    /// role names and non-negative integer instance counts.
    pub fn validate(&self) -> Result<(), Error> {
        if self.xml.root.local_name() != ROOT {
            return Err(Error::InvalidConfiguration(format!(
                "root element is {}, expected {ROOT}",
                self.xml.root.name
            )));
        }
        let mut seen = HashSet::new();
        for role in self.roles() {
            let name = role_name(role)?;
            if !seen.insert(name) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate role name: {name}"
                )));
            }
            read_instance_count(role)?;
        }
        Ok(())
    }

    pub fn service_name(&self) -> Option<&str> {
        self.xml.root.attribute("serviceName")
    }

    pub fn role_names(&self) -> Vec<&str> {
        self.roles().filter_map(|role| role.attribute("name")).collect()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.find_role(role).is_some()
    }

    pub fn instance_count(&self, role: &str) -> Option<u32> {
        self.find_role(role)
            .and_then(|r| read_instance_count(r).ok())
    }

    /// Replaces the instance count of `role`, leaving everything else intact.
    ///
    /// Fails with `InvalidArgument` for a negative count and `RoleNotFound`
    /// for an unknown role; the document is untouched in both cases.
    pub fn set_instance_count_for_role(&mut self, role: &str, count: i64) -> Result<(), Error> {
        if count < 0 {
            return Err(Error::InvalidArgument(format!(
                "instance count must not be negative, got {count}"
            )));
        }
        let count = u32::try_from(count).map_err(|_| {
            Error::InvalidArgument(format!("instance count {count} is out of range"))
        })?;
        let element = self.role_mut(role)?;
        element
            .child_or_insert(INSTANCES, &[])?
            .set_attribute("count", count.to_string());
        Ok(())
    }

    pub fn setting(&self, role: &str, name: &str) -> Option<&str> {
        self.find_role(role)?
            .child(SETTINGS)?
            .elements_named(SETTING)
            .find(|s| s.attribute("name") == Some(name))
            .and_then(|s| s.attribute("value"))
    }

    /// Settings of `role` in document order.
    pub fn settings(&self, role: &str) -> Result<Vec<(String, String)>, Error> {
        let element = self
            .find_role(role)
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;
        Ok(read_settings(element))
    }

    /// Inserts or replaces a named setting of `role`.
    pub fn set_setting(&mut self, role: &str, name: &str, value: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("setting name must not be empty".to_string()));
        }
        let element = self.role_mut(role)?;
        upsert_setting(element, name, value)
    }

    pub fn certificates(&self, role: &str) -> Result<Vec<CertificateReference>, Error> {
        let element = self
            .find_role(role)
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;
        Ok(read_certificates(element))
    }

    /// Registers a certificate reference in every role.
    pub fn add_certificate(&mut self, name: &str, thumbprint: &str) -> Result<(), Error> {
        let names: Vec<String> = self.role_names().iter().map(|n| n.to_string()).collect();
        let thumbprint = normalize_thumbprint(name, thumbprint)?;
        for role in &names {
            self.check_certificate_slot(role, name, &thumbprint)?;
        }
        for role in &names {
            let element = self.role_mut(role)?;
            upsert_certificate(element, name, &thumbprint)?;
        }
        Ok(())
    }

    /// Registers a certificate reference in a single role.
    pub fn add_certificate_to_role(
        &mut self,
        role: &str,
        name: &str,
        thumbprint: &str,
    ) -> Result<(), Error> {
        let thumbprint = normalize_thumbprint(name, thumbprint)?;
        self.check_certificate_slot(role, name, &thumbprint)?;
        let element = self.role_mut(role)?;
        upsert_certificate(element, name, &thumbprint)
    }

    pub fn snapshot(&self) -> ConfigurationSnapshot {
        let mut snapshot = ConfigurationSnapshot::default();
        for role in self.roles() {
            let Some(name) = role.attribute("name") else {
                continue;
            };
            snapshot
                .roles
                .push((name.to_string(), read_instance_count(role).unwrap_or(0)));
            for cert in read_certificates(role) {
                snapshot.certificates.insert(cert.thumbprint);
            }
            snapshot
                .settings
                .insert(name.to_string(), read_settings(role).into_iter().collect());
        }
        snapshot
    }

    /// Underlying XML tree, for edits the typed accessors do not cover.
    pub fn xml(&self) -> &XmlDocument {
        &self.xml
    }

    pub fn xml_mut(&mut self) -> &mut XmlDocument {
        &mut self.xml
    }

    fn roles(&self) -> impl Iterator<Item = &XmlElement> {
        self.xml.root.elements_named(ROLE)
    }

    fn find_role(&self, role: &str) -> Option<&XmlElement> {
        self.roles().find(|r| r.attribute("name") == Some(role))
    }

    pub(crate) fn role_mut(&mut self, role: &str) -> Result<&mut XmlElement, Error> {
        self.xml
            .root
            .elements_mut()
            .find(|r| r.local_name() == ROLE && r.attribute("name") == Some(role))
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))
    }

    fn check_certificate_slot(&self, role: &str, name: &str, thumbprint: &str) -> Result<(), Error> {
        let element = self
            .find_role(role)
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;
        let clash = read_certificates(element)
            .into_iter()
            .find(|c| c.thumbprint.eq_ignore_ascii_case(thumbprint) && c.name != name);
        match clash {
            Some(existing) => Err(Error::InvalidArgument(format!(
                "thumbprint {thumbprint} is already registered as {} in role {role}",
                existing.name
            ))),
            None => Ok(()),
        }
    }
}

impl FromStr for ConfigurationDocument {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn role_name(role: &XmlElement) -> Result<&str, Error> {
    role.attribute("name")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidConfiguration("role without a name".to_string()))
}

fn read_instance_count(role: &XmlElement) -> Result<u32, Error> {
    let name = role.attribute("name").unwrap_or_default();
    let raw = role
        .child(INSTANCES)
        .and_then(|i| i.attribute("count"))
        .ok_or_else(|| {
            Error::InvalidConfiguration(format!("role {name} has no instance count"))
        })?;
    raw.trim().parse::<u32>().map_err(|_| {
        Error::InvalidConfiguration(format!("role {name} has invalid instance count {raw:?}"))
    })
}

fn read_settings(role: &XmlElement) -> Vec<(String, String)> {
    role.child(SETTINGS)
        .map(|section| {
            section
                .elements_named(SETTING)
                .filter_map(|s| {
                    Some((
                        s.attribute("name")?.to_string(),
                        s.attribute("value").unwrap_or_default().to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn read_certificates(role: &XmlElement) -> Vec<CertificateReference> {
    role.child(CERTIFICATES)
        .map(|section| {
            section
                .elements_named(CERTIFICATE)
                .filter_map(|c| {
                    Some(CertificateReference {
                        name: c.attribute("name")?.to_string(),
                        thumbprint: c.attribute("thumbprint")?.to_ascii_uppercase(),
                        thumbprint_algorithm: c
                            .attribute("thumbprintAlgorithm")
                            .unwrap_or(DEFAULT_THUMBPRINT_ALGORITHM)
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn upsert_setting(role: &mut XmlElement, name: &str, value: &str) -> Result<(), Error> {
    let section = role.child_or_insert(SETTINGS, &[INSTANCES])?;
    if let Some(existing) = section
        .elements_mut()
        .find(|s| s.local_name() == SETTING && s.attribute("name") == Some(name))
    {
        existing.set_attribute("value", value);
        return Ok(());
    }
    let setting = XmlElement::new(section.sibling_name(SETTING))
        .with_attribute("name", name)
        .with_attribute("value", value);
    section.push_element(setting);
    Ok(())
}

fn upsert_certificate(
    role: &mut XmlElement,
    name: &str,
    thumbprint: &str,
) -> Result<(), Error> {
    let section = role.child_or_insert(CERTIFICATES, &[INSTANCES, SETTINGS])?;
    if let Some(existing) = section
        .elements_mut()
        .find(|c| c.local_name() == CERTIFICATE && c.attribute("name") == Some(name))
    {
        existing.set_attribute("thumbprint", thumbprint);
        existing.set_attribute("thumbprintAlgorithm", DEFAULT_THUMBPRINT_ALGORITHM);
        return Ok(());
    }
    let certificate = XmlElement::new(section.sibling_name(CERTIFICATE))
        .with_attribute("name", name)
        .with_attribute("thumbprint", thumbprint)
        .with_attribute("thumbprintAlgorithm", DEFAULT_THUMBPRINT_ALGORITHM);
    section.push_element(certificate);
    Ok(())
}

fn normalize_thumbprint(name: &str, thumbprint: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "certificate name must not be empty".to_string(),
        ));
    }
    let normalized: String = thumbprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidArgument(format!(
            "invalid certificate thumbprint: {thumbprint:?}"
        )));
    }
    Ok(normalized)
}
