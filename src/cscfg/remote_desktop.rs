use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use time::OffsetDateTime;

use super::document::ConfigurationDocument;
use crate::certs::ServiceCertificate;
use crate::client_defaults::REMOTE_ACCESS_LIFETIME;
use crate::error::Error;

const REMOTE_ACCESS_ENABLED: &str = "Microsoft.WindowsAzure.Plugins.RemoteAccess.Enabled";
const REMOTE_ACCESS_USERNAME: &str = "Microsoft.WindowsAzure.Plugins.RemoteAccess.AccountUsername";
const REMOTE_ACCESS_PASSWORD: &str =
    "Microsoft.WindowsAzure.Plugins.RemoteAccess.AccountEncryptedPassword";
const REMOTE_ACCESS_EXPIRATION: &str =
    "Microsoft.WindowsAzure.Plugins.RemoteAccess.AccountExpiration";
const REMOTE_FORWARDER_ENABLED: &str = "Microsoft.WindowsAzure.Plugins.RemoteForwarder.Enabled";
/// Name under which the password encryption certificate is registered.
pub const PASSWORD_ENCRYPTION_CERTIFICATE: &str =
    "Microsoft.WindowsAzure.Plugins.RemoteAccess.PasswordEncryption";

/// A transformation applied to a configuration document.
///
/// Takes the document by value and hands back the updated one; on error the
/// input is consumed and nothing is persisted.
pub trait ConfigExtension {
    fn apply(&self, document: ConfigurationDocument) -> Result<ConfigurationDocument, Error>;
}

/// Enables Remote Desktop on every role of a deployment.
#[derive(Debug, Clone)]
pub struct RemoteDesktop {
    thumbprint: String,
    username: String,
    encrypted_password: String,
    expires_at: OffsetDateTime,
}

impl RemoteDesktop {
    /// Envelopes `password` for the certificate as base64 CMS `EnvelopedData`,
    /// the form the RemoteAccess plugin decrypts on the role. The account
    /// expires one year from now unless [`RemoteDesktop::expires_at`] says otherwise.
    pub fn new(
        certificate: &ServiceCertificate,
        username: &str,
        password: &str,
    ) -> Result<Self, Error> {
        if username.is_empty() {
            return Err(Error::InvalidArgument(
                "remote desktop username must not be empty".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(Error::InvalidArgument(
                "remote desktop password must not be empty".to_string(),
            ));
        }
        let encrypted = certificate.envelope(password.as_bytes())?;
        Ok(Self {
            thumbprint: certificate.thumbprint(),
            username: username.to_string(),
            encrypted_password: STANDARD.encode(encrypted),
            expires_at: OffsetDateTime::now_utc() + REMOTE_ACCESS_LIFETIME,
        })
    }

    pub fn expires_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn encrypted_password(&self) -> &str {
        &self.encrypted_password
    }

    /// Expiration in the form the fabric expects, end of day UTC.
    pub fn expiration_value(&self) -> String {
        let date = self.expires_at.to_offset(time::UtcOffset::UTC).date();
        format!(
            "{:04}-{:02}-{:02}T23:59:59.0000000+00:00",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }
}

impl ConfigExtension for RemoteDesktop {
    fn apply(&self, mut document: ConfigurationDocument) -> Result<ConfigurationDocument, Error> {
        let roles: Vec<String> = document
            .role_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let Some(first) = roles.first() else {
            return Err(Error::InvalidConfiguration(
                "configuration has no roles".to_string(),
            ));
        };

        document.add_certificate(PASSWORD_ENCRYPTION_CERTIFICATE, &self.thumbprint)?;
        let expiration = self.expiration_value();
        for role in &roles {
            document.set_setting(role, REMOTE_ACCESS_ENABLED, "true")?;
            document.set_setting(role, REMOTE_ACCESS_USERNAME, &self.username)?;
            document.set_setting(role, REMOTE_ACCESS_PASSWORD, &self.encrypted_password)?;
            document.set_setting(role, REMOTE_ACCESS_EXPIRATION, &expiration)?;
        }
        document.set_setting(first, REMOTE_FORWARDER_ENABLED, "true")?;
        debug!(
            "remote access enabled for {} role(s), forwarder on {first}",
            roles.len()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigExtension, RemoteDesktop, PASSWORD_ENCRYPTION_CERTIFICATE, REMOTE_ACCESS_ENABLED,
        REMOTE_ACCESS_EXPIRATION, REMOTE_ACCESS_PASSWORD, REMOTE_ACCESS_USERNAME,
        REMOTE_FORWARDER_ENABLED,
    };
    use crate::cscfg::ConfigurationDocument;
    use crate::error::Error;
    use crate::test_support::shared_certificate;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use cms::content_info::ContentInfo;
    use cms::enveloped_data::EnvelopedData;
    use time::{Date, Month};
    use x509_cert::der::{Decode, Encode};

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ServiceConfiguration serviceName="shop" xmlns="http://schemas.microsoft.com/ServiceHosting/2008/10/ServiceConfiguration">
  <Role name="WebRole">
    <Instances count="2" />
  </Role>
  <Role name="WorkerRole">
    <Instances count="1" />
    <ConfigurationSettings />
  </Role>
</ServiceConfiguration>"#;

    #[test]
    fn enables_remote_access_on_every_role() {
        let cert = shared_certificate();
        let extension = RemoteDesktop::new(cert, "admin", "P@ssw0rd")
            .expect("extension")
            .expires_at(
                Date::from_calendar_date(2030, Month::June, 1)
                    .and_then(|d| d.with_hms(10, 0, 0))
                    .expect("date")
                    .assume_utc(),
            );
        let doc = ConfigurationDocument::parse(DOC).expect("parse");
        let doc = extension.apply(doc).expect("apply");

        for role in ["WebRole", "WorkerRole"] {
            assert_eq!(doc.setting(role, REMOTE_ACCESS_ENABLED), Some("true"));
            assert_eq!(doc.setting(role, REMOTE_ACCESS_USERNAME), Some("admin"));
            assert_eq!(
                doc.setting(role, REMOTE_ACCESS_PASSWORD),
                Some(extension.encrypted_password())
            );
            assert_eq!(
                doc.setting(role, REMOTE_ACCESS_EXPIRATION),
                Some("2030-06-01T23:59:59.0000000+00:00")
            );
            let certs = doc.certificates(role).expect("certs");
            assert_eq!(certs.len(), 1);
            assert_eq!(certs[0].name, PASSWORD_ENCRYPTION_CERTIFICATE);
            assert_eq!(certs[0].thumbprint, cert.thumbprint());
        }
        assert_eq!(doc.setting("WebRole", REMOTE_FORWARDER_ENABLED), Some("true"));
        assert_eq!(doc.setting("WorkerRole", REMOTE_FORWARDER_ENABLED), None);
        assert_eq!(doc.instance_count("WebRole"), Some(2));

        let reparsed =
            ConfigurationDocument::parse(&doc.to_xml_string().expect("xml")).expect("reparse");
        assert_eq!(reparsed.snapshot(), doc.snapshot());
    }

    #[test]
    fn applying_twice_does_not_duplicate_entries() {
        let cert = shared_certificate();
        let extension = RemoteDesktop::new(cert, "admin", "pw").expect("extension");
        let doc = ConfigurationDocument::parse(DOC).expect("parse");
        let once = extension.apply(doc).expect("first");
        let twice = extension.apply(once.clone()).expect("second");
        assert_eq!(once.snapshot(), twice.snapshot());
        assert_eq!(twice.settings("WebRole").expect("settings").len(), 5);
    }

    #[test]
    fn password_is_an_enveloped_data_blob() {
        let cert = shared_certificate();
        let extension = RemoteDesktop::new(cert, "admin", "plain-secret").expect("extension");
        assert!(!extension.encrypted_password().contains("plain-secret"));
        assert_eq!(extension.thumbprint(), cert.thumbprint());
        assert_eq!(extension.username(), "admin");

        let der = STANDARD
            .decode(extension.encrypted_password())
            .expect("base64");
        let info = ContentInfo::from_der(&der).expect("content info");
        assert_eq!(info.content_type.to_string(), "1.2.840.113549.1.7.3");
        let enveloped =
            EnvelopedData::from_der(&info.content.to_der().expect("content")).expect("enveloped");
        assert!(enveloped.encrypted_content.encrypted_content.is_some());
    }

    #[test]
    fn rejects_empty_credentials_and_roleless_documents() {
        let cert = shared_certificate();
        assert!(matches!(
            RemoteDesktop::new(cert, "", "pw"),
            Err(Error::InvalidArgument(_))
        ));
        let extension = RemoteDesktop::new(cert, "admin", "pw").expect("extension");
        let empty = ConfigurationDocument::parse("<ServiceConfiguration />").expect("parse");
        assert!(matches!(
            extension.apply(empty),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
