use std::fmt;
use std::str::FromStr;

/// XML namespace of every management API request and response body.
pub const MANAGEMENT_NAMESPACE: &str = "http://schemas.microsoft.com/windowsazure";

/// One of the two parallel environments a deployment can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeploymentSlot {
    #[default]
    Production,
    Staging,
}

impl DeploymentSlot {
    /// Path segment used under `deploymentslots/`.
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            DeploymentSlot::Production => "production",
            DeploymentSlot::Staging => "staging",
        }
    }
}

impl fmt::Display for DeploymentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentSlot::Production => "Production",
            DeploymentSlot::Staging => "Staging",
        })
    }
}

impl FromStr for DeploymentSlot {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("production") {
            Ok(DeploymentSlot::Production)
        } else if value.eq_ignore_ascii_case("staging") {
            Ok(DeploymentSlot::Staging)
        } else {
            Err(crate::error::Error::InvalidArgument(format!(
                "unknown deployment slot: {value}"
            )))
        }
    }
}

/// Target status for all roles of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    Running,
    Suspended,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::DeploymentSlot;

    #[test]
    fn slot_parses_case_insensitively() {
        assert_eq!(
            "Staging".parse::<DeploymentSlot>().expect("slot"),
            DeploymentSlot::Staging
        );
        assert_eq!(
            "PRODUCTION".parse::<DeploymentSlot>().expect("slot"),
            DeploymentSlot::Production
        );
        assert!("canary".parse::<DeploymentSlot>().is_err());
    }

    #[test]
    fn slot_path_segment_is_lowercase() {
        assert_eq!(DeploymentSlot::Staging.as_path_segment(), "staging");
        assert_eq!(DeploymentSlot::default().to_string(), "Production");
    }
}
