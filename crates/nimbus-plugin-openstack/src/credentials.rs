//! Application credentials for Keystone
//!
//! Read from the environment, keyed by the resource name:
//! `OPENSTACK_<RESOURCE>_APPLICATION_CREDENTIAL_ID` and `..._SECRET`.

use nimbus_common::{NimbusError, Result, env_key};

#[derive(Clone)]
pub struct ApplicationCredential {
    pub id: String,
    pub secret: String,
}

impl ApplicationCredential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    pub fn id_var(resource_name: &str) -> String {
        format!("OPENSTACK_{}_APPLICATION_CREDENTIAL_ID", env_key(resource_name))
    }

    pub fn secret_var(resource_name: &str) -> String {
        format!("OPENSTACK_{}_APPLICATION_CREDENTIAL_SECRET", env_key(resource_name))
    }

    pub fn from_env(resource_name: &str) -> Result<Self> {
        let read = |var: String| {
            std::env::var(&var)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| NimbusError::Config(format!("{} is not set", var)))
        };
        Ok(Self {
            id: read(Self::id_var(resource_name))?,
            secret: read(Self::secret_var(resource_name))?,
        })
    }
}

impl std::fmt::Debug for ApplicationCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationCredential")
            .field("id", &self.id)
            .field("secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names() {
        assert_eq!(
            ApplicationCredential::id_var("NERC OpenStack"),
            "OPENSTACK_NERC_OPENSTACK_APPLICATION_CREDENTIAL_ID"
        );
        assert_eq!(
            ApplicationCredential::secret_var("esi"),
            "OPENSTACK_ESI_APPLICATION_CREDENTIAL_SECRET"
        );
    }

    #[test]
    fn test_missing_is_config_error() {
        let err = ApplicationCredential::from_env("nimbus-unset-resource-7f3a").unwrap_err();
        assert!(matches!(err, NimbusError::Config(_)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let cred = ApplicationCredential::new("abc", "s3cr3t");
        let printed = format!("{:?}", cred);
        assert!(printed.contains("abc"));
        assert!(!printed.contains("s3cr3t"));
    }
}
