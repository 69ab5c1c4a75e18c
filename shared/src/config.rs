use crate::{ServiceError, ServiceResult};

pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com";
pub const DEFAULT_FROM_EMAIL: &str = "PowerTank Suporte <suporte@powertankapp.com.br>";
pub const DEFAULT_APP_NAME: &str = "PowerTank";
pub const DEFAULT_APP_URL: &str = "https://powertankapp.com.br/";

/// Secrets a function needs before it may touch any dependency.
#[derive(Debug, Clone, Copy, Default)]
pub struct Requirements {
    pub anon_key: bool,
    pub email: bool,
}

impl Requirements {
    pub const BACKEND_ONLY: Requirements = Requirements { anon_key: false, email: false };

    pub fn with_anon_key(mut self) -> Self {
        self.anon_key = true;
        self
    }

    pub fn with_email(mut self) -> Self {
        self.email = true;
        self
    }
}

/// Branding used in outbound emails and download names.
#[derive(Debug, Clone)]
pub struct Branding {
    pub app_name: String,
    pub app_url: String,
    pub from_email: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            from_email: DEFAULT_FROM_EMAIL.to_string(),
        }
    }
}

/// Connection settings for the outbound email API.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub api_key: String,
    pub api_url: String,
}

/// Configuration assembled once at cold start and handed to every invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_url: String,
    pub service_role_key: String,
    pub anon_key: Option<String>,
    pub email: Option<EmailSettings>,
    pub branding: Branding,
}

impl AppConfig {
    /// Create config from the Lambda environment variables.
    pub fn from_env(requirements: Requirements) -> ServiceResult<Self> {
        Self::from_lookup(requirements, |key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Blank values count as missing.
    pub fn from_lookup<F>(requirements: Requirements, lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                tracing::error!("{} environment variable not set", key);
                ServiceError::Configuration(format!("Variável de ambiente ausente: {}", key))
            })
        };

        let project_url = require("PROJECT_URL")?.trim_end_matches('/').to_string();
        let service_role_key = require("SERVICE_ROLE_KEY")?;

        let anon_key = if requirements.anon_key {
            Some(require("ANON_KEY")?)
        } else {
            get("ANON_KEY")
        };

        let email = if requirements.email {
            Some(EmailSettings {
                api_key: require("RESEND_API_KEY")?,
                api_url: get("RESEND_API_URL")
                    .unwrap_or_else(|| DEFAULT_RESEND_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            })
        } else {
            None
        };

        let branding = Branding {
            app_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            app_url: get("APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            from_email: get("FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
        };

        Ok(Self {
            project_url,
            service_role_key,
            anon_key,
            email,
            branding,
        })
    }

    /// The public anonymous key, when the function was configured with one.
    pub fn anon_key(&self) -> ServiceResult<&str> {
        self.anon_key
            .as_deref()
            .ok_or_else(|| ServiceError::Configuration("Variável de ambiente ausente: ANON_KEY".to_string()))
    }

    pub fn email_settings(&self) -> ServiceResult<&EmailSettings> {
        self.email
            .as_ref()
            .ok_or_else(|| ServiceError::Configuration("Variável de ambiente ausente: RESEND_API_KEY".to_string()))
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.project_url)
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.project_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_backend_only_config() {
        let config = AppConfig::from_lookup(
            Requirements::BACKEND_ONLY,
            lookup(&[("PROJECT_URL", "https://abc.supabase.co/"), ("SERVICE_ROLE_KEY", "srk")]),
        )
        .unwrap();

        assert_eq!(config.project_url, "https://abc.supabase.co");
        assert_eq!(config.auth_url(), "https://abc.supabase.co/auth/v1");
        assert_eq!(config.rest_url(), "https://abc.supabase.co/rest/v1");
        assert!(config.anon_key.is_none());
        assert!(config.email.is_none());
        assert_eq!(config.branding.app_name, "PowerTank");
    }

    #[test]
    fn test_each_missing_secret_has_its_own_message() {
        let cases = [
            (vec![("SERVICE_ROLE_KEY", "srk"), ("ANON_KEY", "a"), ("RESEND_API_KEY", "r")], "PROJECT_URL"),
            (vec![("PROJECT_URL", "u"), ("ANON_KEY", "a"), ("RESEND_API_KEY", "r")], "SERVICE_ROLE_KEY"),
            (vec![("PROJECT_URL", "u"), ("SERVICE_ROLE_KEY", "s"), ("RESEND_API_KEY", "r")], "ANON_KEY"),
            (vec![("PROJECT_URL", "u"), ("SERVICE_ROLE_KEY", "s"), ("ANON_KEY", "a")], "RESEND_API_KEY"),
        ];
        let requirements = Requirements::default().with_anon_key().with_email();

        for (vars, missing) in cases {
            let err = AppConfig::from_lookup(requirements, lookup(&vars)).unwrap_err();
            assert_eq!(err.kind(), "configuration");
            assert_eq!(err.to_string(), format!("Variável de ambiente ausente: {}", missing));
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = AppConfig::from_lookup(
            Requirements::BACKEND_ONLY,
            lookup(&[("PROJECT_URL", "u"), ("SERVICE_ROLE_KEY", "   ")]),
        )
        .unwrap_err();
        assert!(err.to_string().ends_with("SERVICE_ROLE_KEY"));
    }

    #[test]
    fn test_email_defaults_and_overrides() {
        let config = AppConfig::from_lookup(
            Requirements::BACKEND_ONLY.with_email(),
            lookup(&[
                ("PROJECT_URL", "u"),
                ("SERVICE_ROLE_KEY", "s"),
                ("RESEND_API_KEY", "re_123"),
                ("FROM_EMAIL", "Ops <ops@example.com>"),
            ]),
        )
        .unwrap();

        let email = config.email_settings().unwrap();
        assert_eq!(email.api_key, "re_123");
        assert_eq!(email.api_url, DEFAULT_RESEND_API_URL);
        assert_eq!(config.branding.from_email, "Ops <ops@example.com>");
        assert!(config.anon_key().is_err());
    }
}
