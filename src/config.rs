//! Process configuration from environment variables

use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Support channels shown by the contact handler and in fallback replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub brand: String,
    pub hours: String,
    pub whatsapp: String,
    pub email: String,
    pub phone: String,
}

impl Default for ContactInfo {
    fn default() -> Self {
        Self {
            brand: "Jashanmal".to_string(),
            hours: "9am - 6pm, Monday to Friday".to_string(),
            whatsapp: "+971 800 562 63".to_string(),
            email: "support@jashanmal.com".to_string(),
            phone: "800 562 63".to_string(),
        }
    }
}

impl ContactInfo {
    /// Full support-channel block
    pub fn contact_block(&self) -> String {
        format!(
            "Need assistance?\n\n\
             Our Customer Support team is available from {}.\n\n\
             📱 WhatsApp us: {}\n\
             📧 Email us: {}\n\
             📞 Call us: {}",
            self.hours, self.whatsapp, self.email, self.phone
        )
    }

    /// Email and phone lines appended to degraded replies
    pub fn direct_lines(&self) -> String {
        format!("📧 Email: {}\n📞 Call: {}", self.email, self.phone)
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brand: env_or("SUPPORT_BRAND", defaults.brand),
            hours: env_or("SUPPORT_HOURS", defaults.hours),
            whatsapp: env_or("SUPPORT_WHATSAPP", defaults.whatsapp),
            email: env_or("SUPPORT_EMAIL", defaults.email),
            phone: env_or("SUPPORT_PHONE", defaults.phone),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub corpus_path: PathBuf,
    pub index_path: PathBuf,
    pub calendar_token_path: PathBuf,
    pub calendar_credentials_path: PathBuf,
    /// Business time zone for slot labels and working hours
    pub timezone: Tz,
    /// Sessions with no input for this long are closed by the server
    pub session_idle: Duration,
    pub contact: ContactInfo,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("SUPPORT_PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "SUPPORT_PORT",
                value,
            })?,
            Err(_) => 8000,
        };

        let timezone = parse_timezone(std::env::var("SUPPORT_TIMEZONE").ok())?;

        let session_idle = match std::env::var("SUPPORT_SESSION_IDLE_MINUTES") {
            Ok(value) => match value.parse::<u64>() {
                Ok(minutes) if minutes > 0 => Duration::from_secs(minutes.saturating_mul(60)),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SUPPORT_SESSION_IDLE_MINUTES",
                        value,
                    })
                }
            },
            Err(_) => Duration::from_secs(60 * 60),
        };

        Ok(Self {
            port,
            corpus_path: env_path("SUPPORT_CORPUS_PATH", "data/processed/faq_corpus.json"),
            index_path: env_path("SUPPORT_INDEX_PATH", "data/processed/knowledge_index.json"),
            calendar_token_path: env_path("CALENDAR_TOKEN_PATH", "booking/token.json"),
            calendar_credentials_path: env_path(
                "CALENDAR_CREDENTIALS_PATH",
                "booking/credentials.json",
            ),
            timezone,
            session_idle,
            contact: ContactInfo::from_env(),
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_or(name, default.to_string()))
}

/// IANA zone name such as `Asia/Dubai` or `America/New_York`; unset or
/// blank keeps the business default
fn parse_timezone(value: Option<String>) -> Result<Tz, ConfigError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(value) => value.trim().parse::<Tz>().map_err(|_| ConfigError::Invalid {
            name: "SUPPORT_TIMEZONE",
            value,
        }),
        None => Ok(crate::calendar::AvailabilityRules::default().timezone),
    }
}
