use std::collections::HashMap;

use serde::Deserialize;

use crate::models::job::Thresholds;
use crate::models::photo::PhotoType;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// AES-256-GCM key for photos at rest (base64-encoded, 32 bytes)
    pub encryption_key: String,

    pub twilio_account_sid: String,

    pub twilio_auth_token: String,

    /// Sender number, with or without the `whatsapp:` prefix.
    pub twilio_from_number: String,

    /// Example image attached to label prompts
    #[serde(default)]
    pub example_url_label: Option<String>,

    /// Example image attached to azimuth prompts
    #[serde(default)]
    pub example_url_azimuth: Option<String>,

    #[serde(default = "default_blur_min")]
    pub blur_min: f64,

    #[serde(default = "default_dup_hamming_max")]
    pub dup_hamming_max: u32,

    #[serde(default = "default_label_skew_max")]
    pub label_skew_max: f64,

    /// Extra category templates, e.g. `FWA=LABEL,AZIMUTH;FTTH=LABEL`
    #[serde(default)]
    pub category_templates: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_blur_min() -> f64 {
    Thresholds::default().blur_min
}

fn default_dup_hamming_max() -> u32 {
    Thresholds::default().dup_hamming_max
}

fn default_label_skew_max() -> f64 {
    Thresholds::default().label_skew_max
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Process-wide defaults; jobs may override them at creation.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            blur_min: self.blur_min,
            dup_hamming_max: self.dup_hamming_max,
            label_skew_max: self.label_skew_max,
        }
    }

    pub fn templates(&self) -> Result<CategoryTemplates, ConfigError> {
        match self.category_templates.as_deref() {
            Some(raw) if !raw.trim().is_empty() => CategoryTemplates::parse(raw),
            _ => Ok(CategoryTemplates::default()),
        }
    }
}

/// Ordered required photo types per job category.
#[derive(Debug, Clone)]
pub struct CategoryTemplates {
    by_category: HashMap<String, Vec<PhotoType>>,
    fallback: Vec<PhotoType>,
}

impl Default for CategoryTemplates {
    fn default() -> Self {
        let wireless = vec![PhotoType::label(), PhotoType::azimuth()];
        let fiber = vec![PhotoType::label()];

        let by_category = HashMap::from([
            ("FWA".to_string(), wireless.clone()),
            ("WIRELESS".to_string(), wireless.clone()),
            ("FTTH".to_string(), fiber.clone()),
            ("FIBER".to_string(), fiber),
        ]);

        Self {
            by_category,
            fallback: wireless,
        }
    }
}

impl CategoryTemplates {
    /// Parse `CAT=TYPE,TYPE;CAT=TYPE` on top of the built-in templates.
    /// A `DEFAULT` entry replaces the fallback.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut templates = Self::default();

        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (category, types) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::Template(format!("missing '=' in {:?}", entry)))?;

            let category = category.trim().to_uppercase();
            if category.is_empty() {
                return Err(ConfigError::Template(format!("empty category in {:?}", entry)));
            }

            let types: Vec<PhotoType> = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(PhotoType::new)
                .collect();
            if types.is_empty() {
                return Err(ConfigError::Template(format!("no photo types for {}", category)));
            }

            if category == "DEFAULT" {
                templates.fallback = types;
            } else {
                templates.by_category.insert(category, types);
            }
        }

        Ok(templates)
    }

    pub fn required_types(&self, category: Option<&str>) -> Vec<PhotoType> {
        category
            .map(|c| c.trim().to_uppercase())
            .and_then(|c| self.by_category.get(&c))
            .unwrap_or(&self.fallback)
            .clone()
    }
}

/// Canonical worker identity: no `whatsapp:` prefix, no whitespace.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let number = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);
    number.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid category template: {0}")]
    Template(String),
}
