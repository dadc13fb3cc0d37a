use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Step configuration as edited by the user. List-valued fields may still
/// hold their comma-separated string form here.
pub type StepConfig = Map<String, Value>;

/// One configured unit of a redaction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: StepConfig,
}

fn default_enabled() -> bool {
    true
}

impl Step {
    /// A freshly added step: enabled, no label, empty config.
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            enabled: true,
            config: StepConfig::new(),
        }
    }

    /// Token prefix the engine uses for this step's redactions.
    /// A non-empty label wins: uppercased, non-alphanumerics become `_`.
    pub fn token_prefix(&self) -> String {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label
                .to_uppercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect(),
            _ => self.kind.token_prefix().to_string(),
        }
    }
}

/// Step type tag. Unknown tags survive as `Other` so recipes written by
/// newer builds round-trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Email,
    Phone,
    Username,
    Ipv4,
    Ipv6,
    Mac,
    Hostname,
    Url,
    Jwt,
    ApiKey,
    OAuth,
    Base64,
    Uuid,
    Ssn,
    CreditCard,
    Regex,
    JsonKey,
    QueryParam,
    Header,
    Replace,
    PartialMask,
    Other(String),
}

impl StepKind {
    /// Every built-in kind, in catalogue order.
    pub const CATALOGUE: [StepKind; 21] = [
        StepKind::Email,
        StepKind::Phone,
        StepKind::Username,
        StepKind::Ipv4,
        StepKind::Ipv6,
        StepKind::Mac,
        StepKind::Hostname,
        StepKind::Url,
        StepKind::Jwt,
        StepKind::ApiKey,
        StepKind::OAuth,
        StepKind::Base64,
        StepKind::Uuid,
        StepKind::Ssn,
        StepKind::CreditCard,
        StepKind::Regex,
        StepKind::JsonKey,
        StepKind::QueryParam,
        StepKind::Header,
        StepKind::Replace,
        StepKind::PartialMask,
    ];

    pub fn tag(&self) -> &str {
        match self {
            StepKind::Email => "email",
            StepKind::Phone => "phone",
            StepKind::Username => "username",
            StepKind::Ipv4 => "ipv4",
            StepKind::Ipv6 => "ipv6",
            StepKind::Mac => "mac",
            StepKind::Hostname => "hostname",
            StepKind::Url => "url",
            StepKind::Jwt => "jwt",
            StepKind::ApiKey => "apikey",
            StepKind::OAuth => "oauth",
            StepKind::Base64 => "base64",
            StepKind::Uuid => "uuid",
            StepKind::Ssn => "ssn",
            StepKind::CreditCard => "credit_card",
            StepKind::Regex => "regex",
            StepKind::JsonKey => "jsonKey",
            StepKind::QueryParam => "queryParam",
            StepKind::Header => "header",
            StepKind::Replace => "replace",
            StepKind::PartialMask => "partialMask",
            StepKind::Other(tag) => tag,
        }
    }

    /// Resolve a wire tag, accepting the engine's snake_case aliases.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "email" => StepKind::Email,
            "phone" => StepKind::Phone,
            "username" => StepKind::Username,
            "ipv4" => StepKind::Ipv4,
            "ipv6" => StepKind::Ipv6,
            "mac" => StepKind::Mac,
            "hostname" => StepKind::Hostname,
            "url" => StepKind::Url,
            "jwt" => StepKind::Jwt,
            "apikey" | "api_key" => StepKind::ApiKey,
            "oauth" => StepKind::OAuth,
            "base64" => StepKind::Base64,
            "uuid" => StepKind::Uuid,
            "ssn" => StepKind::Ssn,
            "credit_card" => StepKind::CreditCard,
            "regex" => StepKind::Regex,
            "jsonKey" | "json_key" => StepKind::JsonKey,
            "queryParam" | "query_param" => StepKind::QueryParam,
            "header" | "http_header" => StepKind::Header,
            "replace" => StepKind::Replace,
            "partialMask" | "partial_mask" => StepKind::PartialMask,
            other => StepKind::Other(other.to_string()),
        }
    }

    /// The config field that holds a list of strings for this kind, if any.
    pub fn list_field(&self) -> Option<&'static str> {
        match self {
            StepKind::Email => Some("allowedDomains"),
            StepKind::Ipv4 => Some("excludeSubnets"),
            StepKind::JsonKey => Some("keys"),
            StepKind::QueryParam | StepKind::Header => Some("names"),
            StepKind::Phone
            | StepKind::Username
            | StepKind::Ipv6
            | StepKind::Mac
            | StepKind::Hostname
            | StepKind::Url
            | StepKind::Jwt
            | StepKind::ApiKey
            | StepKind::OAuth
            | StepKind::Base64
            | StepKind::Uuid
            | StepKind::Ssn
            | StepKind::CreditCard
            | StepKind::Regex
            | StepKind::Replace
            | StepKind::PartialMask
            | StepKind::Other(_) => None,
        }
    }

    pub fn token_prefix(&self) -> &'static str {
        match self {
            StepKind::Email => "EMAIL",
            StepKind::Phone => "PHONE",
            StepKind::Username => "USERNAME",
            StepKind::Ipv4 => "IPV4",
            StepKind::Ipv6 => "IPV6",
            StepKind::Mac => "MAC",
            StepKind::Hostname => "HOSTNAME",
            StepKind::Url => "URL",
            StepKind::Jwt => "JWT",
            StepKind::ApiKey => "APIKEY",
            StepKind::OAuth => "OAUTH",
            StepKind::Base64 => "BASE64",
            StepKind::Uuid => "UUID",
            StepKind::Ssn => "SSN",
            StepKind::CreditCard => "CC",
            StepKind::Regex => "REGEX",
            StepKind::JsonKey => "JSON",
            StepKind::QueryParam => "PARAM",
            StepKind::Header => "HEADER",
            StepKind::Replace => "REPLACE",
            StepKind::PartialMask => "MASK",
            StepKind::Other(_) => "REDACTED",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            StepKind::Email => "Email Address",
            StepKind::Phone => "Phone Number",
            StepKind::Username => "Username",
            StepKind::Ipv4 => "IPv4 Address",
            StepKind::Ipv6 => "IPv6 Address",
            StepKind::Mac => "MAC Address",
            StepKind::Hostname => "Hostname/FQDN",
            StepKind::Url => "URL",
            StepKind::Jwt => "JWT Token",
            StepKind::ApiKey => "API Key",
            StepKind::OAuth => "OAuth Token",
            StepKind::Base64 => "Base64 Blob",
            StepKind::Uuid => "UUID",
            StepKind::Ssn => "SSN",
            StepKind::CreditCard => "Credit Card",
            StepKind::Regex => "Custom Regex",
            StepKind::JsonKey => "JSON Key",
            StepKind::QueryParam => "URL Parameter",
            StepKind::Header => "HTTP Header",
            StepKind::Replace => "Find & Replace",
            StepKind::PartialMask => "Partial Mask",
            StepKind::Other(tag) => tag,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            StepKind::Email | StepKind::Phone | StepKind::Username => "Identity",
            StepKind::Ipv4
            | StepKind::Ipv6
            | StepKind::Mac
            | StepKind::Hostname
            | StepKind::Url => "Infrastructure",
            StepKind::Jwt | StepKind::ApiKey | StepKind::OAuth | StepKind::Base64 => "Secrets",
            StepKind::Uuid => "Identifiers",
            StepKind::Ssn => "PII",
            StepKind::CreditCard => "Financial",
            StepKind::Regex | StepKind::Replace | StepKind::PartialMask => "Advanced",
            StepKind::JsonKey | StepKind::QueryParam | StepKind::Header => "Structure",
            StepKind::Other(_) => "Unknown",
        }
    }
}

impl From<String> for StepKind {
    fn from(tag: String) -> Self {
        StepKind::from_tag(&tag)
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Other(tag) => tag,
            known => known.tag().to_string(),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
