/// Connection settings for an S3-compatible bucket (Cloudflare R2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Domain (or base URL) objects are publicly served from.
    pub public_domain: String,
}

impl R2Config {
    /// Read the `R2_*` variables. Returns `None` unless all five are set and
    /// non-empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            endpoint_url: get("R2_ENDPOINT_URL")?,
            access_key_id: get("R2_ACCESS_KEY_ID")?,
            secret_access_key: get("R2_SECRET_ACCESS_KEY")?,
            bucket: get("R2_BUCKET_NAME")?,
            public_domain: get("R2_PUBLIC_DOMAIN")?,
        })
    }
}
