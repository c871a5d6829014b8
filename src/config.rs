use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub upload_dir: String,
    pub delivery_fee: i64,
    pub frontend_origin: String,
    pub max_body_bytes: usize,
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let jwt_secret =
            lookup("JWT_SECRET").ok_or_else(|| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("APP_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_ttl_hours = lookup("JWT_TTL_HOURS")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(24);
        let upload_dir = lookup("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string());
        let delivery_fee = lookup("DELIVERY_FEE")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|fee| *fee >= 0)
            .unwrap_or(5000);
        let frontend_origin =
            lookup("FRONTEND_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let max_body_bytes = lookup("MAX_BODY_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(5 * 1024 * 1024);
        let cookie_secure = lookup("COOKIE_SECURE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_ttl_hours,
            upload_dir,
            delivery_fee,
            frontend_origin,
            max_body_bytes,
            cookie_secure,
        })
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
    fn defaults_apply() {
        let config =
            AppConfig::from_vars(lookup(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")]))
                .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.delivery_fee, 5000);
        assert_eq!(config.upload_dir, "uploads");
        assert!(!config.cookie_secure);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = AppConfig::from_vars(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("APP_PORT", "not-a-port"),
            ("DELIVERY_FEE", "-10"),
            ("COOKIE_SECURE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.delivery_fee, 5000);
        assert!(config.cookie_secure);
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(AppConfig::from_vars(lookup(&[("DATABASE_URL", "postgres://x")])).is_err());
    }
}
