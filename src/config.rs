//! Environment-derived application configuration

use rust_decimal::Decimal;
use std::env;
use crate::{Result, SnazzError};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub nats_url: Option<String>,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub currency: String,
    pub default_commission_rate: Decimal,
    pub ops_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse::<u16>()
            .map_err(|e| SnazzError::Configuration(format!("Invalid PORT: {e}")))?;
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| SnazzError::Configuration("Missing environment variable 'DATABASE_URL'".into()))?;
        let default_commission_rate = env::var("DEFAULT_COMMISSION_RATE")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<Decimal>()
            .map_err(|e| SnazzError::Configuration(format!("Invalid DEFAULT_COMMISSION_RATE: {e}")))?;

        Ok(Self {
            port,
            database_url,
            nats_url: env::var("NATS_URL").ok(),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").ok(),
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET").ok(),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            default_commission_rate,
            ops_email: env::var("OPS_ALERT_EMAIL").ok(),
        })
    }
}
