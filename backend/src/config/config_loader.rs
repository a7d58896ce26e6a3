use crate::config::{config_model::AuthSecret, stage::Stage};
use anyhow::{Ok, Result};

use super::config_model::DotEnvyConfig;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = super::config_model::BackendServer {
        port: std::env::var("SERVER_PORT_BACKEND")
            .expect("SERVER_PORT_BACKEND is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = super::config_model::Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let apple_iap = super::config_model::AppleIap {
        shared_secret: std::env::var("APPLE_SHARED_SECRET")
            .expect("APPLE_SHARED_SECRET is invalid"),
    };

    let google_iap = super::config_model::GoogleIap {
        package_name: std::env::var("GOOGLE_PACKAGE_NAME")
            .expect("GOOGLE_PACKAGE_NAME is invalid"),
        service_account_json: std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON").ok(),
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        apple_iap,
        google_iap,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(stage_str.as_str()).unwrap_or_default()
}

pub fn get_auth_secret() -> Result<AuthSecret> {
    dotenvy::dotenv().ok();

    Ok(AuthSecret {
        secret: std::env::var("JWT_AUTH_SECRET").expect("JWT_AUTH_SECRET is invalid"),
    })
}
