#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub apple_iap: AppleIap,
    pub google_iap: GoogleIap,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AppleIap {
    pub shared_secret: String,
}

#[derive(Debug, Clone)]
pub struct GoogleIap {
    pub package_name: String,
    pub service_account_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSecret {
    pub secret: String,
}
