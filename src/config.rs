use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_PLAN_ID: &str = "free";
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Hosted tier: task usage is metered and quotas are enforced.
    Cloud,
    SelfHosted,
}

impl DeploymentMode {
    pub fn from_str(raw: Option<&str>) -> Self {
        let normalized = raw.unwrap_or_default().trim().to_lowercase();
        match normalized.as_str() {
            "cloud" | "saas" | "hosted" => Self::Cloud,
            _ => Self::SelfHosted,
        }
    }

    pub fn meters_usage(self) -> bool {
        matches!(self, Self::Cloud)
    }
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Stripe plan id used for first-time provisioning and as the downgrade target.
    pub default_plan_id: String,
}

#[derive(Debug, Clone)]
pub struct MeteringSettings {
    pub deployment_mode: DeploymentMode,
    pub lock_timeout: Duration,
}

impl Default for MeteringSettings {
    fn default() -> Self {
        Self {
            deployment_mode: DeploymentMode::Cloud,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub stripe: StripeSettings,
    pub metering: MeteringSettings,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            default_plan_id: env::var("STRIPE_DEFAULT_PLAN_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PLAN_ID.to_string()),
        };

        let lock_timeout_secs = env::var("PLAN_LOCK_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECONDS);

        let metering = MeteringSettings {
            deployment_mode: DeploymentMode::from_str(env::var("DEPLOYMENT_MODE").ok().as_deref()),
            lock_timeout: Duration::from_secs(lock_timeout_secs),
        };

        let sentry_dsn = env::var("SENTRY_DSN").ok().filter(|v| !v.trim().is_empty());

        Config {
            database_url,
            frontend_origin,
            bind_addr,
            stripe,
            metering,
            sentry_dsn,
        }
    }
}
