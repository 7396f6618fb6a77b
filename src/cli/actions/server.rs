use crate::{api, api::handlers::auth::AssuranceConfig, idp::HttpIdentityProvider};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub idp_url: String,
    pub idp_service_key: String,
    pub idp_timeout_seconds: u64,
    pub frontend_base_url: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub cooling_period_hours: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the provider client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let provider = HttpIdentityProvider::new(
        &args.idp_url,
        SecretString::from(args.idp_service_key),
        args.idp_timeout_seconds,
    )?;

    let config = AssuranceConfig::new(args.frontend_base_url, SecretString::from(args.jwt_secret))
        .with_jwt_audience(args.jwt_audience)
        .with_cooling_period_hours(args.cooling_period_hours);

    api::new(args.port, args.dsn, config, Arc::new(provider)).await
}
