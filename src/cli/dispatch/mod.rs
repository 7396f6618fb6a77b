//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{assurance, idp};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let idp_opts = idp::Options::parse(matches)?;
    let assurance_opts = assurance::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        idp_url: idp_opts.url,
        idp_service_key: idp_opts.service_key,
        idp_timeout_seconds: idp_opts.timeout_seconds,
        frontend_base_url: assurance_opts.frontend_base_url,
        jwt_secret: assurance_opts.jwt_secret,
        jwt_audience: assurance_opts.jwt_audience,
        cooling_period_hours: assurance_opts.cooling_period_hours,
    }))
}
