use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_AUDIENCE: &str = "jwt-audience";
pub const ARG_COOLING_PERIOD_HOURS: &str = "cooling-period-hours";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub cooling_period_hours: i64,
}

impl Options {
    /// Parse assurance arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(jwt_secret) = get_non_empty(ARG_JWT_SECRET) else {
            anyhow::bail!("missing required argument: --{ARG_JWT_SECRET}");
        };
        let frontend_base_url = get_non_empty(ARG_FRONTEND_BASE_URL)
            .unwrap_or_else(|| "https://app.gardi.dev".to_string());
        let jwt_audience =
            get_non_empty(ARG_JWT_AUDIENCE).unwrap_or_else(|| "authenticated".to_string());
        let cooling_period_hours = matches
            .get_one::<i64>(ARG_COOLING_PERIOD_HOURS)
            .copied()
            .unwrap_or(24);

        Ok(Self {
            frontend_base_url,
            jwt_secret,
            jwt_audience,
            cooling_period_hours,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for guard redirects and CORS")
                .env("GARDI_FRONTEND_BASE_URL")
                .default_value("https://app.gardi.dev"),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to verify access token signatures")
                .env("GARDI_JWT_SECRET"),
        )
        .arg(
            Arg::new(ARG_JWT_AUDIENCE)
                .long(ARG_JWT_AUDIENCE)
                .help("Expected access token audience (aud)")
                .env("GARDI_JWT_AUDIENCE")
                .default_value("authenticated"),
        )
        .arg(
            Arg::new(ARG_COOLING_PERIOD_HOURS)
                .long(ARG_COOLING_PERIOD_HOURS)
                .help("Hours the last verified factor stays locked after an MFA change")
                .env("GARDI_COOLING_PERIOD_HOURS")
                .default_value("24")
                .value_parser(clap::value_parser!(i64)),
        )
}
