use clap::{Arg, ArgMatches, Command};

pub const ARG_IDP_URL: &str = "idp-url";
pub const ARG_IDP_SERVICE_KEY: &str = "idp-service-key";
pub const ARG_IDP_TIMEOUT_SECONDS: &str = "idp-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub service_key: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse identity provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(url) = get_non_empty(ARG_IDP_URL) else {
            anyhow::bail!("missing required argument: --{ARG_IDP_URL}");
        };
        let Some(service_key) = get_non_empty(ARG_IDP_SERVICE_KEY) else {
            anyhow::bail!("missing required argument: --{ARG_IDP_SERVICE_KEY}");
        };
        let timeout_seconds = matches
            .get_one::<u64>(ARG_IDP_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10);

        Ok(Self {
            url,
            service_key,
            timeout_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDP_URL)
                .long(ARG_IDP_URL)
                .help("Identity provider base URL")
                .long_help(
                    "Identity provider base URL. Password grants, factor management, and session revocation are all performed against this endpoint using the service key.",
                )
                .env("GARDI_IDP_URL"),
        )
        .arg(
            Arg::new(ARG_IDP_SERVICE_KEY)
                .long(ARG_IDP_SERVICE_KEY)
                .help("Service key for identity provider admin endpoints")
                .env("GARDI_IDP_SERVICE_KEY"),
        )
        .arg(
            Arg::new(ARG_IDP_TIMEOUT_SECONDS)
                .long(ARG_IDP_TIMEOUT_SECONDS)
                .help("HTTP timeout for identity provider requests in seconds")
                .env("GARDI_IDP_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}
