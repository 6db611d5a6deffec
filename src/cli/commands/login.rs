use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const COMMAND: &str = "login";

pub const ARG_API_URL: &str = "api-url";
pub const ARG_EMAIL: &str = "email";
pub const ARG_COURSE_ID: &str = "course-id";
pub const ARG_RESEND_COOLDOWN_SECONDS: &str = "resend-cooldown-seconds";

#[derive(Debug)]
pub struct Options {
    pub api_url: String,
    pub email: Option<String>,
    pub course_id: Option<i64>,
    pub resend_cooldown_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if `--api-url` is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let api_url = matches
            .get_one::<String>(ARG_API_URL)
            .cloned()
            .context("missing required argument: --api-url")?;
        Ok(Self {
            api_url,
            email: matches.get_one::<String>(ARG_EMAIL).cloned(),
            course_id: matches.get_one::<i64>(ARG_COURSE_ID).copied(),
            resend_cooldown_seconds: matches
                .get_one::<u64>(ARG_RESEND_COOLDOWN_SECONDS)
                .copied()
                .unwrap_or(60),
        })
    }
}

#[must_use]
pub fn command() -> Command {
    Command::new(COMMAND)
        .about("Sign in interactively with a one-time code")
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Base URL of the coursegate API")
                .env("COURSEGATE_API_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_EMAIL)
                .short('e')
                .long(ARG_EMAIL)
                .help("Email to sign in with; prompted for when missing")
                .env("COURSEGATE_EMAIL"),
        )
        .arg(
            Arg::new(ARG_COURSE_ID)
                .short('c')
                .long(ARG_COURSE_ID)
                .help("Print the lesson unlock map of this course after signing in")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESEND_COOLDOWN_SECONDS)
                .long(ARG_RESEND_COOLDOWN_SECONDS)
                .help("Seconds to wait before a code can be resent")
                .env("COURSEGATE_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}
