use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("aegis-auth")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AEGIS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("db-path")
                .short('d')
                .long("db-path")
                .help("Path to the SQLite database file")
                .default_value("./.secure/auth.db")
                .env("AEGIS_DB_PATH"),
        )
        .arg(
            Arg::new("secret-key")
                .long("secret-key")
                .help("Server secret used to sign pending-auth tokens")
                .env("AEGIS_SECRET_KEY")
                .required(true),
        )
        .arg(
            Arg::new("mfa-enc-key")
                .long("mfa-enc-key")
                .help("Base64-encoded 32-byte key used to encrypt TOTP secrets at rest")
                .env("AEGIS_MFA_ENC_KEY"),
        )
        .arg(
            Arg::new("hash-time-cost")
                .long("hash-time-cost")
                .help("Argon2id time cost (iterations) for password, PIN and recovery-code hashing")
                .default_value("3")
                .env("AEGIS_HASH_TIME_COST")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("password-min-len")
                .long("password-min-len")
                .help("Minimum password length accepted at setup")
                .default_value("12")
                .env("AEGIS_PASSWORD_MIN_LEN")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("pin-len")
                .long("pin-len")
                .help("Exact number of digits required for a PIN")
                .default_value("6")
                .env("AEGIS_PIN_LEN")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("login-rate-window")
                .long("login-rate-window")
                .help("Sliding window for login rate limiting, in seconds")
                .default_value("300")
                .env("AEGIS_LOGIN_RATE_WINDOW_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("login-rate-max")
                .long("login-rate-max")
                .help("Maximum login attempts per ip:username within the window")
                .default_value("20")
                .env("AEGIS_LOGIN_RATE_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("lockout-threshold")
                .long("lockout-threshold")
                .help("Failed attempts within the lockout window before the account locks")
                .default_value("5")
                .env("AEGIS_LOCKOUT_THRESHOLD")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("lockout-window")
                .long("lockout-window")
                .help("Window for counting failed attempts, in seconds")
                .default_value("900")
                .env("AEGIS_LOCKOUT_WINDOW_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("lockout-duration")
                .long("lockout-duration")
                .help("How long a locked account stays locked, in seconds")
                .default_value("900")
                .env("AEGIS_LOCKOUT_DURATION_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-idle-timeout")
                .long("session-idle-timeout")
                .help("Session idle timeout, in seconds")
                .default_value("900")
                .env("AEGIS_SESSION_IDLE_TIMEOUT_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-absolute-timeout")
                .long("session-absolute-timeout")
                .help("Session absolute lifetime, in seconds")
                .default_value("86400")
                .env("AEGIS_SESSION_ABSOLUTE_TIMEOUT_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-cookie-name")
                .long("session-cookie-name")
                .help("Name of the session cookie")
                .default_value("aegis_session")
                .env("AEGIS_SESSION_COOKIE_NAME"),
        )
        .arg(
            Arg::new("secure-cookies")
                .long("secure-cookies")
                .help("Set the Secure flag on session cookies")
                .env("AEGIS_SECURE_COOKIES")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("require-mfa")
                .long("require-mfa")
                .help("Require a second factor for every login regardless of per-user settings")
                .env("AEGIS_REQUIRE_MFA")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("pending-token-ttl")
                .long("pending-token-ttl")
                .help("Lifetime of the pending-auth token issued between factors, in seconds")
                .default_value("300")
                .env("AEGIS_PENDING_TOKEN_TTL_SEC")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("recovery-code-count")
                .long("recovery-code-count")
                .help("Number of recovery codes generated per batch")
                .default_value("10")
                .env("AEGIS_RECOVERY_CODE_COUNT")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("AEGIS_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
