use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Fold parsed CLI matches into the action to execute.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let db_path = matches
        .get_one::<String>("db-path")
        .cloned()
        .context("missing required argument: --db-path")?;
    let secret_key = matches
        .get_one::<String>("secret-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --secret-key")?;
    let mfa_enc_key = matches
        .get_one::<String>("mfa-enc-key")
        .cloned()
        .map(SecretString::from);

    let get_i64 = |name: &str| -> Result<i64> {
        matches
            .get_one::<i64>(name)
            .copied()
            .with_context(|| format!("missing argument: --{name}"))
    };
    let get_usize = |name: &str| -> Result<usize> {
        matches
            .get_one::<usize>(name)
            .copied()
            .with_context(|| format!("missing argument: --{name}"))
    };

    Ok(Action::Server(Args {
        port,
        db_path,
        secret_key,
        mfa_enc_key,
        hash_time_cost: matches
            .get_one::<u32>("hash-time-cost")
            .copied()
            .unwrap_or(3),
        password_min_len: get_usize("password-min-len")?,
        pin_len: get_usize("pin-len")?,
        login_rate_window: get_i64("login-rate-window")?,
        login_rate_max: get_usize("login-rate-max")?,
        lockout_threshold: get_i64("lockout-threshold")?,
        lockout_window: get_i64("lockout-window")?,
        lockout_duration: get_i64("lockout-duration")?,
        session_idle_timeout: get_i64("session-idle-timeout")?,
        session_absolute_timeout: get_i64("session-absolute-timeout")?,
        session_cookie_name: matches
            .get_one::<String>("session-cookie-name")
            .cloned()
            .unwrap_or_else(|| "aegis_session".to_string()),
        secure_cookies: matches.get_flag("secure-cookies"),
        require_mfa: matches.get_flag("require-mfa"),
        pending_token_ttl: get_i64("pending-token-ttl")?,
        recovery_code_count: get_usize("recovery-code-count")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};

    #[test]
    fn handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "aegis-auth",
            "--secret-key",
            "s3cr3t",
            "--port",
            "9000",
            "--require-mfa",
            "--lockout-threshold",
            "3",
        ]);
        let action = handler(&matches).unwrap();
        let Action::Server(args) = action;
        assert_eq!(args.port, 9000);
        assert!(args.require_mfa);
        assert_eq!(args.lockout_threshold, 3);
        assert_eq!(args.recovery_code_count, 10);
    }
}
