use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let token_secret = matches
        .get_one::<String>("token-secret")
        .map(|secret| SecretString::from(secret.clone()))
        .context("missing required argument: --token-secret")?;

    let mut globals = GlobalArgs::new(token_secret);
    if let Some(ttl) = matches.get_one::<u64>("session-ttl") {
        globals.session_ttl_seconds = *ttl;
    }
    if let Some(ttl) = matches.get_one::<u64>("token-ttl") {
        globals.token_ttl_seconds = *ttl;
    }

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .context("missing required argument: --dsn")?,
    };

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};

    #[test]
    fn test_handler_builds_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "warden",
            "--dsn",
            "postgres://localhost/warden",
            "--token-secret",
            "swordfish",
            "--session-ttl",
            "120",
        ]);

        let (action, globals) = handler(&matches).unwrap();
        let Action::Server { port, dsn } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/warden");
        assert_eq!(globals.session_ttl_seconds, 120);
        assert_eq!(globals.token_ttl_seconds, 300);
    }
}
