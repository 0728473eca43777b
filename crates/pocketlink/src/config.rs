//! CLI configuration: thin wrapper around `pocketlink_config`.
//!
//! Adds resolution of the target server from `GlobalOpts` overrides
//! (`--url`, `--insecure`, `--timeout`) on top of the shared profile types.

use pocketlink_api::ClientConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use pocketlink_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

/// The server a command talks to, after flag overrides.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub profile: Profile,
    /// Whether the profile exists in the config file. Only saved profiles
    /// persist their session in the keyring.
    pub saved: bool,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.profile_name(global.profile.as_deref())
}

/// Comma-separated profile names for error help, sorted.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Pick the profile to use and apply `--url` / `--insecure` on top.
///
/// Without a matching profile, `--url` alone is enough to build an ad-hoc
/// target. An explicit `--profile` that does not exist is an error.
pub fn resolve_target(global: &GlobalOpts, config: &Config) -> Result<Target, CliError> {
    let name = active_profile_name(global, config);

    let (mut profile, saved) = match config.profiles.get(&name) {
        Some(profile) => (profile.clone(), true),
        None => match (&global.url, &global.profile) {
            (Some(url), _) => (Profile::new(url.clone()), false),
            (None, Some(_)) => {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: available_profiles(config),
                });
            }
            (None, None) => {
                return Err(CliError::NoConfig {
                    path: config_path().display().to_string(),
                });
            }
        },
    };

    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }

    Ok(Target {
        name,
        profile,
        saved,
    })
}

/// Translate a resolved target into the SDK client configuration.
pub fn client_config(
    target: &Target,
    global: &GlobalOpts,
    config: &Config,
) -> Result<ClientConfig, CliError> {
    Ok(pocketlink_config::profile_to_client_config(
        &target.profile,
        &target.name,
        &config.defaults,
        global.timeout,
        target.saved,
    )?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["pocketlink"];
        argv.extend_from_slice(args);
        argv.push("health");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with(name: &str, url: &str) -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(name.into(), Profile::new(url));
        cfg
    }

    #[test]
    fn url_flag_without_profile_is_ad_hoc() {
        let target = resolve_target(&global(&["--url", "http://x.test"]), &Config::default()).unwrap();
        assert_eq!(target.profile.url, "http://x.test");
        assert!(!target.saved);
    }

    #[test]
    fn url_flag_overrides_saved_profile() {
        let cfg = config_with("default", "http://saved.test");
        let target = resolve_target(&global(&["-u", "http://other.test", "-k"]), &cfg).unwrap();
        assert_eq!(target.profile.url, "http://other.test");
        assert_eq!(target.profile.insecure, Some(true));
        assert!(target.saved);
    }

    #[test]
    fn nothing_configured_is_no_config() {
        let err = resolve_target(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn unknown_explicit_profile_lists_available() {
        let cfg = config_with("prod", "http://prod.test");
        let err = resolve_target(&global(&["-p", "staging"]), &cfg).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "staging");
                assert_eq!(available, "prod");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
