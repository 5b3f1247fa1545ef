//! Local host identity.

/// Hostname of this machine, or `localhost` if it cannot be read.
#[must_use]
pub fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}
