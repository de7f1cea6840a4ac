//! Best-effort rewrites between the SSH and HTTPS spellings of a repository URL.
//!
//! Published build-info may have recorded either spelling, so lookups compare
//! against both. These are single regex substitutions, not URL parsers:
//! input that does not fit the expected shape comes back unchanged.

use regex::Regex;

/// `https://host/path` -> `git@host:path`. SSH input is returned as is.
pub fn to_ssh(url: &str) -> String {
    if url.starts_with("git@") {
        return url.to_string();
    }
    rewrite(url, r"^https://([^/]+)/(.*)$", "git@$1:$2")
}

/// `git@host:path` -> `https://host/path`. HTTPS input is returned as is.
pub fn to_https(url: &str) -> String {
    if url.starts_with("https://") {
        return url.to_string();
    }
    rewrite(url, r"^git@([^:]+):(.*)$", "https://$1/$2")
}

/// Drop `user[:password]@` from an http(s) URL.
pub fn strip_credentials(url: &str) -> String {
    rewrite(url, r"^(https?://)[^@/]+@(.*)$", "$1$2")
}

fn rewrite(url: &str, pattern: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace(url, replacement).into_owned(),
        Err(_) => url.to_string(),
    }
}
