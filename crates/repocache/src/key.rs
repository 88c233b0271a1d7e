use std::fmt;

use url::Url;

/// A filesystem-safe `host/path/name` form of a remote URL.
///
/// Carries no scheme prefix, no trailing `.git`, and no trailing slash;
/// two [`NormalizedUrl`]s are equal exactly when they are equal strings.
/// Produced only by [`normalize`], never constructed directly, so that the
/// invariant always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ordered triple `(NormalizedURL, Ref, CacheKey)` identifying a
/// checkout. Renders as `normalizedURL/ref/cacheKey`, the same string used
/// as both the index's primary key and the checkout's on-disk directory
/// (relative to the checkout root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub url: NormalizedUrl,
    pub r#ref: String,
    pub cache_key: String,
}

impl CompositeKey {
    #[must_use]
    pub fn new(url: NormalizedUrl, r#ref: impl Into<String>, cache_key: impl Into<String>) -> Self {
        Self {
            url,
            r#ref: r#ref.into(),
            cache_key: cache_key.into(),
        }
    }

    /// The relative directory a checkout for this key lives at, under the
    /// checkout root: `normalizedURL/ref/cacheKey`.
    #[must_use]
    pub fn relative_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(self.url.as_str())
            .join(&self.r#ref)
            .join(&self.cache_key)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.url, self.r#ref, self.cache_key)
    }
}

/// Turns a raw remote URL into a [`NormalizedUrl`].
///
/// Steps, applied in order:
/// 1. Strip one trailing `.git` if present.
/// 2. If the string has an `@` and a `:` but no `://`, treat it as the SSH
///    shorthand `user@host:path`: drop `user@` and replace the first `:`
///    with `/`.
/// 3. Otherwise, parse it as a [`Url`]. For `http`/`https` the result is
///    `host` + `path`; for any other scheme (`file`, `ssh`, `git`, ...)
///    the scheme name is kept as a leading path segment (and userinfo
///    dropped), since discarding it would collide unrelated remotes
///    reachable through different schemes onto the same bare directory.
/// 4. Otherwise (no scheme to parse — already a bare `host/path`), pass
///    through unchanged.
/// 5. Trim a trailing `/`.
#[must_use]
pub fn normalize(raw: &str) -> NormalizedUrl {
    let trimmed = raw.strip_suffix(".git").unwrap_or(raw);

    let joined = if let Some(shorthand) = ssh_shorthand(trimmed) {
        shorthand
    } else if let Ok(parsed) = Url::parse(trimmed) {
        let host = parsed.host_str().unwrap_or_default();
        let path = parsed.path();
        if parsed.scheme().eq_ignore_ascii_case("http") || parsed.scheme().eq_ignore_ascii_case("https") {
            format!("{host}{path}")
        } else {
            format!("{}{host}{path}", parsed.scheme())
        }
    } else {
        trimmed.to_string()
    };

    NormalizedUrl(joined.trim_end_matches('/').to_string())
}

/// Recognizes the `user@host:path` SCP-like shorthand `url::Url` cannot
/// parse (it has no scheme), turning it into `host/path`.
fn ssh_shorthand(s: &str) -> Option<String> {
    if !s.contains('@') || !s.contains(':') || s.contains("://") {
        return None;
    }
    let after_at = s.split_once('@').map(|(_, rest)| rest)?;
    let (host, path) = after_at.split_once(':')?;
    Some(format!("{host}/{path}"))
}

/// Builds the composite-key string `normalize(url)/ref/cacheKey` without
/// constructing an intermediate [`CompositeKey`].
#[must_use]
pub fn make_composite_key(url: &str, r#ref: &str, cache_key: &str) -> String {
    format!("{}/{}/{}", normalize(url), r#ref, cache_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_git_suffix() {
        assert_eq!(normalize("https://github.com/a/b.git").as_str(), "github.com/a/b");
    }

    #[test]
    fn normalizes_ssh_shorthand() {
        assert_eq!(
            normalize("git@github.com:a/b.git").as_str(),
            normalize("https://github.com/a/b.git").as_str()
        );
    }

    #[test]
    fn keeps_non_http_scheme_as_leading_segment() {
        assert_eq!(normalize("file:///src").as_str(), "file/src");
    }

    #[test]
    fn trims_trailing_slash() {
        assert_eq!(normalize("https://github.com/a/b/").as_str(), "github.com/a/b");
    }

    #[test]
    fn passes_through_bare_host_path() {
        assert_eq!(normalize("github.com/a/b").as_str(), "github.com/a/b");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("git@github.com:a/b.git");
        let twice = normalize(once.as_str());
        assert_eq!(once.as_str(), twice.as_str());
    }

    #[test]
    fn composite_key_renders_as_slash_joined_triple() {
        let key = make_composite_key("https://github.com/a/b.git", "main", "abc123");
        assert_eq!(key, "github.com/a/b/main/abc123");
    }
}
