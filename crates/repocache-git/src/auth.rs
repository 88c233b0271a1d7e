/// Credentials supplied to [`crate::RepositoryDriver::fetch`] for
/// authenticated remotes.
///
/// Modeled on `git2::Cred`'s constructors rather than wrapping them
/// directly, so callers outside this crate never need a `git2` dependency
/// of their own.
#[derive(Clone)]
#[non_exhaustive]
pub enum GitAuth {
    /// HTTPS basic auth, e.g. a personal access token in `password`.
    UserPassword { username: String, password: String },
    /// SSH key pair authentication.
    SshKey {
        username: String,
        private_key_path: std::path::PathBuf,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::SshKey {
                username,
                private_key_path,
                ..
            } => f
                .debug_struct("SshKey")
                .field("username", username)
                .field("private_key_path", private_key_path)
                .finish(),
        }
    }
}

impl GitAuth {
    pub(crate) fn to_credentials(&self) -> impl Fn(&str, Option<&str>, git2::CredentialType) -> Result<git2::Cred, git2::Error> + '_ {
        move |_url, username_from_url, _allowed| match self {
            Self::UserPassword { username, password } => {
                git2::Cred::userpass_plaintext(username, password)
            }
            Self::SshKey {
                username,
                private_key_path,
                passphrase,
            } => git2::Cred::ssh_key(
                username_from_url.unwrap_or(username),
                None,
                private_key_path,
                passphrase.as_deref(),
            ),
        }
    }
}
