use std::fmt;

use reqwest::RequestBuilder;

/// Access token for bearer authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Credential material attached when the server answers 401.
///
/// Owned by a single client and never mutated after construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
    Bearer(Token),
}

impl Credentials {
    /// Picks the auth mode from whatever the user supplied. A token wins over
    /// a username/password pair.
    pub fn from_parts(
        token: Option<Token>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        match (token, username) {
            (Some(token), _) => Self::Bearer(token),
            (None, Some(username)) => Self::Basic {
                username,
                password: password.unwrap_or_default(),
            },
            (None, None) => Self::Anonymous,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Anonymous => request,
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Bearer(token) => request.bearer_auth(token.as_str()),
        }
    }
}
