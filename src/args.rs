/// Command-argument resolution.
///
/// Each command declares an ordered shape of argument kinds; resolution turns
/// the raw token list into a typed [`Query`] or a single user-facing
/// [`ArgError`]. Errors follow the declared shape order and short-circuit, so
/// exactly one failure is reported per call. A handler only ever receives a
/// `Query` that passed resolution, which keeps invalid requests out of the
/// filtering and aggregation stages by construction.
use thiserror::Error;
use tracing::debug;

use crate::model::{UserTable, MAX_USERNAME_LEN, MIN_NAME_LEN};
use crate::window::Period;

/// Default upper bound for NUMBER arguments.
pub const DEFAULT_NUMBER_LIMIT: u32 = 100;

/// Kinds of positional arguments a command can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    User,
    Period,
    Number,
    Text,
}

/// Declared argument shape of a command.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    expected: Vec<(ArgKind, bool)>,
    number_limit: u32,
    min_text_len: usize,
    max_text_len: usize,
    text_label: &'static str,
}

impl ArgSpec {
    /// Shape as `(kind, optional)` pairs, in resolution/error-precedence order.
    pub fn new(expected: &[(ArgKind, bool)]) -> Self {
        Self {
            expected: expected.to_vec(),
            number_limit: DEFAULT_NUMBER_LIMIT,
            min_text_len: MIN_NAME_LEN,
            max_text_len: MAX_USERNAME_LEN,
            text_label: "Text",
        }
    }

    pub fn number_limit(mut self, limit: u32) -> Self {
        self.number_limit = limit;
        self
    }

    pub fn text_bounds(mut self, min: usize, max: usize, label: &'static str) -> Self {
        self.min_text_len = min;
        self.max_text_len = max;
        self.text_label = label;
        self
    }

    fn contains(&self, kind: ArgKind) -> bool {
        self.expected.iter().any(|(k, _)| *k == kind)
    }
}

/// Resolved filter request. Presence of this value implies resolution
/// succeeded; no error state is carried along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub period: Period,
    /// Resolved display username, `None` for "all users".
    pub user: Option<String>,
    pub number: Option<u32>,
    pub text: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            period: Period::Total,
            user: None,
            number: None,
            text: None,
        }
    }
}

/// Argument failures, rendered verbatim as the reply text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("There is no such command mode as {0}.")]
    NoSuchMode(String),
    #[error("There is no such user as {query}. Known users: {known}.")]
    NoSuchUser { query: String, known: String },
    #[error("{0} is not a valid number.")]
    InvalidNumber(String),
    #[error("Number {value} is too big. The limit is {limit}.")]
    NumberTooBig { value: u64, limit: u32 },
    #[error("Missing required {0} argument.")]
    Missing(&'static str),
    #[error("{label} must be between {min} and {max} characters long.")]
    TextLength {
        label: String,
        min: usize,
        max: usize,
    },
}

/// Token claims made before per-kind validation.
#[derive(Debug, Default)]
struct Claims {
    period_token: Option<String>,
    number_token: Option<String>,
    user_query: Option<String>,
    text: Option<String>,
}

/// Assign raw tokens to the declared kinds.
///
/// TEXT swallows everything. Otherwise single-token kinds (PERIOD, NUMBER)
/// claim from the tail when a USER kind is present (the user query is the
/// free-form remainder), and from the front when it is not. When both a USER
/// kind and an optional tail kind are declared, the tail token is only
/// claimed if it actually parses, so an unmatched token falls through to the
/// username lookup instead of a mode error.
fn claim_tokens(tokens: &[String], spec: &ArgSpec) -> Claims {
    let mut claims = Claims::default();
    let mut rest: Vec<String> = tokens.to_vec();

    if spec.contains(ArgKind::Text) {
        if !rest.is_empty() {
            claims.text = Some(rest.join(" "));
        }
        return claims;
    }

    let has_user = spec.contains(ArgKind::User);

    for &(kind, optional) in spec.expected.iter().rev() {
        match kind {
            ArgKind::Period if has_user => {
                let claim = match rest.last() {
                    Some(token) => !optional || Period::from_token(token).is_some(),
                    None => false,
                };
                if claim {
                    claims.period_token = rest.pop();
                }
            }
            ArgKind::Number if has_user => {
                let claim = rest
                    .last()
                    .map(|token| !optional || token.parse::<i64>().is_ok())
                    .unwrap_or(false);
                if claim {
                    claims.number_token = rest.pop();
                }
            }
            _ => {}
        }
    }

    if !has_user {
        for &(kind, _) in &spec.expected {
            match kind {
                ArgKind::Period if claims.period_token.is_none() && !rest.is_empty() => {
                    claims.period_token = Some(rest.remove(0));
                }
                ArgKind::Number if claims.number_token.is_none() && !rest.is_empty() => {
                    claims.number_token = Some(rest.remove(0));
                }
                _ => {}
            }
        }
        if !rest.is_empty() {
            debug!(?rest, "ignoring surplus argument tokens");
        }
        return claims;
    }

    if !rest.is_empty() {
        claims.user_query = Some(rest.join(" ").replace('@', ""));
    }
    claims
}

/// Resolve raw command tokens against a declared shape and the current user
/// table. Returns the first failure in declared-shape order.
pub fn resolve(users: &UserTable, tokens: &[String], spec: &ArgSpec) -> Result<Query, ArgError> {
    let tokens: Vec<String> = tokens
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let claims = claim_tokens(&tokens, spec);
    let mut query = Query::default();

    for (kind, optional) in &spec.expected {
        match kind {
            ArgKind::User => match &claims.user_query {
                Some(raw) => {
                    let user = users.resolve(raw).ok_or_else(|| ArgError::NoSuchUser {
                        query: raw.clone(),
                        known: users.usernames().join(", "),
                    })?;
                    query.user = Some(user.username.clone());
                }
                None if *optional => {}
                None => return Err(ArgError::Missing("user")),
            },
            ArgKind::Period => match &claims.period_token {
                Some(token) => {
                    query.period = Period::from_token(token)
                        .ok_or_else(|| ArgError::NoSuchMode(token.clone()))?;
                }
                None if *optional => {}
                None => return Err(ArgError::Missing("period")),
            },
            ArgKind::Number => match &claims.number_token {
                Some(token) => {
                    let value: u64 = token
                        .parse()
                        .map_err(|_| ArgError::InvalidNumber(token.clone()))?;
                    if value > spec.number_limit as u64 {
                        return Err(ArgError::NumberTooBig {
                            value,
                            limit: spec.number_limit,
                        });
                    }
                    query.number = Some(value as u32);
                }
                None if *optional => {}
                None => return Err(ArgError::Missing("number")),
            },
            ArgKind::Text => match &claims.text {
                Some(text) => {
                    let len = text.chars().count();
                    if len < spec.min_text_len || len > spec.max_text_len {
                        return Err(ArgError::TextLength {
                            label: spec.text_label.to_string(),
                            min: spec.min_text_len,
                            max: spec.max_text_len,
                        });
                    }
                    query.text = Some(text.clone());
                }
                None if *optional => {}
                None => return Err(ArgError::Missing("text")),
            },
        }
    }

    Ok(query)
}
