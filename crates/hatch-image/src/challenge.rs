//! `WWW-Authenticate` challenge parsing using `nom`.
//!
//! Grammar (RFC 7235, restricted to one challenge with auth-params):
//!
//! ```text
//! challenge = scheme 1*SP param *( OWS "," OWS param ) OWS
//! param     = token OWS "=" OWS ( token / quoted-string )
//! ```
//!
//! Quoted values are unescaped and may contain commas, which is why the
//! header is tokenized instead of split on `,`.

use std::collections::BTreeMap;

use hatch_common::error::{HatchError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, space0, space1},
    combinator::map,
    multi::separated_list1,
    sequence::delimited,
};

/// An authorization challenge issued with a 401 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Authentication scheme, e.g. `Bearer`.
    pub scheme: String,
    /// URL of the token service.
    pub realm: String,
    /// Service name to request a token for.
    pub service: Option<String>,
    /// Scope the registry suggested, if any.
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses a `Bearer` challenge from a `WWW-Authenticate` header value.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::InvalidChallenge` if the header does not follow
    /// the grammar, uses another scheme, or lacks a `realm`.
    pub fn parse(header: &str) -> Result<Self> {
        let invalid = |message: String| HatchError::InvalidChallenge { message };

        let (rest, (scheme, params)) =
            challenge(header.trim()).map_err(|e| invalid(format!("malformed header {header:?}: {e}")))?;
        if !rest.is_empty() {
            return Err(invalid(format!("unexpected trailing input {rest:?}")));
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(invalid(format!("unsupported scheme {scheme:?}")));
        }

        let mut params: BTreeMap<String, String> = params.into_iter().collect();
        let realm = params
            .remove("realm")
            .filter(|r| !r.is_empty())
            .ok_or_else(|| invalid("missing realm".into()))?;
        if !(realm.starts_with("https://") || realm.starts_with("http://")) {
            return Err(invalid(format!("realm is not an HTTP URL: {realm}")));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service: params.remove("service"),
            scope: params.remove("scope"),
        })
    }
}

/// RFC 7230 `tchar`.
const fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(is_tchar)(input)
}

/// Parses a double-quoted string, resolving `\` escapes.
fn quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => return Ok((&input[idx + 1..], result)),
            Some((_, '\\')) => match chars.next() {
                Some((_, c)) => result.push(c),
                None => break,
            },
            Some((_, c)) => result.push(c),
            None => break,
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn param_value(input: &str) -> IResult<&str, String> {
    alt((quoted_string, map(token, str::to_string))).parse(input)
}

/// Parses one `key=value` pair; keys are lower-cased.
fn auth_param(input: &str) -> IResult<&str, (String, String)> {
    let (input, key) = token(input)?;
    let (input, _) = delimited(space0, char('='), space0).parse(input)?;
    let (input, value) = param_value(input)?;
    Ok((input, (key.to_ascii_lowercase(), value)))
}

fn challenge(input: &str) -> IResult<&str, (&str, Vec<(String, String)>)> {
    let (input, scheme) = token(input)?;
    let (input, _) = space1(input)?;
    let (input, params) =
        separated_list1(delimited(space0, char(','), space0), auth_param).parse(input)?;
    let (input, _) = space0(input)?;
    Ok((input, (scheme, params)))
}
