//! One-line coordinator descriptions.
//!
//! ```text
//! bridgesender name=send upstream=source:token instance=7 products="hits:,clusters:*"
//! ```
//!
//! A description is a coordinator kind followed by whitespace separated
//! `key=value` properties. No whitespace is allowed around `=`. A value is
//! either a quoted string (single or double quotes, no escapes) or a bare word
//! running up to the next whitespace; a bare word that reads as a signed
//! 64-bit integer becomes [`PropertyValue::Integer`].

use crate::error::{Error, Result};
use winnow::Parser;
use winnow::ascii::{multispace0, multispace1};
use winnow::combinator::{alt, delimited, preceded, repeat, separated_pair};
use winnow::error::{StrContext, StrContextValue};
use winnow::token::{one_of, take_till, take_while};

/// Kind and properties of a parsed description.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDescription {
    /// Coordinator kind, e.g. `bridgesender`.
    pub kind: String,
    /// Properties in description order. Repeated keys are kept.
    pub properties: Vec<(String, PropertyValue)>,
}

/// Value of a description property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Quoted string, or a bare word that is not an integer.
    Text(String),
    /// Bare word holding a signed integer.
    Integer(i64),
}

impl PropertyValue {
    fn from_word(word: &str) -> Self {
        match word.parse() {
            Ok(value) => PropertyValue::Integer(value),
            Err(_) => PropertyValue::Text(word.to_owned()),
        }
    }

    /// The value as written.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::Text(text) => text.clone(),
            PropertyValue::Integer(value) => value.to_string(),
        }
    }

    /// The value as an integer, if it is one. Quoted digits count.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(value) => Some(*value),
            PropertyValue::Text(text) => text.parse().ok(),
        }
    }
}

/// Parse one coordinator description.
///
/// ```rust
/// use parallax_bridge::config::{PropertyValue, parse_description};
///
/// let parsed = parse_description("bridgereceiver name=recv instance=7").unwrap();
/// assert_eq!(parsed.kind, "bridgereceiver");
/// assert_eq!(parsed.properties[1].1, PropertyValue::Integer(7));
/// ```
pub fn parse_description(input: &str) -> Result<ParsedDescription> {
    delimited(multispace0, description, multispace0)
        .parse(input)
        .map_err(|e| Error::Configuration(format!("invalid description: {e}")))
}

fn description(input: &mut &str) -> winnow::Result<ParsedDescription> {
    let kind = name
        .context(StrContext::Label("coordinator kind"))
        .parse_next(input)?;
    let properties = repeat(0.., preceded(multispace1, property)).parse_next(input)?;
    Ok(ParsedDescription {
        kind: kind.to_owned(),
        properties,
    })
}

/// Letter followed by letters, digits, `_` or `-`.
fn name<'i>(input: &mut &'i str) -> winnow::Result<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic()),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

fn property(input: &mut &str) -> winnow::Result<(String, PropertyValue)> {
    separated_pair(name, '=', value)
        .map(|(key, value): (&str, PropertyValue)| (key.to_owned(), value))
        .parse_next(input)
}

fn value(input: &mut &str) -> winnow::Result<PropertyValue> {
    alt((
        quoted.map(PropertyValue::Text),
        bare_word.map(PropertyValue::from_word),
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "quoted string or bare word",
    )))
    .parse_next(input)
}

fn quoted(input: &mut &str) -> winnow::Result<String> {
    let quote: char = one_of(['"', '\'']).parse_next(input)?;
    let body = take_till(0.., quote).parse_next(input)?;
    one_of(quote).parse_next(input)?;
    Ok(body.to_owned())
}

fn bare_word<'i>(input: &mut &'i str) -> winnow::Result<&'i str> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '"' && c != '\'').parse_next(input)
}
