//! Small nom parsers for the tokens that make up a configuration line.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{map_res, recognize},
    error::{context, VerboseError, VerboseErrorKind},
    sequence::{separated_pair, tuple},
    IResult,
};
use std::{net::SocketAddr, str::FromStr};
use vrouter_core::{
    network::{parse_mac, Mac},
    protocols::ipv4::{Ipv4Address, Ipv4Mask},
};

pub type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// A dotted quad such as `10.0.0.1`.
pub fn ipv4(input: &str) -> Res<&str, Ipv4Address> {
    context(
        "IPv4 address",
        map_res(
            recognize(tuple((
                digit1,
                char('.'),
                digit1,
                char('.'),
                digit1,
                char('.'),
                digit1,
            ))),
            Ipv4Address::from_str,
        ),
    )(input)
}

/// A subnet mask written as a dotted quad. Masks with holes are rejected.
pub fn mask(input: &str) -> Res<&str, Ipv4Mask> {
    context("subnet mask", map_res(ipv4, Ipv4Mask::try_from))(input)
}

/// A prefix length from 0 to 32.
fn prefix_len(input: &str) -> Res<&str, Ipv4Mask> {
    context(
        "prefix length",
        map_res(digit1, |digits: &str| match digits.parse::<u32>() {
            Ok(len) if len <= 32 => Ok(Ipv4Mask::from_bitcount(len)),
            _ => Err(()),
        }),
    )(input)
}

/// An address and prefix length such as `192.168.1.1/24`.
pub fn cidr(input: &str) -> Res<&str, (Ipv4Address, Ipv4Mask)> {
    context("CIDR address", separated_pair(ipv4, char('/'), prefix_len))(input)
}

/// Six colon separated hex octets such as `02:00:00:00:00:01`.
pub fn mac(input: &str) -> Res<&str, Mac> {
    context(
        "MAC address",
        map_res(
            take_while1(|c: char| c.is_ascii_hexdigit() || c == ':'),
            parse_mac,
        ),
    )(input)
}

/// An IP socket address such as `127.0.0.1:5000`.
pub fn socket(input: &str) -> Res<&str, SocketAddr> {
    context("socket address", map_res(token, SocketAddr::from_str))(input)
}

/// An interface name such as `eth0`.
pub fn name(input: &str) -> Res<&str, &str> {
    context(
        "interface name",
        take_while1(|c: char| c.is_ascii_alphanumeric() || "_-.".contains(c)),
    )(input)
}

/// A route metric from 0 to 16.
pub fn metric(input: &str) -> Res<&str, u8> {
    context(
        "metric",
        map_res(digit1, |digits: &str| match digits.parse::<u8>() {
            Ok(metric) if metric <= 16 => Ok(metric),
            _ => Err(()),
        }),
    )(input)
}

/// Anything up to the next whitespace.
fn token(input: &str) -> Res<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// Describes a parse failure as "expected <what> at '<text>'", using the
/// innermost context the parser recorded.
pub fn describe(error: &VerboseError<&str>) -> String {
    let expected = error.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(context) => Some(*context),
        _ => None,
    });
    let at = error
        .errors
        .first()
        .map(|(rest, _)| rest.split_whitespace().next().unwrap_or(""))
        .unwrap_or("");
    match (expected, at.is_empty()) {
        (Some(expected), false) => format!("expected {expected} at '{at}'"),
        (Some(expected), true) => format!("expected {expected} at end of line"),
        (None, false) => format!("unexpected '{at}'"),
        (None, true) => "unexpected end of line".to_string(),
    }
}

/// The meaningful lines of a configuration file with their 1-based line
/// numbers. `#` starts a comment and blank lines are skipped.
pub fn lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents.lines().enumerate().filter_map(|(i, line)| {
        let line = line.split('#').next().unwrap_or("").trim();
        (!line.is_empty()).then_some((i + 1, line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens() {
        assert_eq!(ipv4("10.0.0.1 rest"), Ok((" rest", [10, 0, 0, 1].into())));
        assert_eq!(mask("255.255.0.0"), Ok(("", Ipv4Mask::from_bitcount(16))));
        assert_eq!(
            cidr("192.168.1.1/24"),
            Ok(("", ([192, 168, 1, 1].into(), Ipv4Mask::from_bitcount(24))))
        );
        assert_eq!(mac("02:00:00:00:00:0a"), Ok(("", 0x0200_0000_000a)));
        assert_eq!(metric("16"), Ok(("", 16)));
        assert_eq!(name("eth-0.1 x"), Ok((" x", "eth-0.1")));
        assert_eq!(
            socket("127.0.0.1:5000"),
            Ok(("", "127.0.0.1:5000".parse().unwrap()))
        );
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!(ipv4("300.0.0.1").is_err());
        assert!(mask("255.0.255.0").is_err());
        assert!(cidr("10.0.0.1/33").is_err());
        assert!(mac("02:00:00").is_err());
        assert!(metric("17").is_err());
    }

    #[test]
    fn describes_failures() {
        match mask("255.0.255.0") {
            Err(nom::Err::Error(e)) => {
                assert_eq!(describe(&e), "expected subnet mask at '255.0.255.0'")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn skips_comments_and_blanks() {
        let contents = "# header\n\neth0 a # trailing\n   \nnext";
        let found: Vec<_> = lines(contents).collect();
        assert_eq!(found, [(3, "eth0 a"), (5, "next")]);
    }
}
