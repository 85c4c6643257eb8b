//! Line parsers for the three configuration files.

use super::{
    parser_util::{cidr, describe, ipv4, lines, mac, mask, metric, name, socket, Res},
    ArpRecord, ConfigError, InterfaceRecord, RouteRecord,
};
use nom::{
    character::complete::{space0, space1},
    combinator::{all_consuming, opt},
    sequence::{preceded, terminated, tuple},
    Finish,
};

/// `<name> <ip>/<prefix-len> <mac> <bind-socket> <peer-socket>`
fn interface_line(input: &str) -> Res<&str, InterfaceRecord> {
    let (input, (name, (address, mask), mac, bind, peer)) = tuple((
        name,
        preceded(space1, cidr),
        preceded(space1, mac),
        preceded(space1, socket),
        preceded(space1, socket),
    ))(input)?;
    Ok((
        input,
        InterfaceRecord {
            name: name.to_string(),
            address,
            mask,
            mac,
            bind,
            peer,
            line: 0,
        },
    ))
}

/// `<destination> <gateway> <mask> <interface-name> [<metric>]`
fn route_line(input: &str) -> Res<&str, RouteRecord> {
    let (input, (destination, gateway, mask, interface, metric)) = tuple((
        ipv4,
        preceded(space1, ipv4),
        preceded(space1, mask),
        preceded(space1, name),
        opt(preceded(space1, metric)),
    ))(input)?;
    Ok((
        input,
        RouteRecord {
            destination,
            gateway,
            mask,
            interface: interface.to_string(),
            metric: metric.unwrap_or(0),
            line: 0,
        },
    ))
}

/// `<ip> <mac>`
fn arp_line(input: &str) -> Res<&str, ArpRecord> {
    let (input, (address, mac)) = tuple((ipv4, preceded(space1, mac)))(input)?;
    Ok((input, ArpRecord { address, mac }))
}

/// Runs `parser` over every meaningful line of `contents`, which must each
/// be consumed entirely.
fn parse_lines<T>(
    file: &str,
    contents: &str,
    parser: fn(&str) -> Res<&str, T>,
) -> Result<Vec<(usize, T)>, ConfigError> {
    lines(contents)
        .map(|(line, text)| {
            all_consuming(terminated(parser, space0))(text)
                .finish()
                .map(|(_, record)| (line, record))
                .map_err(|e| ConfigError::Syntax {
                    file: file.to_string(),
                    line,
                    message: describe(&e),
                })
        })
        .collect()
}

pub fn parse_interfaces(file: &str, contents: &str) -> Result<Vec<InterfaceRecord>, ConfigError> {
    Ok(parse_lines(file, contents, interface_line)?
        .into_iter()
        .map(|(line, record)| InterfaceRecord { line, ..record })
        .collect())
}

pub fn parse_routes(file: &str, contents: &str) -> Result<Vec<RouteRecord>, ConfigError> {
    Ok(parse_lines(file, contents, route_line)?
        .into_iter()
        .map(|(line, record)| RouteRecord { line, ..record })
        .collect())
}

pub fn parse_arp(file: &str, contents: &str) -> Result<Vec<ArpRecord>, ConfigError> {
    Ok(parse_lines(file, contents, arp_line)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}
