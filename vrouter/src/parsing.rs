//! Loading and validating a router's configuration: its interfaces, its
//! static routes, and its static ARP table.
//!
//! All three files are line oriented. `#` starts a comment and blank lines
//! are ignored.
//!
//! ```text
//! # interfaces: <name> <ip>/<prefix-len> <mac> <bind-socket> <peer-socket>
//! eth0 192.168.1.1/24 02:00:00:00:00:01 127.0.0.1:5000 127.0.0.1:5001
//!
//! # routes: <destination> <gateway> <mask> <interface> [<metric>]
//! 10.1.0.0 192.168.1.2 255.255.0.0 eth0 1
//!
//! # arp: <ip> <mac>
//! 192.168.1.2 02:00:00:00:00:aa
//! ```

pub mod config_parser;
pub mod parser_util;

use config_parser::{parse_arp, parse_interfaces, parse_routes};
use rustc_hash::FxHashSet;
use std::{fs, net::SocketAddr, path::Path};
use vrouter_core::{
    protocols::ipv4::{Ipv4Address, Ipv4Mask},
    ArpCache, Interface, Interfaces, Mac, Router,
};

/// One line of the interfaces file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub address: Ipv4Address,
    pub mask: Ipv4Mask,
    pub mac: Mac,
    /// The local UDP socket the link is carried over.
    pub bind: SocketAddr,
    /// The UDP socket at the other end of the link.
    pub peer: SocketAddr,
    pub line: usize,
}

/// One line of the routes file. A gateway of `0.0.0.0` means the
/// destination is directly reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub destination: Ipv4Address,
    pub gateway: Ipv4Address,
    pub mask: Ipv4Mask,
    pub interface: String,
    pub metric: u8,
    pub line: usize,
}

/// One line of the ARP file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpRecord {
    pub address: Ipv4Address,
    pub mac: Mac,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Could not read {file}: {message}")]
    Io { file: String, message: String },
    #[error("{file}:{line}: {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },
    #[error("{file}:{line}: {message}")]
    Invalid {
        file: String,
        line: usize,
        message: String,
    },
    #[error("{file}: no interfaces configured")]
    NoInterfaces { file: String },
}

/// A validated router configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub interfaces: Vec<InterfaceRecord>,
    pub routes: Vec<RouteRecord>,
    pub arp: Vec<ArpRecord>,
}

impl Config {
    /// Reads, parses, and validates the configuration files.
    pub fn load(interfaces: &Path, routes: Option<&Path>, arp: &Path) -> Result<Self, ConfigError> {
        let interfaces = read(interfaces)?;
        let routes = routes.map(read).transpose()?;
        let arp = read(arp)?;
        Self::parse(
            (interfaces.0.as_str(), interfaces.1.as_str()),
            routes
                .as_ref()
                .map(|(file, contents)| (file.as_str(), contents.as_str())),
            (arp.0.as_str(), arp.1.as_str()),
        )
    }

    /// Parses and validates configuration text. Each argument is a file name
    /// used in diagnostics and the file's contents.
    pub fn parse(
        interfaces: (&str, &str),
        routes: Option<(&str, &str)>,
        arp: (&str, &str),
    ) -> Result<Self, ConfigError> {
        let config = Self {
            interfaces: parse_interfaces(interfaces.0, interfaces.1)?,
            routes: match routes {
                Some((file, contents)) => parse_routes(file, contents)?,
                None => vec![],
            },
            arp: parse_arp(arp.0, arp.1)?,
        };
        config.validate(interfaces.0, routes.map(|(file, _)| file).unwrap_or(""))?;
        Ok(config)
    }

    fn validate(&self, interfaces_file: &str, routes_file: &str) -> Result<(), ConfigError> {
        if self.interfaces.is_empty() {
            Err(ConfigError::NoInterfaces {
                file: interfaces_file.to_string(),
            })?
        }
        let invalid = |file: &str, line, message| ConfigError::Invalid {
            file: file.to_string(),
            line,
            message,
        };

        let mut names = FxHashSet::default();
        let mut macs = FxHashSet::default();
        for iface in self.interfaces.iter() {
            if !names.insert(iface.name.as_str()) {
                Err(invalid(
                    interfaces_file,
                    iface.line,
                    format!("duplicate interface name '{}'", iface.name),
                ))?
            }
            if !macs.insert(iface.mac) {
                Err(invalid(
                    interfaces_file,
                    iface.line,
                    format!("interface '{}' reuses another interface's MAC", iface.name),
                ))?
            }
        }

        for route in self.routes.iter() {
            if route.mask.apply(route.destination) != route.destination {
                Err(invalid(
                    routes_file,
                    route.line,
                    format!(
                        "destination {} has bits outside mask {}",
                        route.destination, route.mask
                    ),
                ))?
            }
            if !names.contains(route.interface.as_str()) {
                Err(invalid(
                    routes_file,
                    route.line,
                    format!("unknown interface '{}'", route.interface),
                ))?
            }
        }
        Ok(())
    }

    /// The router's interfaces, in file order.
    pub fn interface_set(&self) -> Interfaces {
        Interfaces::new(self.interfaces.iter().map(|iface| Interface {
            slot: 0,
            name: iface.name.clone(),
            address: iface.address,
            mask: iface.mask,
            mac: iface.mac,
        }))
    }

    pub fn arp_cache(&self) -> ArpCache {
        self.arp.iter().map(|record| (record.address, record.mac)).collect()
    }

    /// Adds the static routes to `router`, whose interfaces must have been
    /// built from this configuration.
    pub fn install_routes(&self, router: &Router) {
        let interfaces = router.table().interfaces();
        for route in self.routes.iter() {
            match interfaces.by_name(&route.interface) {
                Some(iface) => router.add_static_route(
                    route.destination,
                    route.gateway,
                    route.mask,
                    iface.slot,
                    route.metric,
                ),
                None => tracing::warn!(interface = %route.interface, "No such interface for static route"),
            }
        }
    }
}

fn read(path: &Path) -> Result<(String, String), ConfigError> {
    let file = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(contents) => Ok((file, contents)),
        Err(e) => Err(ConfigError::Io {
            file,
            message: e.to_string(),
        }),
    }
}
