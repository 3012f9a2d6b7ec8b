// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Aggregator XML configuration. Parsed with `roxmltree`, a read-only
//! DOM, walked the same way the original walked its `tinyxml2` tree:
//! `doc.root_element()` then repeated `children().find(|n| n.has_tag_name(...))`.

use crate::error::Error;
use crate::value::TypeCode;
use log::warn;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub port: u16,
    pub qport: Option<u16>,
    pub connections: Vec<ConnConfig>,
}

#[derive(Debug, Clone)]
pub struct ConnConfig {
    pub name: String,
    pub timeout: Duration,
    pub transport: TransportConfig,
    pub mirrors: Vec<MirroredParam>,
}

/// One remote parameter a connection mirrors locally: the name it is
/// mounted under, the PID to address it by on the remote, and its wire
/// type. There is no introspection opcode to learn this from the remote
/// itself, so it is declared alongside the connection instead.
#[derive(Debug, Clone)]
pub struct MirroredParam {
    pub name: String,
    pub remote_pid: u16,
    pub type_code: TypeCode,
}

fn parse_type_code(s: &str) -> Result<TypeCode, Error> {
    Ok(match s {
        "bool" => TypeCode::Bool,
        "int8" => TypeCode::Int8,
        "int16" => TypeCode::Int16,
        "int32" => TypeCode::Int32,
        "int64" => TypeCode::Int64,
        "uint8" => TypeCode::Uint8,
        "uint16" => TypeCode::Uint16,
        "uint32" => TypeCode::Uint32,
        "uint64" => TypeCode::Uint64,
        "float" => TypeCode::Float,
        "double" => TypeCode::Double,
        "str" => TypeCode::Str,
        other => return Err(config_err(format!("unknown mirror <type>: {:?}", other))),
    })
}

#[derive(Debug, Clone)]
pub enum TransportConfig {
    Udp {
        port: u16,
        dest_ip: IpAddr,
        dest_port: u16,
    },
    Slip {
        max_payload_size: usize,
        inner: SlipInnerConfig,
    },
}

#[derive(Debug, Clone)]
pub enum SlipInnerConfig {
    Tcp {
        port: u16,
        srv_ip: IpAddr,
        srv_port: u16,
    },
    Tls {
        port: u16,
        srv_ip: IpAddr,
        srv_port: u16,
        authstring: String,
    },
}

fn config_err(reason: impl Into<String>) -> Error {
    Error::Config {
        reason: reason.into(),
    }
}

fn child_text<'a>(node: roxmltree::Node<'a, 'a>, tag: &str) -> Result<&'a str, Error> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or_else(|| config_err(format!("missing <{}> element", tag)))
}

fn child_text_opt<'a>(node: roxmltree::Node<'a, 'a>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn parse_u16(s: &str, tag: &str) -> Result<u16, Error> {
    s.parse().map_err(|_| config_err(format!("<{}> is not a valid port number: {:?}", tag, s)))
}

fn parse_ip(s: &str, tag: &str) -> Result<IpAddr, Error> {
    s.parse()
        .map_err(|_| config_err(format!("<{}> is not a valid IP address: {:?}", tag, s)))
}

impl ServerConfig {
    pub fn parse(xml: &str) -> Result<ServerConfig, Error> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| config_err(format!("malformed configuration xml: {}", e)))?;
        let server = doc.root_element();
        if !server.has_tag_name("server") {
            return Err(config_err("root element must be <server>"));
        }
        let name = child_text(server, "name")?.to_string();
        let port = parse_u16(child_text(server, "port")?, "port")?;
        let qport = match child_text_opt(server, "qport") {
            Some(s) => Some(parse_u16(s, "qport")?),
            None => None,
        };
        let connections = server
            .children()
            .filter(|n| n.has_tag_name("conn"))
            .filter_map(|n| match parse_conn(n) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("aggregator config: skipping connection: {}", e);
                    None
                }
            })
            .collect();
        Ok(ServerConfig {
            name,
            port,
            qport,
            connections,
        })
    }
}

fn parse_conn(node: roxmltree::Node) -> Result<ConnConfig, Error> {
    let name = child_text(node, "name")?.to_string();
    let timeout_us: u64 = child_text(node, "timeout")?
        .parse()
        .map_err(|_| config_err("<timeout> is not a valid integer"))?;
    let transport = if let Some(udp) = node.children().find(|n| n.has_tag_name("udpsocket")) {
        parse_udp(udp)?
    } else if let Some(slip) = node.children().find(|n| n.has_tag_name("slipframer")) {
        parse_slip(slip)?
    } else {
        return Err(config_err(format!(
            "connection {:?} has no udpsocket or slipframer transport",
            name
        )));
    };
    let mirrors = node
        .children()
        .filter(|n| n.has_tag_name("mirror"))
        .filter_map(|n| match parse_mirror(n) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("aggregator config: skipping mirror under {:?}: {}", name, e);
                None
            }
        })
        .collect();
    Ok(ConnConfig {
        name,
        timeout: Duration::from_micros(timeout_us),
        transport,
        mirrors,
    })
}

fn parse_mirror(node: roxmltree::Node) -> Result<MirroredParam, Error> {
    let name = child_text(node, "name")?.to_string();
    let remote_pid = child_text(node, "pid")?
        .parse()
        .map_err(|_| config_err("<pid> is not a valid integer"))?;
    let type_code = parse_type_code(child_text(node, "type")?)?;
    Ok(MirroredParam {
        name,
        remote_pid,
        type_code,
    })
}

fn parse_udp(node: roxmltree::Node) -> Result<TransportConfig, Error> {
    let port = parse_u16(child_text(node, "port")?, "port")?;
    let dest_ip = parse_ip(child_text(node, "destipaddr")?, "destipaddr")?;
    let dest_port = parse_u16(child_text(node, "destport")?, "destport")?;
    Ok(TransportConfig::Udp {
        port,
        dest_ip,
        dest_port,
    })
}

fn parse_slip(node: roxmltree::Node) -> Result<TransportConfig, Error> {
    let max_payload_size: usize = child_text(node, "maxpldsiz")?
        .parse()
        .map_err(|_| config_err("<maxpldsiz> is not a valid integer"))?;
    let inner = if let Some(tcp) = node.children().find(|n| n.has_tag_name("tcpclient")) {
        SlipInnerConfig::Tcp {
            port: parse_u16(child_text(tcp, "port")?, "port")?,
            srv_ip: parse_ip(child_text(tcp, "srvipaddr")?, "srvipaddr")?,
            srv_port: parse_u16(child_text(tcp, "srvport")?, "srvport")?,
        }
    } else if let Some(tls) = node.children().find(|n| n.has_tag_name("tlsclient")) {
        SlipInnerConfig::Tls {
            port: parse_u16(child_text(tls, "port")?, "port")?,
            srv_ip: parse_ip(child_text(tls, "srvipaddr")?, "srvipaddr")?,
            srv_port: parse_u16(child_text(tls, "srvport")?, "srvport")?,
            authstring: child_text(tls, "authstring")?.to_string(),
        }
    } else {
        return Err(config_err("<slipframer> has no tcpclient or tlsclient child"));
    };
    Ok(TransportConfig::Slip {
        max_payload_size,
        inner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <server>
          <name>hub</name>
          <port>9000</port>
          <qport>9001</qport>
          <conn>
            <name>panel</name>
            <timeout>500000</timeout>
            <udpsocket>
              <port>9100</port>
              <destipaddr>10.0.0.5</destipaddr>
              <destport>9200</destport>
            </udpsocket>
            <mirror>
              <name>level</name>
              <pid>0</pid>
              <type>int32</type>
            </mirror>
          </conn>
          <conn>
            <name>plc</name>
            <timeout>250000</timeout>
            <slipframer>
              <maxpldsiz>1400</maxpldsiz>
              <tcpclient>
                <port>0</port>
                <srvipaddr>10.0.0.6</srvipaddr>
                <srvport>502</srvport>
              </tcpclient>
            </slipframer>
          </conn>
        </server>
    "#;

    #[test]
    fn parses_name_port_and_qport() {
        let cfg = ServerConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.name, "hub");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.qport, Some(9001));
    }

    #[test]
    fn parses_both_connection_kinds() {
        let cfg = ServerConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.connections.len(), 2);
        assert_eq!(cfg.connections[0].name, "panel");
        assert!(matches!(cfg.connections[0].transport, TransportConfig::Udp { .. }));
        assert_eq!(cfg.connections[1].name, "plc");
        assert!(matches!(cfg.connections[1].transport, TransportConfig::Slip { .. }));
    }

    #[test]
    fn parses_mirrored_parameters() {
        let cfg = ServerConfig::parse(SAMPLE).unwrap();
        let mirrors = &cfg.connections[0].mirrors;
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].name, "level");
        assert_eq!(mirrors[0].remote_pid, 0);
        assert_eq!(mirrors[0].type_code, TypeCode::Int32);
        assert!(cfg.connections[1].mirrors.is_empty());
    }

    #[test]
    fn missing_required_element_is_rejected() {
        let xml = "<server><name>x</name></server>";
        assert!(ServerConfig::parse(xml).is_err());
    }

    #[test]
    fn connection_with_no_transport_is_dropped_not_fatal() {
        let xml = r#"
            <server>
              <name>hub</name>
              <port>9000</port>
              <conn>
                <name>broken</name>
                <timeout>1000</timeout>
              </conn>
            </server>
        "#;
        let cfg = ServerConfig::parse(xml).unwrap();
        assert!(cfg.connections.is_empty());
    }
}
