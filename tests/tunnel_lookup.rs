// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tunnel configuration lookups
//!
//! Every `(tunnel, section)` pair maps onto exactly one flattened prefix;
//! anything outside the tables fails immediately with an illegal argument.

use test_case::test_case;

use vpn_sim::binding::{config_key, output_paths, BindingError, TunnelConfig};
use vpn_sim::UnitId;

#[test_case(1, "cgw", "vpn_connection.ipsec_tunnel.0.customer_gateway" ; "tunnel 1 customer side")]
#[test_case(1, "vgw", "vpn_connection.ipsec_tunnel.0.vpn_gateway" ; "tunnel 1 provider side")]
#[test_case(1, "ike", "vpn_connection.ipsec_tunnel.0.ike" ; "tunnel 1 negotiation")]
#[test_case(2, "cgw", "vpn_connection.ipsec_tunnel.1.customer_gateway" ; "tunnel 2 customer side")]
#[test_case(2, "vgw", "vpn_connection.ipsec_tunnel.1.vpn_gateway" ; "tunnel 2 provider side")]
#[test_case(2, "ike", "vpn_connection.ipsec_tunnel.1.ike" ; "tunnel 2 negotiation")]
fn test_canonical_prefix(tunnel: u8, section: &str, prefix: &str) {
    let key = config_key(tunnel, section, "field").unwrap();
    assert_eq!(key, format!("{}.field", prefix));
    assert!(output_paths().iter().any(|p| p == prefix));
}

#[test_case(3, "cgw" ; "tunnel out of range")]
#[test_case(0, "ike" ; "tunnel zero")]
#[test_case(1, "bogus" ; "unknown section")]
#[test_case(2, "CGW" ; "section is case sensitive")]
#[test_case(1, "" ; "empty section")]
fn test_illegal_argument(tunnel: u8, section: &str) {
    assert!(matches!(
        config_key(tunnel, section, "pre_shared_key"),
        Err(BindingError::IllegalArgument(_))
    ));

    let config = TunnelConfig::new(UnitId::new("gateway").child("tunnel-config"));
    assert!(matches!(
        config.get_config(tunnel, section, "pre_shared_key"),
        Err(BindingError::IllegalArgument(_))
    ));
}

#[test]
fn test_lookup_is_deterministic() {
    let config = TunnelConfig::new(UnitId::new("gateway").child("tunnel-config"));
    let a = config.get_config(2, "vgw", "bgp.asn").unwrap();
    let b = config.get_config(2, "vgw", "bgp.asn").unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a.to_string(),
        "${gateway/tunnel-config:vpn_connection.ipsec_tunnel.1.vpn_gateway.bgp.asn}"
    );
}
