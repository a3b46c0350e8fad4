// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning units of the VPN test environment
//!
//! | unit             | depends on          | output (excerpt)                          |
//! |------------------|---------------------|-------------------------------------------|
//! | `network`        |                     | VPC, subnet and route table ids per site  |
//! | `tunnel`         | `network`           | transit hub, EIP, VPN connection ids      |
//! | `gateway`        | `tunnel`            | instance id, primary attachment, secrets  |
//! | `routes`         | `tunnel`, `gateway` | route ids per site                        |
//! | `test-instances` | `routes`            | one instance per site (optional)          |
//!
//! Each unit exposes a handle whose methods return the [`DeferredValue`]s it
//! will publish, so consumers never spell output keys by hand.
//!
//! [`DeferredValue`]: crate::deferred::DeferredValue

pub mod compute;
pub mod gateway;
pub mod network;
pub mod routes;
pub mod tunnel;

pub use compute::{TestInstancesHandle, TestInstancesUnit};
pub use gateway::{GatewayHandle, GatewayProvisionerUnit, TUNNEL_CONFIG_STAGE};
pub use network::{NetworkHandle, NetworkTopologyUnit};
pub use routes::{plan_routes, NextHop, RouteBinderUnit, RouteIntent, RoutingInputs};
pub use tunnel::{TunnelHandle, TunnelProvisionerUnit};

pub const NETWORK_UNIT: &str = "network";
pub const TUNNEL_UNIT: &str = "tunnel";
pub const GATEWAY_UNIT: &str = "gateway";
pub const ROUTES_UNIT: &str = "routes";
pub const TEST_INSTANCES_UNIT: &str = "test-instances";
