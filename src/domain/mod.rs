// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Domain Models
//!
//! Value objects with validation invariants used by every provisioning unit.
//!
//! - [`Cidr`] - canonical IPv4 network block with subnet carving
//! - [`Site`] - on-premises or cloud network
//! - [`SubnetType`] - subnet placement class

pub mod network;

pub use network::{Cidr, NetworkError, Site, SubnetType};
