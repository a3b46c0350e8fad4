// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of the flattening used for tunnel configuration and of the
//! deployment ordering.

mod flatten;
mod graph_order;
