// ABOUTME: Re-exports constants from gateway-core for unified access
// ABOUTME: Cache, upstream, relay, network, and pagination defaults
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub use gateway_core::constants::*;
