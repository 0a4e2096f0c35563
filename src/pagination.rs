// ABOUTME: Re-exports pagination types from gateway-core for unified type identity
// ABOUTME: Ensures PageParams/Paginated are the same type across all workspace crates
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub use gateway_core::pagination::*;
