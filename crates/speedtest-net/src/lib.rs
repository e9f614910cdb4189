// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal speedtest.net client: requester lookup, server directory, and the HTTP
//! latency/download/upload tests.

pub mod client;
pub mod error;
pub mod measure;
pub mod server;
pub mod user;

pub use client::{build_client, Client, ClientConfig};
pub use error::Error;
pub use measure::{StageConfig, TestResult};
pub use server::Server;
pub use user::User;
