// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Database Module
//!
//! Provides SurrealDB embedded database functionality for the connector
//! runtime.
//!
//! ## Overview
//!
//! This module contains:
//! - [`DBClient`] - Database client for CRUD operations
//! - [`schema`] - Schema definition for the credential store's backing table
//! - [`utils`] - SurrealDB-specific data sanitization helpers
//!
//! ## Database Engine
//!
//! Uses SurrealDB with an embedded RocksDB backend for local,
//! single-process persistence.

pub mod client;
pub mod schema;
pub mod utils;

pub use client::DBClient;
