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

//! Input validation for identifiers that flow into the credential
//! store's raw record-id interpolation (user id, provider id, tool id,
//! OAuth callback state). Encryption-at-rest lives in [`crate::crypto`]
//! instead of here.

pub mod validation;

pub use validation::Validator;
#[allow(unused_imports)]
pub use validation::ValidationError;
