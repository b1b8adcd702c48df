// Copyright 2025 hostwise Authors
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

//! # hostwise CLI
//!
//! Command-line front end for the hostwise dispatcher.
//!
//! ## Key Commands
//!
//! - `hostwise call`: Send one request and print the body (raw JSON for scripting)
//! - `hostwise hosts`: Print the normalized host registry
//!
//! Endpoints come from `-u` flags, then the `HOSTWISE_URLS` environment
//! variable (comma separated), then the `urls` of a `--config` file, and
//! finally the default local endpoint.

pub mod options;
