// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for external AI providers (Anthropic, OpenAI, etc.).

use async_trait::async_trait;

use crate::error::TollgateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{GenerateRequest, GenerateResponse};

/// Adapter for one external AI provider.
///
/// The broker depends only on this contract. Transport details (HTTP, auth
/// headers, transport-level retries) stay inside the implementation.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Generates text for a prompt and reports the tokens it consumed.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, TollgateError>;
}
