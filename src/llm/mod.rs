//! Language-model access.
//!
//! Handlers talk to an [`LlmProvider`]; the only backend is OpenAI, reached
//! through rig-core.

pub mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::LlmError;

/// Create the configured provider.
pub fn create_provider(api_key: &SecretString, model: &str) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(api_key, model)?;
    tracing::info!("Using OpenAI (model: {})", model);
    Ok(Arc::new(provider))
}
