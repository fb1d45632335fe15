//! Sluice LLM - backend streaming collaborators
//!
//! A provider turns one input text into a lazy, finite sequence of
//! [`ContentFragment`]s that stops when its cancellation scope fires.
//!
//! [`ContentFragment`]: sluice_core::ContentFragment

pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;

pub use error::{LlmError, Result};
pub use provider::{ChatBackend, FragmentStream, StreamProvider};
pub use providers::mock::{MockProvider, MockSettings};
pub use providers::openai::{OpenAiProvider, OpenAiSettings};
pub use registry::ProviderRegistry;
