//! Generation side of orbit: credential rotation, model discovery and the
//! retrying [`session::GeneratorSession`] that every content path calls.

pub mod credentials;
pub mod gemini;
pub mod provider;
pub mod resolver;
pub mod session;

pub use credentials::CredentialPool;
pub use gemini::GeminiBackend;
pub use provider::{classify, FailureClass, GenerationBackend, ModelDescriptor, ProviderError};
pub use resolver::{ModelResolver, ResolvedModel, ResolverPolicy};
pub use session::{GeneratorSession, RetryPolicy};
