//! Prompt construction
//!
//! ```text
//! Task ─► context packer ─► PromptBuilder ─► template sections ─► prompt text
//!                                 ▲
//!                  diagnostics / port analysis (refinement)
//! ```

pub mod builder;
pub mod exemplars;
pub mod templates;

pub use builder::{BuiltPrompt, PromptBuilder, PromptRequest};
pub use exemplars::Exemplar;
pub use templates::{Section, TemplateKind};
