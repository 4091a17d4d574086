//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）以及植物人设生成器

pub mod mock;
pub mod openai;
pub mod persona;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use persona::{MessageGenerator, PersonaGenerator, DEFAULT_CAREGIVERS, RESPONSE_MAX_WORDS};
pub use traits::LlmClient;
