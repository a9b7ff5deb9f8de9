//! Tool-call assertions shared by turn-level and conversation-level validators.

pub mod conversation;
pub mod matchers;
pub mod model;
pub mod view;

pub use conversation::{build_conversation_context, ConversationContext, ToolCallRecord};
pub use model::{compile_steps, ChainStep, ChainStepConfig};
pub use view::ToolCallView;
