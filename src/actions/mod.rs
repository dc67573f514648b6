//! Actions: the action vocabulary, plan validation and execution.

mod handler;
mod types;
mod validator;

pub use handler::{ActionHandler, DEFAULT_MAX_WAIT};
pub use types::{
    ActionDescriptor, ActionError, ActionOutcome, ActionType, BrowserAction, OutcomeStatus,
    DEFAULT_CLARIFY_QUESTION, DEFAULT_SCROLL_PIXELS, DEFAULT_WAIT_TIMEOUT_MS,
};
pub use validator::{strip_code_fences, validate_plan, ValidationError};
