//! Agent module - conversation handling
//!
//! The [`Dispatcher`] is the consumer side of the message bus. For every
//! inbound message it decides whether to ignore it, greet, hand it to the
//! delegation state machine, or answer it with text generation using the
//! user's session history.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│ Dispatcher  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │ (OpenRouter)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       │        │
//!                       ▼        ▼
//!              ┌─────────────┐ ┌─────────────┐
//!              │   Session   │ │ Delegation  │
//!              │    Store    │ │   Machine   │
//!              └─────────────┘ └─────────────┘
//! ```

pub mod dispatcher;

pub use dispatcher::{Dispatcher, Route};
