#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # AMQP Harness
//!
//! Per-message execution engine for AMQP consumers.
//!
//! ## Overview
//!
//! The harness sits between a broker client and user business logic and
//! gives every delivered message the same contract: filter, decode,
//! execute, classify the result and acknowledge. User code implements
//! [`Consumer`](consumer::Consumer); the broker client calls
//! [`ExecutionEngine::execute`](engine::ExecutionEngine::execute) and maps
//! the returned [`Outcome`](outcome::Outcome) to ack/reject semantics.
//!
//! ## Module Organization
//!
//! - [`engine`] - Lifecycle, error taxonomy and republishing
//! - [`consumer`] / [`context`] - Extension points and the per-message API
//! - [`confirmation`] - Publisher confirmation tracking
//! - [`codec`] - Content-type / content-encoding negotiation
//! - [`retry`] - Poison message detection and dead-letter headers
//! - [`connection`] - The broker connection interface
//! - [`config`] - Consumer configuration
//! - [`testing`] - Mock connection and test harness
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amqp_harness::prelude::*;
//! use amqp_harness::testing::TestHarness;
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Consumer for Audit {
//!     async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
//!         if ctx.body()?.as_value().is_none() {
//!             return Err(ConsumerError::message("expected a document"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let harness = TestHarness::new(Audit, ConsumerConfig::new("audit")).with_content_negotiation();
//! let properties = Properties::new().with_content_type("application/json");
//! harness.process_message(b"{\"id\": 1}".to_vec(), properties).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod confirmation;
pub mod connection;
pub mod constants;
pub mod consumer;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod outcome;
pub mod reply;
pub mod reporting;
pub mod retry;
pub mod testing;
pub mod utils;

pub use codec::{Body, ContentCodec, ContentNegotiator};
pub use config::{ConfigLoader, ConsumerConfig, MessageTypeFilter};
pub use confirmation::{Confirmation, ConfirmationHandle, ConfirmationTracker};
pub use connection::{BrokerConnection, PublishRequest};
pub use consumer::Consumer;
pub use context::{MessageContext, PublishOptions};
pub use engine::{ExecutionEngine, ExecutionResult};
pub use error::{ConsumerError, ConsumerResult, ErrorKind};
pub use messaging::{Measurement, Message, Properties};
pub use outcome::{Disposition, Outcome};

/// Common imports for consumer implementations
pub mod prelude {
    pub use crate::codec::Body;
    pub use crate::config::ConsumerConfig;
    pub use crate::confirmation::Confirmation;
    pub use crate::consumer::Consumer;
    pub use crate::context::{MessageContext, PublishOptions};
    pub use crate::engine::ExecutionEngine;
    pub use crate::error::{ConsumerError, ConsumerResult};
    pub use crate::messaging::{Message, Properties};
    pub use crate::outcome::Outcome;
    pub use crate::reply::ReplyOptions;
}
