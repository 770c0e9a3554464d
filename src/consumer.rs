//! # Consumer Extension Points
//!
//! User business logic implements [`Consumer`]; the
//! [`ExecutionEngine`](crate::engine::ExecutionEngine) drives it through
//! the per-message lifecycle.
//!
//! ```rust,no_run
//! use amqp_harness::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Consumer for Greeter {
//!     async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
//!         let name = ctx
//!             .body()?
//!             .as_value()
//!             .and_then(|v| v["name"].as_str())
//!             .ok_or_else(|| ConsumerError::message("missing name"))?
//!             .to_string();
//!         ctx.stats_incr("greetings", 1);
//!         ctx.reply(format!("hello {name}"), Properties::new(), ReplyOptions::new())
//!             .await?;
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::config::ConsumerConfig;
use crate::context::MessageContext;
use crate::error::{ConsumerError, ConsumerResult};
use crate::messaging::Message;

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once before the first message is executed
    async fn initialize(&mut self, config: &ConsumerConfig) -> ConsumerResult<()> {
        let _ = config;
        Ok(())
    }

    /// Runs before [`process`](Consumer::process). Calling
    /// [`MessageContext::finish`] here skips `process`.
    async fn prepare(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Business logic for one message
    async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        let _ = ctx;
        Err(ConsumerError::not_implemented("process"))
    }

    /// Runs exactly once per message after `prepare`/`process`, whatever
    /// their result
    async fn on_finish(&self, ctx: &mut MessageContext<'_>) {
        let _ = ctx;
    }

    /// Duration key the age of `message` is recorded under
    fn message_age_key(&self, message: &Message, config: &ConsumerConfig) -> String {
        let _ = message;
        config.message_age_key.clone()
    }

    /// The broker blocked publishing on `connection`
    async fn on_blocked(&self, connection: &str) {
        let _ = connection;
    }

    /// The broker unblocked publishing on `connection`
    async fn on_unblocked(&self, connection: &str) {
        let _ = connection;
    }

    /// Called once when the consumer is stopped
    async fn shutdown(&self) {}
}
