//! Consumers used by the integration tests

use std::sync::atomic::{AtomicUsize, Ordering};

use amqp_harness::codec::{Body, CodecResult, ContentCodec, ContentNegotiator, EncodeOptions};
use amqp_harness::prelude::*;
use amqp_harness::ConfirmationHandle;
use async_trait::async_trait;
use parking_lot::Mutex;

/// What [`ScriptedConsumer`] does with each message
#[derive(Debug, Clone, Copy, Default)]
pub enum Script {
    #[default]
    Succeed,
    FinishInPrepare,
    FailInPrepare(fn() -> ConsumerError),
    FailInProcess(fn() -> ConsumerError),
    FinishTwiceThenFail(fn() -> ConsumerError),
}

/// Counts hook invocations and follows a [`Script`]
#[derive(Debug, Default)]
pub struct ScriptedConsumer {
    pub script: Script,
    pub prepared: AtomicUsize,
    pub processed: AtomicUsize,
    pub finished: AtomicUsize,
}

impl ScriptedConsumer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.prepared.load(Ordering::SeqCst),
            self.processed.load(Ordering::SeqCst),
            self.finished.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    async fn prepare(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::FinishInPrepare => ctx.finish(),
            Script::FailInPrepare(make) => return Err(make()),
            _ => {}
        }
        Ok(())
    }

    async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        self.processed.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::FailInProcess(make) => Err(make()),
            Script::FinishTwiceThenFail(make) => {
                ctx.finish();
                ctx.finish();
                Err(make())
            }
            _ => Ok(()),
        }
    }

    async fn on_finish(&self, _ctx: &mut MessageContext<'_>) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Publishes `count` JSON documents to `events`/`created` and records how
/// each confirmation resolved, or `None` while still pending
#[derive(Debug, Default)]
pub struct PublishingConsumer {
    pub count: usize,
    pub await_first: usize,
    pub results: Mutex<Vec<Option<Confirmation>>>,
}

impl PublishingConsumer {
    pub fn new(count: usize, await_first: usize) -> Self {
        Self {
            count,
            await_first,
            results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Consumer for PublishingConsumer {
    async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        let mut handles: Vec<ConfirmationHandle> = Vec::new();
        for index in 0..self.count {
            let handle = ctx
                .publish_message(
                    "events",
                    "created",
                    Properties::new(),
                    format!("message {index}"),
                    PublishOptions::new(),
                )
                .await?;
            handles.extend(handle);
        }

        let mut results = Vec::new();
        for (index, mut handle) in handles.into_iter().enumerate() {
            if index < self.await_first {
                results.push(Some(handle.await));
            } else {
                results.push(handle.try_result());
            }
        }
        *self.results.lock() = results;
        Ok(())
    }
}

/// Replies to every message with a fixed body
#[derive(Debug, Default)]
pub struct ReplyingConsumer {
    pub reply_to: Option<String>,
}

#[async_trait]
impl Consumer for ReplyingConsumer {
    async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        let mut options = ReplyOptions::new();
        if let Some(reply_to) = &self.reply_to {
            options = options.reply_to(reply_to.clone());
        }
        ctx.reply("pong", Properties::new(), options).await?;
        Ok(())
    }
}

/// Reads the decoded body twice and keeps a copy of it
#[derive(Debug, Default)]
pub struct BodyCapture {
    pub body: Mutex<Option<Body>>,
}

#[async_trait]
impl Consumer for BodyCapture {
    async fn process(&self, ctx: &mut MessageContext<'_>) -> ConsumerResult<()> {
        let first = ctx.body()?.clone();
        let second = ctx.body()?;
        assert_eq!(&first, second);
        *self.body.lock() = Some(first);
        Ok(())
    }
}

/// [`ContentNegotiator`] that counts decode invocations
#[derive(Debug, Default)]
pub struct CountingCodec {
    pub inner: ContentNegotiator,
    pub decodes: AtomicUsize,
}

impl ContentCodec for CountingCodec {
    fn decode(&self, message: &Message) -> CodecResult<Body> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(message)
    }

    fn encode(
        &self,
        properties: &Properties,
        body: &Body,
        options: EncodeOptions,
    ) -> CodecResult<Vec<u8>> {
        self.inner.encode(properties, body, options)
    }
}
