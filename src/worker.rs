use crate::{
    decide, decode, DeadLetterSink, Error, FailureInjector, HandlerError, Message, MessageHandler,
    NeverFail, Outcome, QueueDeadLetterSink, QueueTransport, Result, RuntimeStats, StatsSnapshot,
    Subscription,
};
use prometheus_client::registry::Registry;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const METRICS_PREFIX: &str = "ingest";
const QUEUE_LABEL: &str = "queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Subscribed,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub queue: String,
    pub durable: bool,
    pub dead_letter_queue: Option<String>,
    pub shutdown_grace: Duration,
}

impl RuntimeConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            durable: true,
            dead_letter_queue: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = Some(queue.into());
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Cloneable control over a running [`ConsumerRuntime`].
#[derive(Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
    state: Arc<watch::Sender<RuntimeState>>,
    stats: Arc<RuntimeStats>,
}

impl StopHandle {
    /// Asks the runtime to drain. A running runtime reports `Draining` right
    /// away; a handler call already in progress runs to completion and no
    /// further delivery is taken.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("Stop requested");
            self.cancel.cancel();
        }
        begin_draining(&self.state);
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub async fn stopped(&self) {
        let mut state = self.state.subscribe();
        // the sender only goes away with the runtime, which is as good as stopped
        let _ = state.wait_for(|s| *s == RuntimeState::Stopped).await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

// Running -> Draining only; any other state is left alone.
fn begin_draining(state: &watch::Sender<RuntimeState>) {
    let changed = state.send_if_modified(|s| {
        if *s == RuntimeState::Running {
            *s = RuntimeState::Draining;
            true
        } else {
            false
        }
    });
    if changed {
        log::debug!("Runtime: Running -> Draining");
    }
}

enum Flow {
    Continue,
    Halt,
}

/// Pulls messages from one queue subscription and pushes each through
/// decode, handler, outcome policy and disposition on a single task.
///
/// Every delivery is acknowledged on the source queue once it has been
/// disposed of, whatever the outcome. A rejected message is forwarded to the
/// dead-letter sink before that ack, so durability of failed work is the
/// sink's job.
///
/// The transport is shared. Stopping a runtime closes its own subscription
/// only; closing the transport is left to whoever built it, so several
/// runtimes can consume the same queue side by side.
pub struct ConsumerRuntime<T: QueueTransport, H: MessageHandler> {
    transport: Arc<T>,
    handler: H,
    config: RuntimeConfig,
    injector: Box<dyn FailureInjector>,
    dead_letter_sink: Option<Arc<dyn DeadLetterSink>>,
    subscription: Option<T::Subscription>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<RuntimeState>>,
    stats: Arc<RuntimeStats>,
}

impl<T: QueueTransport + 'static, H: MessageHandler> ConsumerRuntime<T, H> {
    pub fn new(transport: Arc<T>, handler: H, config: RuntimeConfig) -> Self {
        let (state, _) = watch::channel(RuntimeState::Idle);
        Self {
            transport,
            handler,
            config,
            injector: Box::new(NeverFail),
            dead_letter_sink: None,
            subscription: None,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            stats: Arc::new(RuntimeStats::default()),
        }
    }

    /// Overrides the queue-backed sink built from `dead_letter_queue`.
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter_sink = Some(sink);
        self
    }

    pub fn with_failure_injector(mut self, injector: impl FailureInjector + 'static) -> Self {
        self.injector = Box::new(injector);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Registers this runtime's counters under `ingest_*`, labelled with the
    /// source queue name.
    pub fn register_metrics(&self, registry: &mut Registry) {
        let registry = registry
            .sub_registry_with_prefix(METRICS_PREFIX)
            .sub_registry_with_label((
                Cow::Borrowed(QUEUE_LABEL),
                Cow::Owned(self.config.queue.clone()),
            ));
        self.stats.register(registry);
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Declares the queues and opens the subscription. Failures here are
    /// startup failures; the runtime stays `Idle`.
    pub async fn subscribe(&mut self) -> Result<()> {
        self.expect_state(RuntimeState::Idle)?;

        let queue = self
            .transport
            .declare_queue(&self.config.queue, self.config.durable)
            .await?;

        if self.dead_letter_sink.is_none() {
            if let Some(name) = &self.config.dead_letter_queue {
                let dlq = self.transport.declare_queue(name, self.config.durable).await?;
                log::info!("Declared dead letter queue {}", dlq.name);
                self.dead_letter_sink =
                    Some(Arc::new(QueueDeadLetterSink::new(self.transport.clone(), dlq)));
            }
        }
        if self.dead_letter_sink.is_none() {
            log::warn!(
                "No dead letter sink for {}; rejected messages will be lost",
                queue.name
            );
        }

        self.subscription = Some(self.transport.subscribe(&queue).await?);
        log::info!("Subscribed to {}", queue.name);
        self.transition(RuntimeState::Subscribed);
        Ok(())
    }

    /// Consumes until stopped, halted by the handler, or the subscription
    /// ends, then drains and closes the subscription.
    pub async fn run(&mut self) -> Result<()> {
        self.expect_state(RuntimeState::Subscribed)?;
        let mut subscription = self
            .subscription
            .take()
            .ok_or_else(|| Error::State("no open subscription".into()))?;
        self.transition(RuntimeState::Running);

        loop {
            let delivery = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                delivery = subscription.next_delivery() => delivery,
            };

            let message = match delivery {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    log::error!("Failed to get messages with error: {e}");
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
                None => {
                    log::info!("Subscription to {} ended", self.config.queue);
                    break;
                }
            };

            if let Flow::Halt = self.process_message(&mut subscription, message).await {
                self.cancel.cancel();
                break;
            }
        }

        begin_draining(&self.state);
        self.close(subscription).await;
        Ok(())
    }

    async fn process_message(
        &mut self,
        subscription: &mut T::Subscription,
        message: Message,
    ) -> Flow {
        self.stats.delivered();

        let record = match decode(message.payload()) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Dropping malformed message {}: {e}", message.tag());
                self.stats.decode_failed();
                self.ack(subscription, &message).await;
                return Flow::Continue;
            }
        };

        let injected = self.injector.should_fail();
        let mut flow = Flow::Continue;
        let succeeded = if injected {
            log::warn!("Injected failure for message {}", message.tag());
            false
        } else {
            match self.handler.handle(record).await {
                Ok(()) => true,
                Err(HandlerError::Failed(reason)) => {
                    log::warn!("Failed to process message {}: {reason}", message.tag());
                    false
                }
                Err(HandlerError::Halt(reason)) => {
                    log::error!(
                        "Message {} halted consumption: {reason}. Stopping consumer.",
                        message.tag()
                    );
                    flow = Flow::Halt;
                    false
                }
            }
        };

        match decide(succeeded, injected) {
            Outcome::Accept => {
                log::debug!("Successfully processed message {}", message.tag());
                self.stats.accepted();
            }
            Outcome::Reject => {
                self.stats.rejected();
                self.dead_letter(&message).await;
            }
        }

        self.ack(subscription, &message).await;
        flow
    }

    async fn dead_letter(&mut self, message: &Message) {
        let Some(sink) = &self.dead_letter_sink else {
            log::error!(
                "Message {} rejected with no dead letter sink; it is lost",
                message.tag()
            );
            self.stats.lost(1);
            return;
        };

        match sink.forward(message).await {
            Ok(()) => {
                log::info!("Sent message {} to dead letter sink", message.tag());
                self.stats.dead_lettered();
            }
            Err(e) => {
                log::error!("Message {} is lost: {e}", message.tag());
                self.stats.forward_failed();
                self.stats.lost(1);
            }
        }
    }

    async fn ack(&mut self, subscription: &mut T::Subscription, message: &Message) {
        match subscription.ack(message).await {
            Ok(()) => {
                log::debug!("Acknowledged message {}", message.tag());
                self.stats.acked();
            }
            Err(e) => {
                log::error!("Failed to acknowledge message {}: {e}", message.tag());
                self.stats.ack_failed();
            }
        }
    }

    async fn close(&mut self, mut subscription: T::Subscription) {
        let lost = self.handler.shutdown(self.config.shutdown_grace).await;
        if lost > 0 {
            log::error!("{lost} records were lost while draining {}", self.config.queue);
            self.stats.lost(lost as u64);
        }
        if let Err(e) = subscription.close().await {
            log::error!("Error closing subscription: {e}");
        }
        self.transition(RuntimeState::Stopped);
        log::info!("Consumer for {} stopped", self.config.queue);
    }

    fn expect_state(&self, expected: RuntimeState) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(Error::State(format!(
                "expected runtime to be {expected:?}, it is {current:?}"
            )));
        }
        Ok(())
    }

    fn transition(&self, next: RuntimeState) {
        let previous = self.state.send_replace(next);
        log::debug!("Runtime for {}: {previous:?} -> {next:?}", self.config.queue);
    }
}

/// Subscribes, runs the runtime on its own task until `shutdown` resolves,
/// then gives it `drain_deadline` to stop. Errors only on startup failure or
/// when draining overruns the deadline. The transport stays open for its
/// owner to close.
pub async fn serve<T, H, F>(
    mut runtime: ConsumerRuntime<T, H>,
    shutdown: F,
    drain_deadline: Duration,
) -> Result<StatsSnapshot>
where
    T: QueueTransport + 'static,
    H: MessageHandler + 'static,
    F: Future<Output = ()>,
{
    runtime.subscribe().await?;
    let handle = runtime.stop_handle();
    let mut worker = tokio::spawn(async move { runtime.run().await });

    tokio::select! {
        res = &mut worker => {
            res??;
            return Ok(handle.stats());
        }
        _ = shutdown => {
            log::info!("Received termination signal. Stopping consumer...");
            handle.stop();
        }
    }

    match tokio::time::timeout(drain_deadline, worker).await {
        Ok(res) => {
            res??;
            Ok(handle.stats())
        }
        Err(_) => {
            log::error!("Consumer did not drain within {drain_deadline:?}");
            Err(Error::DrainTimeout(drain_deadline))
        }
    }
}
