use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Topic published whenever route or policy tables change.
pub const ROUTE_REFRESH_TOPIC: &str = "route.refresh";

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, topic: &str);
}

pub trait ChangeChannel: Send + Sync {
    fn subscribe(&self, topic: &str, handler: Arc<dyn ChangeHandler>) -> SubscriptionId;
    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool;
}

/// In-process fan-out of zero-payload change signals.
pub struct InMemoryChangeChannel {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, Arc<dyn ChangeHandler>)>>>,
    next_id: AtomicU64,
}

impl InMemoryChangeChannel {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Delivers `topic` to every subscriber and returns how many there were.
    /// Handlers run on the caller's thread, outside the registry lock.
    pub fn publish(&self, topic: &str) -> usize {
        let targets: Vec<Arc<dyn ChangeHandler>> = self
            .handlers
            .lock()
            .get(topic)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();
        for handler in &targets {
            handler.on_change(topic);
        }
        debug!(topic, delivered = targets.len(), "change published");
        targets.len()
    }
}

impl Default for InMemoryChangeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeChannel for InMemoryChangeChannel {
    fn subscribe(&self, topic: &str, handler: Arc<dyn ChangeHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }
}

/// Forwards messages of a redis pub/sub channel onto a local channel as
/// `topic` signals. The payload is ignored.
pub struct RedisChangeListener {
    client: redis::Client,
    channel: String,
    topic: String,
}

impl RedisChangeListener {
    pub fn new(redis_url: &str, channel: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            channel: channel.to_string(),
            topic: ROUTE_REFRESH_TOPIC.to_string(),
        })
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_string();
        self
    }

    /// Runs the listener on its own thread, reconnecting with backoff.
    pub fn spawn(self, bus: Arc<InMemoryChangeChannel>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("route-change-listener".to_string())
            .spawn(move || {
                let mut delay = Duration::from_secs(1);
                loop {
                    match self.listen(&bus) {
                        Ok(()) => delay = Duration::from_secs(1),
                        Err(err) => {
                            warn!(
                                channel = %self.channel,
                                error = %err,
                                "change listener disconnected"
                            );
                            std::thread::sleep(delay);
                            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                        }
                    }
                }
            })
    }

    fn listen(&self, bus: &InMemoryChangeChannel) -> redis::RedisResult<()> {
        let mut conn = self.client.get_connection()?;
        let mut pubsub = conn.as_pubsub();
        pubsub.subscribe(&self.channel)?;
        info!(channel = %self.channel, "subscribed to route changes");
        loop {
            let _message = pubsub.get_message()?;
            bus.publish(&self.topic);
        }
    }
}
