// Shared scripted backend for composition tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use routemux_core::{
    AddrInfo, ContentRouting, PeerId, ProviderStream, RecordKey, RoutingContext, RoutingError,
    ValueOptions, ValueStream,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a scripted backend answers once its delay has elapsed
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with the router's value / peer / providers
    Answer,
    /// Answer successfully, but with nothing in it
    Empty,
    /// Report a soft miss
    NotFound,
    /// Report a hard failure with this message
    Fail(String),
}

/// Backend whose every operation sleeps `delay` and then follows `script`
pub struct ScriptedRouter {
    pub script: Script,
    pub delay: Duration,
    pub values: Vec<Vec<u8>>,
    pub peer: AddrInfo,
    pub providers: Vec<AddrInfo>,
    pub item_interval: Duration,
    /// Operations started
    pub calls: AtomicUsize,
    /// Operations that got past their delay and answered
    pub completed: AtomicUsize,
    /// Keys accepted by provide / put_value, in order
    pub writes: Mutex<Vec<String>>,
    /// Items handed out on provider and search streams
    pub streamed: Arc<AtomicUsize>,
    /// Provider and search streams not yet dropped
    pub open_streams: Arc<AtomicUsize>,
}

impl ScriptedRouter {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            values: vec![b"value".to_vec()],
            peer: AddrInfo::new(PeerId::random(), vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()]),
            providers: Vec::new(),
            item_interval: Duration::from_millis(1),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            streamed: Arc::new(AtomicUsize::new(0)),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn answering(value: &[u8]) -> Self {
        Self::new(Script::Answer).with_values(vec![value.to_vec()])
    }

    pub fn failing(message: &str) -> Self {
        Self::new(Script::Fail(message.to_string()))
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_values(mut self, values: Vec<Vec<u8>>) -> Self {
        self.values = values;
        self
    }

    pub fn with_providers(mut self, count: usize, interval: Duration) -> Self {
        self.providers = (0..count)
            .map(|_| AddrInfo::new(PeerId::random(), vec!["/ip4/10.0.0.1/tcp/4001".parse().unwrap()]))
            .collect();
        self.item_interval = interval;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn streamed(&self) -> usize {
        self.streamed.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Sleep out the delay unless the scope finishes first
    async fn wait(&self, ctx: &RoutingContext) -> Result<(), RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            _ = tokio::time::sleep(self.delay) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn write_outcome(&self, key: String) -> Result<(), RoutingError> {
        match &self.script {
            Script::Answer | Script::Empty => {
                self.writes.lock().push(key);
                Ok(())
            }
            Script::NotFound => Err(RoutingError::NotFound),
            Script::Fail(message) => Err(RoutingError::backend(message.clone())),
        }
    }

    /// Stream `items` one per interval until the scope is done or they run out
    fn paced<T: Send + 'static>(&self, ctx: &RoutingContext, items: Vec<T>) -> stream::BoxStream<'static, T> {
        let guard = StreamGuard::open(self.open_streams.clone());
        let streamed = self.streamed.clone();
        let interval = self.item_interval;
        let ctx = ctx.clone();
        stream::unfold((items.into_iter(), ctx, guard), move |(mut items, ctx, guard)| {
            let streamed = streamed.clone();
            async move {
                let item = items.next()?;
                tokio::select! {
                    biased;
                    _ = ctx.done() => None,
                    _ = tokio::time::sleep(interval) => {
                        streamed.fetch_add(1, Ordering::SeqCst);
                        Some((item, (items, ctx, guard)))
                    }
                }
            }
        })
        .boxed()
    }
}

/// Counts a stream as open until it is dropped
struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
    fn open(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentRouting for ScriptedRouter {
    async fn provide(&self, ctx: &RoutingContext, key: &RecordKey, _announce: bool) -> Result<(), RoutingError> {
        self.wait(ctx).await?;
        self.write_outcome(String::from_utf8_lossy(&key.to_vec()).into_owned())
    }

    fn find_providers_async(&self, ctx: &RoutingContext, _key: &RecordKey, _count: usize) -> ProviderStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Answer => self.paced(ctx, self.providers.clone()),
            _ => stream::empty().boxed(),
        }
    }

    async fn find_peer(&self, ctx: &RoutingContext, _peer: &PeerId) -> Result<AddrInfo, RoutingError> {
        self.wait(ctx).await?;
        match &self.script {
            Script::Answer => Ok(self.peer.clone()),
            Script::Empty => Ok(AddrInfo::new(self.peer.peer_id, Vec::new())),
            Script::NotFound => Err(RoutingError::NotFound),
            Script::Fail(message) => Err(RoutingError::backend(message.clone())),
        }
    }

    async fn put_value(
        &self,
        ctx: &RoutingContext,
        key: &str,
        _value: &[u8],
        _opts: &ValueOptions,
    ) -> Result<(), RoutingError> {
        self.wait(ctx).await?;
        self.write_outcome(key.to_string())
    }

    async fn get_value(&self, ctx: &RoutingContext, _key: &str, _opts: &ValueOptions) -> Result<Vec<u8>, RoutingError> {
        self.wait(ctx).await?;
        match &self.script {
            Script::Answer => Ok(self.values.first().cloned().unwrap_or_default()),
            Script::Empty => Ok(Vec::new()),
            Script::NotFound => Err(RoutingError::NotFound),
            Script::Fail(message) => Err(RoutingError::backend(message.clone())),
        }
    }

    async fn search_value(
        &self,
        ctx: &RoutingContext,
        _key: &str,
        _opts: &ValueOptions,
    ) -> Result<ValueStream, RoutingError> {
        self.wait(ctx).await?;
        match &self.script {
            Script::Answer => {
                let items: Vec<Result<Vec<u8>, RoutingError>> = self.values.iter().cloned().map(Ok).collect();
                Ok(self.paced(ctx, items))
            }
            Script::Empty => Ok(stream::empty().boxed()),
            Script::NotFound => Err(RoutingError::NotFound),
            Script::Fail(message) => Err(RoutingError::backend(message.clone())),
        }
    }

    async fn bootstrap(&self, ctx: &RoutingContext) -> Result<(), RoutingError> {
        self.wait(ctx).await?;
        self.write_outcome("bootstrap".to_string())
    }
}

/// Erase a scripted router into the trait object composites hold
pub fn backend(router: &Arc<ScriptedRouter>) -> Arc<dyn ContentRouting> {
    router.clone()
}

pub fn key(name: &str) -> RecordKey {
    RecordKey::new(&name)
}
