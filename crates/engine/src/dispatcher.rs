//! Instrumented dispatch of upstream calls.
//!
//! Each invocation walks `Idle -> Started -> {Succeeded, Failed} -> Finalized`:
//!
//! 1. count the call in its site's in-flight counter, resolve the caller and
//!    build the operation and user keys;
//! 2. open a timer frame and run the wrapped call;
//! 3. on success, record elapsed/CPU under both keys, the concurrency gauge,
//!    the site total and the dispatcher's own overhead;
//! 4. on failure, bump the operation's error counter and hand the error back
//!    unchanged;
//! 5. always (panics and dropped futures included) release the in-flight slot
//!    and flush both keys.
//!
//! Every emission is independent; a failing sink only produces log events.

use crate::cache::ConcatenationCache;
use crate::client::{EngineDeps, TimerClient, key_fields};
use crate::context;
use callmeter_config::ValidatedConfig;
use callmeter_domain::{
    CONCURRENCY_SUFFIX, ComponentKey, ERRORS_SUFFIX, InvocationType, KEY_SEPARATOR, MetricKey,
    OVERHEAD_SUFFIX, OperationName, PrimitiveError, TOTAL_SUFFIX, UserId, operation_key, site_key,
    user_key,
};
use callmeter_ports::{Clock, IdentityPort, LogFields, LogLevel, LoggerPort};
use callmeter_shared::{CorrelationId, ErrorEnvelope, InFlightCounter, InFlightGuard};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Phase of one instrumented invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPhase {
    /// Keys built, timer not yet started.
    Idle,
    /// Wrapped call running.
    Started,
    /// Wrapped call returned `Ok`.
    Succeeded,
    /// Wrapped call returned `Err`.
    Failed,
    /// Cleanup done.
    Finalized,
}

/// Method and path of an HTTP request, as seen by the dispatcher.
pub trait HttpRequestLine {
    /// Request method, any case.
    fn method(&self) -> &str;
    /// Request path, used as the operation name.
    fn path(&self) -> &str;
}

/// Borrowed request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    /// Request method.
    pub method: &'a str,
    /// Request path.
    pub path: &'a str,
}

impl HttpRequestLine for RequestLine<'_> {
    fn method(&self) -> &str {
        self.method
    }

    fn path(&self) -> &str {
        self.path
    }
}

/// Shared state of one `component/type` call-site.
#[derive(Debug)]
struct Site {
    prefix: Arc<str>,
    in_flight: InFlightCounter,
    concurrency_key: MetricKey,
    total_key: MetricKey,
    overhead_key: MetricKey,
}

/// Keys of one invocation.
#[derive(Debug, Clone)]
struct InvocationKeys {
    operation: MetricKey,
    user: MetricKey,
    errors: MetricKey,
    overhead: MetricKey,
}

/// Wraps upstream calls with timing, concurrency and error metrics.
pub struct InstrumentedDispatcher {
    client: Arc<TimerClient>,
    identity: Arc<dyn IdentityPort>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn LoggerPort>,
    component: ComponentKey,
    component_prefix: Box<str>,
    user_prefix: Box<str>,
    anonymous_user: UserId,
    errors_child: Box<str>,
    overhead_child: Box<str>,
    keys: ConcatenationCache,
    sites: RwLock<FxHashMap<Box<str>, Arc<Site>>>,
}

impl InstrumentedDispatcher {
    /// Build a dispatcher recording through `client`.
    #[must_use]
    pub fn from_config(
        config: &ValidatedConfig,
        client: Arc<TimerClient>,
        identity: Arc<dyn IdentityPort>,
        deps: &EngineDeps,
    ) -> Self {
        let component = config.component_key().clone();
        let inner_cap = usize::try_from(config.caches.concat_inner_cap)
            .unwrap_or(ConcatenationCache::DEFAULT_INNER_CAP);
        Self {
            client,
            identity,
            clock: Arc::clone(&deps.clock),
            logger: Arc::clone(&deps.logger),
            component_prefix: format!("{component}{KEY_SEPARATOR}").into_boxed_str(),
            component,
            user_prefix: config.dispatcher.user_prefix.as_str().into(),
            anonymous_user: config.anonymous_user().clone(),
            errors_child: format!("{KEY_SEPARATOR}{ERRORS_SUFFIX}").into_boxed_str(),
            overhead_child: format!("{KEY_SEPARATOR}{OVERHEAD_SUFFIX}").into_boxed_str(),
            keys: ConcatenationCache::new(inner_cap),
            sites: RwLock::default(),
        }
    }

    /// Client receiving this dispatcher's metrics.
    #[must_use]
    pub const fn client(&self) -> &Arc<TimerClient> {
        &self.client
    }

    /// Key cache used to build invocation keys.
    #[must_use]
    pub const fn key_cache(&self) -> &ConcatenationCache {
        &self.keys
    }

    /// In-flight invocations at `component/invocation_type`.
    pub fn in_flight(&self, invocation_type: &InvocationType) -> u64 {
        self.sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(invocation_type.as_str())
            .map_or(0, |site| site.in_flight.current())
    }

    /// Run `call` as `operation` of `invocation_type`.
    ///
    /// The call's result is returned unchanged.
    pub fn instrument<T, E, F>(
        &self,
        invocation_type: &InvocationType,
        operation: &OperationName,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let site = self.site(invocation_type);
        let mut invocation = Invocation::begin(self, &site, operation);
        invocation.start();
        let outcome = call();
        invocation.complete(outcome.is_ok());
        outcome
    }

    /// Run `call` as an RPC `operation`.
    pub fn instrument_rpc<T, E, F>(&self, operation: &OperationName, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.instrument(&InvocationType::rpc(), operation, call)
    }

    /// Run `call` as an HTTP request: type is the upper-cased method, the
    /// operation is the path.
    ///
    /// An unusable method is recorded as `GET` and an unusable path as
    /// `_invalid`; the call is still counted, timed and flushed.
    pub fn instrument_http<T, E, F>(&self, request: &impl HttpRequestLine, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let (invocation_type, operation) = self.http_keys(request);
        self.instrument(&invocation_type, &operation, call)
    }

    /// Await `call` as `operation` of `invocation_type`.
    ///
    /// Runs inside a task-local timer scope so the frame survives the task
    /// moving between worker threads.
    pub async fn instrument_async<T, E, Fut>(
        &self,
        invocation_type: &InvocationType,
        operation: &OperationName,
        call: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if context::in_task_scope() {
            self.run_async(invocation_type, operation, call).await
        } else {
            context::scope(self.run_async(invocation_type, operation, call)).await
        }
    }

    async fn run_async<T, E, Fut>(
        &self,
        invocation_type: &InvocationType,
        operation: &OperationName,
        call: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let site = self.site(invocation_type);
        let mut invocation = Invocation::begin(self, &site, operation);
        invocation.start();
        let outcome = call.await;
        invocation.complete(outcome.is_ok());
        outcome
    }

    fn site(&self, invocation_type: &InvocationType) -> Arc<Site> {
        let existing = self
            .sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(invocation_type.as_str())
            .cloned();
        if let Some(site) = existing {
            return site;
        }

        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        let site = sites
            .entry(invocation_type.as_str().into())
            .or_insert_with(|| {
                let with_separator = self.keys.concat(invocation_type.as_str(), "/");
                Arc::new(Site {
                    prefix: self.keys.concat(&self.component_prefix, &with_separator),
                    in_flight: InFlightCounter::new(),
                    concurrency_key: site_key(&self.component, invocation_type, CONCURRENCY_SUFFIX),
                    total_key: site_key(&self.component, invocation_type, TOTAL_SUFFIX),
                    overhead_key: site_key(&self.component, invocation_type, OVERHEAD_SUFFIX),
                })
            });
        Arc::clone(site)
    }

    fn current_user(&self) -> UserId {
        match self.identity.current_user_id() {
            Ok(user) => user,
            Err(error) => {
                let envelope = ErrorEnvelope::from(error);
                self.logger
                    .failure(LogLevel::Debug, "identity.lookup_failed", &envelope, None);
                self.anonymous_user.clone()
            },
        }
    }

    fn invocation_keys(&self, site: &Site, operation: &OperationName) -> InvocationKeys {
        let user = self.current_user();
        let operation_shared = self.keys.concat(&site.prefix, operation.as_str());
        let operation_key = MetricKey::from_shared(operation_shared)
            .unwrap_or_else(|_| self.uncached_operation_key(site, operation));

        let user_head = self.keys.concat(&self.user_prefix, user.as_str());
        let user_segment = self.keys.concat(&user_head, "/");
        let user_shared = self.keys.concat(&user_segment, operation_key.as_str());
        let user_key = MetricKey::from_shared(user_shared)
            .unwrap_or_else(|_| user_key(&self.user_prefix, &user, &operation_key));

        let errors = self.child_key(&operation_key, &self.errors_child, ERRORS_SUFFIX);
        let overhead = self.child_key(&operation_key, &self.overhead_child, OVERHEAD_SUFFIX);

        InvocationKeys {
            operation: operation_key,
            user: user_key,
            errors,
            overhead,
        }
    }

    fn uncached_operation_key(&self, site: &Site, operation: &OperationName) -> MetricKey {
        let invocation_type = site
            .prefix
            .strip_prefix(self.component_prefix.as_ref())
            .and_then(|rest| rest.strip_suffix(KEY_SEPARATOR))
            .and_then(|raw| InvocationType::parse(raw).ok())
            .unwrap_or_else(InvocationType::rpc);
        operation_key(&self.component, &invocation_type, operation)
    }

    fn child_key(&self, parent: &MetricKey, child: &str, suffix: &str) -> MetricKey {
        MetricKey::from_shared(self.keys.concat(parent.as_str(), child))
            .unwrap_or_else(|_| parent.child(suffix))
    }

    fn http_keys(&self, request: &impl HttpRequestLine) -> (InvocationType, OperationName) {
        let invocation_type =
            InvocationType::http_method(request.method()).unwrap_or_else(|error| {
                self.report_invalid_request(request, error);
                InvocationType::http_get()
            });
        let operation = OperationName::parse(request.path()).unwrap_or_else(|error| {
            self.report_invalid_request(request, error);
            OperationName::unresolved()
        });
        (invocation_type, operation)
    }

    fn report_invalid_request(&self, request: &impl HttpRequestLine, error: PrimitiveError) {
        let envelope = ErrorEnvelope::from(error);
        let mut fields = LogFields::new();
        fields.insert("method".into(), Value::String(request.method().to_string()));
        fields.insert("path".into(), Value::String(request.path().to_string()));
        self.logger.failure(
            LogLevel::Debug,
            "dispatcher.key_invalid",
            &envelope,
            Some(fields),
        );
    }
}

impl std::fmt::Debug for InstrumentedDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InstrumentedDispatcher")
            .field("client", &self.client.name())
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

/// One in-flight invocation. Dropping it finalizes, including on unwind.
struct Invocation<'a> {
    dispatcher: &'a InstrumentedDispatcher,
    site: &'a Site,
    keys: InvocationKeys,
    phase: InvocationPhase,
    in_flight: InFlightGuard<'a>,
    id: CorrelationId,
}

impl<'a> Invocation<'a> {
    fn begin(
        dispatcher: &'a InstrumentedDispatcher,
        site: &'a Site,
        operation: &OperationName,
    ) -> Self {
        let in_flight = site.in_flight.enter();
        let keys = dispatcher.invocation_keys(site, operation);
        Self {
            dispatcher,
            site,
            keys,
            phase: InvocationPhase::Idle,
            in_flight,
            id: CorrelationId::new_invocation_id(),
        }
    }

    fn start(&mut self) {
        self.dispatcher.client.start_metric(&self.keys.operation);
        self.phase = InvocationPhase::Started;
    }

    fn complete(&mut self, succeeded: bool) {
        let returned_at = self.dispatcher.clock.precise_nanos();
        let client = &self.dispatcher.client;

        if succeeded {
            self.phase = InvocationPhase::Succeeded;
            if let Some(reading) = client.end_metric(&self.keys.operation) {
                client.record_reading(&self.keys.user, &reading);
                client.record_reading(&self.site.total_key, &reading);
            }
            let level = i64::try_from(self.in_flight.level()).unwrap_or(i64::MAX);
            client.record_gauge(&self.site.concurrency_key, level);

            let overhead = self
                .dispatcher
                .clock
                .precise_nanos()
                .saturating_sub(returned_at)
                .max(0);
            client.record_sample(&self.keys.overhead, overhead);
            client.record_sample(&self.site.overhead_key, overhead);
        } else {
            self.phase = InvocationPhase::Failed;
            client.cancel_metric();
            client.record_count(&self.keys.errors, 1);
        }
    }

    fn finalize(&mut self) {
        let client = &self.dispatcher.client;
        if self.phase == InvocationPhase::Started {
            // Unwound or dropped mid-await; pop the frame so the stack stays balanced.
            client.cancel_metric();
            let mut fields = key_fields(&self.keys.operation);
            fields.insert("invocationId".into(), Value::String(self.id.to_string()));
            client
                .logger()
                .debug("dispatcher.unwound", "wrapped call did not complete", Some(fields));
        }
        client.flush(&self.keys.operation);
        client.flush(&self.keys.user);
        self.phase = InvocationPhase::Finalized;
    }
}

impl Drop for Invocation<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}
