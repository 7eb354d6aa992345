//! Task hand-off adapters.
//!
//! On enqueue the active context is written into the task payload under
//! [`META_KEY`]; on perform it is read back and installed for the duration
//! of the task body. The executor's frame is reset afterwards no matter how
//! the body ends.
//!
//! Payloads are JSON. Object payloads get the reserved key at the top
//! level; argument lists get a trailing `{"__opsline_meta": {..}}` element.

use std::future::Future;
use std::time::Instant;

use opsline_context::Context;
use opsline_core::{Metadata, generate_id};
use opsline_recorder::{Instrumentation, Signal, TaskInfo, TaskSignal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved payload key carrying the serialized context.
pub const META_KEY: &str = "__opsline_meta";

// ---------------------------------------------------------------------------
// Payload encoding
// ---------------------------------------------------------------------------

fn encode(context: &Context) -> Value {
    let mut meta = Metadata::new();
    meta.insert("correlation_id".into(), context.correlation_id.clone().into());
    meta.insert("request_id".into(), context.request_id.clone().into());
    meta.insert("tenant_id".into(), context.tenant_id.clone().into());
    meta.insert("actor_id".into(), context.actor_id.clone().into());
    Value::Object(meta)
}

fn decode(raw: &Value) -> Option<Context> {
    if !raw.is_object() {
        return None;
    }
    match Context::deserialize(raw) {
        Ok(context) => Some(context),
        Err(error) => {
            tracing::warn!(%error, "ignoring malformed task context");
            None
        }
    }
}

fn is_meta_element(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key(META_KEY))
}

/// Write `context` into `payload`.
///
/// Objects gain a top-level [`META_KEY`]; arrays gain a trailing meta
/// element, replacing one left by an earlier enqueue. Any other payload
/// becomes an argument list ending with the meta element.
pub fn embed_context(payload: &mut Value, context: &Context) {
    let meta = encode(context);
    match payload {
        Value::Object(map) => {
            map.insert(META_KEY.into(), meta);
        }
        Value::Array(arguments) => {
            if arguments.last().is_some_and(is_meta_element) {
                arguments.pop();
            }
            arguments.push(meta_element(meta));
        }
        Value::Null => *payload = Value::Array(vec![meta_element(meta)]),
        other => {
            let original = other.take();
            *other = Value::Array(vec![original, meta_element(meta)]);
        }
    }
}

fn meta_element(meta: Value) -> Value {
    let mut element = Metadata::new();
    element.insert(META_KEY.into(), meta);
    Value::Object(element)
}

/// Read the context stored by [`embed_context`]. `None` for payloads
/// enqueued without one.
pub fn extract_context(payload: &Value) -> Option<Context> {
    match payload {
        Value::Object(map) => decode(map.get(META_KEY)?),
        Value::Array(arguments) => decode(arguments.last()?.get(META_KEY)?),
        _ => None,
    }
}

/// Remove the stored context from `payload`, returning it.
pub fn take_context(payload: &mut Value) -> Option<Context> {
    match payload {
        Value::Object(map) => decode(&map.remove(META_KEY)?),
        Value::Array(arguments) => {
            if !arguments.last().is_some_and(is_meta_element) {
                return None;
            }
            let mut element = arguments.pop()?;
            decode(&element.get_mut(META_KEY)?.take())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Called by a task framework just before a payload is handed to a queue.
pub trait EnqueueHook: Send + Sync {
    /// Stamp `payload` with whatever must travel with the task.
    fn before_enqueue(&self, payload: &mut Value);
}

/// Called by a task framework around task execution.
pub trait PerformHook: Send + Sync {
    /// Context to run the task body in, read from `payload`.
    fn before_perform(&self, payload: &Value) -> Option<Context>;

    /// Called after the body returns, fails or unwinds.
    fn after_perform(&self);
}

/// Propagates the active [`Context`] through task payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPropagator;

impl EnqueueHook for ContextPropagator {
    fn before_enqueue(&self, payload: &mut Value) {
        opsline_context::ensure_correlation_id();
        embed_context(payload, &Context::current());
    }
}

impl PerformHook for ContextPropagator {
    fn before_perform(&self, payload: &Value) -> Option<Context> {
        extract_context(payload)
    }

    fn after_perform(&self) {
        opsline_context::reset();
    }
}

/// Calls [`PerformHook::after_perform`] when dropped.
struct AfterPerform<'a, H: PerformHook + ?Sized>(&'a H);

impl<H: PerformHook + ?Sized> Drop for AfterPerform<'_, H> {
    fn drop(&mut self) {
        self.0.after_perform();
    }
}

// ---------------------------------------------------------------------------
// TaskEnvelope
// ---------------------------------------------------------------------------

/// Serialized form of a task as it travels through a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Task class name.
    pub class: String,
    /// Id assigned at creation.
    pub task_id: String,
    /// Target queue.
    pub queue_name: String,
    /// Id assigned by the queue backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_task_id: Option<String>,
    /// Task arguments, possibly ending with the context element.
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl TaskEnvelope {
    /// A new task on the `default` queue.
    pub fn new(class: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            task_id: generate_id(),
            queue_name: "default".into(),
            provider_task_id: None,
            arguments,
        }
    }

    /// Set the queue.
    #[must_use]
    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Set the backend id.
    #[must_use]
    pub fn with_provider_task_id(mut self, id: impl Into<String>) -> Self {
        self.provider_task_id = Some(id.into());
        self
    }

    /// Arguments without the trailing context element.
    pub fn user_arguments(&self) -> &[Value] {
        match self.arguments.split_last() {
            Some((last, rest)) if is_meta_element(last) => rest,
            _ => &self.arguments,
        }
    }

    /// The context carried by this task, if any.
    pub fn context(&self) -> Option<Context> {
        decode(self.arguments.last()?.get(META_KEY)?)
    }

    fn info(&self) -> TaskInfo {
        let mut info = TaskInfo::new(&self.class, &self.task_id)
            .with_queue_name(&self.queue_name)
            .with_arguments(self.user_arguments().to_vec());
        info.provider_task_id.clone_from(&self.provider_task_id);
        info
    }

    /// Stamp the active context onto the task and run `enqueue`, emitting a
    /// timed `task.enqueue` signal.
    ///
    /// A correlation id is assigned to the current frame first if it has
    /// none, so the caller and the task share one.
    pub fn around_enqueue<R>(
        &mut self,
        bus: &Instrumentation,
        adapter: &str,
        enqueue: impl FnOnce(&Self) -> R,
    ) -> R {
        opsline_context::ensure_correlation_id();
        let context = Context::current();
        if self.arguments.last().is_some_and(is_meta_element) {
            self.arguments.pop();
        }
        self.arguments.push(meta_element(encode(&context)));

        let signal = TaskSignal::Enqueue {
            task: self.info(),
            queue: self.queue_name.clone(),
            adapter: adapter.to_owned(),
        };
        bus.instrument(signal, || enqueue(self))
    }

    /// Run a task body with the context this task was enqueued with.
    ///
    /// Emits `task.perform_start` before and a timed `task.perform` after
    /// the body. A failing body is reported by its error type name only, so
    /// wrapper types such as `Box<dyn Error>` are recorded as `Box`; use
    /// [`around_perform_classified`](Self::around_perform_classified) to
    /// name those precisely.
    ///
    /// The body always runs in a frame of its own. Tasks without a stored
    /// context start from a copy of the executor's context, so concurrent
    /// legacy tasks on one worker never share a correlation id. The
    /// executor frame is reset on every exit path.
    pub async fn around_perform<F, Fut, T, E>(
        &self,
        bus: &Instrumentation,
        perform: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.around_perform_classified(bus, |_: &E| error_class::<E>(), perform)
            .await
    }

    /// [`around_perform`](Self::around_perform) with the recorded error
    /// class chosen by `classify`.
    pub async fn around_perform_classified<F, Fut, T, E, C>(
        &self,
        bus: &Instrumentation,
        classify: C,
        perform: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> String,
    {
        let propagator = ContextPropagator;
        let _after = AfterPerform(&propagator);
        let stored = self.context().unwrap_or_default();
        let info = self.info();
        let arguments = info.arguments.clone();

        let body = async move {
            bus.emit(
                &Signal::Task(TaskSignal::PerformStart { task: info.clone() }),
                None,
            );
            let started = Instant::now();
            let result = perform(arguments).await;
            let exception = result.as_ref().err().map(classify);
            bus.emit(
                &Signal::Task(TaskSignal::Perform {
                    task: info,
                    exception,
                }),
                Some(started.elapsed()),
            );
            result
        };

        opsline_context::with_async(&stored, body).await
    }
}

/// Short type name of an error, without module path or generics.
fn error_class<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}
