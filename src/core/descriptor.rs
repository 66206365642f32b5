//! Persisted task descriptors and the request type used to create them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::SchedulerError;

/// Two-valued dispatch priority. `High` partitions are drained first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Default priority.
    #[default]
    Normal,
    /// Preempts `Normal` work at every poll.
    High,
}

impl Priority {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(SchedulerError::Backend(format!("unknown priority `{other}`"))),
        }
    }
}

/// Which persisted variant a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fire-once; deleted after completion.
    Single,
    /// Recurring; reset after completion.
    Daily,
}

/// Content-derived unique key of a descriptor (hex encoded blake3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHash(String);

impl TaskHash {
    /// Hash a `(module, name, arguments)` triple.
    ///
    /// The input is the canonical JSON rendering of the triple. Object keys
    /// are emitted in sorted order, so logically equal keyword arguments
    /// always hash identically.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] if the arguments cannot be
    /// rendered as JSON.
    pub fn compute(key: &TaskKey, arguments: &TaskArguments) -> Result<Self, SchedulerError> {
        let canonical = serde_json::to_string(&serde_json::json!({
            "module": key.module,
            "name": key.name,
            "args": arguments.args,
            "kwargs": arguments.kwargs,
        }))?;
        Ok(Self(blake3::hash(canonical.as_bytes()).to_hex().to_string()))
    }

    /// Wrap an already computed hash, e.g. one read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for thread names and log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry lookup key: the namespace and name of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    /// Namespace the unit of work lives in.
    pub module: String,
    /// Name of the unit of work.
    pub name: String,
}

impl TaskKey {
    /// Build a key.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Positional and keyword arguments captured for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArguments {
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments, ordered by name.
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl TaskArguments {
    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] when encoding fails.
    pub fn to_json(&self) -> Result<String, SchedulerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] for malformed input.
    pub fn from_json(raw: &str) -> Result<Self, SchedulerError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode the positional argument at `index`.
    ///
    /// # Errors
    ///
    /// Missing or mistyped arguments are reported as serialization errors.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, SchedulerError> {
        let value = self.args.get(index).cloned().ok_or_else(|| {
            SchedulerError::Serialization(format!("missing positional argument {index}"))
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Decode the keyword argument `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] when the value has the wrong shape.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SchedulerError> {
        self.kwargs
            .get(name)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(SchedulerError::from)
    }

    /// Decode all keyword arguments into one struct.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] when the keyword arguments
    /// do not match `T`.
    pub fn kwargs_as<T: DeserializeOwned>(&self) -> Result<T, SchedulerError> {
        let object: serde_json::Map<String, Value> = self
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// A task as constructed by application code, before submission.
///
/// Arguments are converted eagerly; the first value that cannot be
/// represented poisons the request, and submitting it fails with
/// [`SchedulerError::Serialization`].
#[derive(Debug, Clone)]
pub struct TaskRequest {
    key: TaskKey,
    arguments: TaskArguments,
    priority: Priority,
    rejected: Option<String>,
}

impl TaskRequest {
    /// Start a request for the unit of work `module.name`.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: TaskKey::new(module, name),
            arguments: TaskArguments::default(),
            priority: Priority::Normal,
            rejected: None,
        }
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.arguments.args.push(value),
            Err(e) => {
                let index = self.arguments.args.len();
                self.reject(format!("positional argument {index}: {e}"));
            }
        }
        self
    }

    /// Set a keyword argument.
    #[must_use]
    pub fn kwarg<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.arguments.kwargs.insert(name, value);
            }
            Err(e) => self.reject(format!("keyword argument `{name}`: {e}")),
        }
        self
    }

    /// Replace all arguments at once.
    #[must_use]
    pub fn with_arguments(mut self, arguments: TaskArguments) -> Self {
        self.arguments = arguments;
        self
    }

    /// Set the dispatch priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The unit of work this request targets.
    #[must_use]
    pub const fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Captured arguments.
    #[must_use]
    pub const fn arguments(&self) -> &TaskArguments {
        &self.arguments
    }

    fn reject(&mut self, reason: String) {
        self.rejected.get_or_insert(reason);
    }

    /// Serialize the request into a storable row.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Serialization`] if any argument was not
    /// representable.
    pub fn into_new_task(self) -> Result<NewTask, SchedulerError> {
        if let Some(reason) = self.rejected {
            return Err(SchedulerError::Serialization(reason));
        }
        let hash = TaskHash::compute(&self.key, &self.arguments)?;
        let arguments = self.arguments.to_json()?;
        Ok(NewTask {
            key: self.key,
            arguments,
            hash,
            priority: self.priority,
        })
    }
}

/// A serialized request, ready for get-or-create in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Target unit of work.
    pub key: TaskKey,
    /// Encoded [`TaskArguments`].
    pub arguments: String,
    /// Content hash over key and arguments.
    pub hash: TaskHash,
    /// Dispatch priority.
    pub priority: Priority,
}

/// Fields shared by both persisted descriptor variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique content hash.
    pub hash: TaskHash,
    /// Name of the unit of work.
    pub name: String,
    /// Namespace of the unit of work.
    pub module: String,
    /// Encoded [`TaskArguments`].
    pub arguments: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Exclusive claim flag.
    pub running: bool,
    /// Creation time.
    pub created: NaiveDateTime,
    /// Last mutation time.
    pub updated: NaiveDateTime,
}

impl TaskDescriptor {
    /// Registry key of the described unit of work.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.module, &self.name)
    }

    pub(crate) fn from_new(new: &NewTask, now: NaiveDateTime) -> Self {
        Self {
            hash: new.hash.clone(),
            name: new.key.name.clone(),
            module: new.key.module.clone(),
            arguments: new.arguments.clone(),
            priority: new.priority,
            running: false,
            created: now,
            updated: now,
        }
    }
}

/// Fire-once descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleTask {
    /// Shared descriptor fields.
    #[serde(flatten)]
    pub descriptor: TaskDescriptor,
}

/// Recurring descriptor, due at most once per day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTask {
    /// Shared descriptor fields.
    #[serde(flatten)]
    pub descriptor: TaskDescriptor,
    /// Date of the last claim, if any.
    pub executed_at: Option<NaiveDate>,
    /// Administrative on/off switch.
    pub enabled: bool,
}

/// A descriptor the loop has claimed and pushed into the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTask {
    /// Descriptor hash.
    pub hash: TaskHash,
    /// Registry key.
    pub key: TaskKey,
    /// Encoded arguments, decoded only when dispatched.
    pub arguments: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Persisted variant, routes post-completion cleanup.
    pub kind: TaskKind,
    /// `executed_at` before the claim touched it (daily only).
    pub previous_executed_at: Option<NaiveDate>,
}

impl ClaimedTask {
    /// Claim record for a single task.
    #[must_use]
    pub fn single(task: &SingleTask) -> Self {
        Self::from_descriptor(&task.descriptor, TaskKind::Single, None)
    }

    /// Claim record for a daily task.
    #[must_use]
    pub fn daily(task: &DailyTask) -> Self {
        Self::from_descriptor(&task.descriptor, TaskKind::Daily, task.executed_at)
    }

    fn from_descriptor(
        descriptor: &TaskDescriptor,
        kind: TaskKind,
        previous_executed_at: Option<NaiveDate>,
    ) -> Self {
        Self {
            hash: descriptor.hash.clone(),
            key: descriptor.key(),
            arguments: descriptor.arguments.clone(),
            priority: descriptor.priority,
            kind,
            previous_executed_at,
        }
    }
}
