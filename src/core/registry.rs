//! Task registry: `(module, name)` to unit-of-work factory.
//!
//! The registry is populated once at startup and then shared read-only with
//! the executor loop, which resolves every dispatched descriptor through it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{SchedulerError, Task, TaskArguments, TaskKey};

type Factory = dyn Fn(TaskArguments) -> Result<Box<dyn Task>, SchedulerError> + Send + Sync;

/// Mapping from a stable task key to the constructor of its unit of work.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    factories: HashMap<TaskKey, Arc<Factory>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory that builds the unit of work from its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `module.name` is already registered.
    pub fn register<F>(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        factory: F,
    ) -> Result<&mut Self, SchedulerError>
    where
        F: Fn(TaskArguments) -> Result<Box<dyn Task>, SchedulerError> + Send + Sync + 'static,
    {
        let key = TaskKey::new(module, name);
        if self.factories.contains_key(&key) {
            return Err(SchedulerError::InvalidConfig(format!(
                "duplicate task registration for {key}"
            )));
        }
        self.factories.insert(key, Arc::new(factory));
        Ok(self)
    }

    /// Register a task type whose keyword arguments deserialize directly into it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] on duplicate registration.
    pub fn register_kwargs<T>(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<&mut Self, SchedulerError>
    where
        T: Task + DeserializeOwned,
    {
        self.register(module, name, |arguments: TaskArguments| {
            let task: T = arguments.kwargs_as()?;
            Ok(Box::new(task) as Box<dyn Task>)
        })
    }

    /// Whether `key` can be resolved.
    #[must_use]
    pub fn contains(&self, key: &TaskKey) -> bool {
        self.factories.contains_key(key)
    }

    /// Resolve `key` and bind `arguments`, producing a runnable unit of work.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Resolution`] if nothing is registered under `key`.
    /// - [`SchedulerError::Serialization`] if the factory rejects the arguments.
    pub fn instantiate(
        &self,
        key: &TaskKey,
        arguments: TaskArguments,
    ) -> Result<Box<dyn Task>, SchedulerError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| SchedulerError::resolution(&key.module, &key.name))?;
        factory(arguments)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered units of work.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AppResult;
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Reboot {
        host: String,
    }

    #[async_trait]
    impl Task for Reboot {
        async fn execute(&mut self) -> AppResult<()> {
            anyhow::ensure!(!self.host.is_empty(), "no host");
            Ok(())
        }
    }

    fn kwargs(host: &str) -> TaskArguments {
        let mut arguments = TaskArguments::default();
        arguments.kwargs.insert("host".into(), serde_json::json!(host));
        arguments
    }

    #[test]
    fn resolves_registered_task() {
        let mut registry = TaskRegistry::new();
        registry.register_kwargs::<Reboot>("power", "reboot").unwrap();

        assert!(registry.contains(&TaskKey::new("power", "reboot")));
        assert!(registry
            .instantiate(&TaskKey::new("power", "reboot"), kwargs("host-01"))
            .is_ok());
    }

    #[test]
    fn unknown_key_is_a_resolution_error() {
        let registry = TaskRegistry::new();
        let err = registry
            .instantiate(&TaskKey::new("power", "reboot"), TaskArguments::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SchedulerError::Resolution { ref module, ref name } if module == "power" && name == "reboot"
        ));
    }

    #[test]
    fn mismatched_arguments_are_a_serialization_error() {
        let mut registry = TaskRegistry::new();
        registry.register_kwargs::<Reboot>("power", "reboot").unwrap();
        let err = registry
            .instantiate(&TaskKey::new("power", "reboot"), TaskArguments::default())
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register_kwargs::<Reboot>("power", "reboot").unwrap();
        assert!(registry.register_kwargs::<Reboot>("power", "reboot").is_err());
        assert_eq!(registry.len(), 1);
    }
}
