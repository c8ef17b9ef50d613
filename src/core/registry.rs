//! # Control-loop registry.
//!
//! Maps a loop name to the factory that builds it from the [`SharedContext`].
//! Registration happens once at startup through [`RegistryBuilder`]; the
//! frozen [`Registry`] is read-only and iterates in name order.
//!
//! ## Rules
//! - Names are unique and non-empty; violations are rejected at `register`.
//! - There is no removal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::context::SharedContext;
use crate::error::RegistryError;
use crate::loops::ControlLoopRef;

/// Builds a control loop from the shared context.
pub type LoopFactory = Arc<dyn Fn(&SharedContext) -> ControlLoopRef + Send + Sync>;

/// Collects registrations before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, LoopFactory>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`.
    ///
    /// # Example
    /// ```
    /// use tokio_util::sync::CancellationToken;
    /// use leasevisor::{ControlLoopFn, ControlLoopRef, LoopError, RegistryBuilder, SharedContext};
    ///
    /// let mut builder = RegistryBuilder::new();
    /// builder
    ///     .register("clusters", |_ctx: &SharedContext| -> ControlLoopRef {
    ///         ControlLoopFn::arc(|_w: usize, t: CancellationToken| async move {
    ///             t.cancelled().await;
    ///             Ok::<_, LoopError>(())
    ///         })
    ///     })
    ///     .unwrap();
    /// assert_eq!(builder.build().names(), vec!["clusters"]);
    /// ```
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&SharedContext) -> ControlLoopRef + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.entries.insert(name, Arc::new(factory));
        Ok(self)
    }

    /// Freezes the registrations.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// Read-only table of registered control loops.
#[derive(Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, LoopFactory>,
}

impl Registry {
    /// Iterates over `(name, factory)` pairs in name order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &LoopFactory)> {
        self.entries.iter().map(|(name, f)| (name.as_str(), f))
    }

    /// Returns the registered names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered loops.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoopError;
    use crate::loops::ControlLoopFn;
    use tokio_util::sync::CancellationToken;

    fn idle(_ctx: &SharedContext) -> ControlLoopRef {
        ControlLoopFn::arc(|_w: usize, t: CancellationToken| async move {
            t.cancelled().await;
            Ok::<_, LoopError>(())
        })
    }

    #[test]
    fn test_duplicate_rejected_at_register() {
        let mut builder = RegistryBuilder::new();
        builder.register("backups", idle).unwrap();

        let err = builder.register("backups", idle).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "backups".into()
            }
        );
        assert_eq!(builder.build().len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut builder = RegistryBuilder::new();
        assert_eq!(
            builder.register("", idle).unwrap_err(),
            RegistryError::EmptyName
        );
    }

    #[test]
    fn test_all_in_name_order() {
        let mut builder = RegistryBuilder::new();
        builder
            .register("restores", idle)
            .unwrap()
            .register("clusters", idle)
            .unwrap()
            .register("backups", idle)
            .unwrap();
        let registry = builder.build();

        let names: Vec<&str> = registry.all().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["backups", "clusters", "restores"]);
        assert_eq!(registry.names(), names);
        assert!(!registry.is_empty());
    }
}
