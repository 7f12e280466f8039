// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Service lookup for rendering templates.
//!
//! Templates reach application services through `@inject` and `@route`,
//! which compile to `__service(id)` calls. The engine hands every render
//! function an explicit lookup callback backed by a [`ServiceLocator`]; there
//! is no global container.

use crate::error::{Result, StratumError};
use mlua::{Lua, LuaSerdeExt, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves service ids to Lua values.
pub trait ServiceLocator: Send + Sync {
    /// Returns the service bound to `id`, or `None` when there is none.
    fn resolve(&self, lua: &Lua, id: &str) -> mlua::Result<Option<Value>>;
}

type Factory = Arc<dyn Fn(&Lua) -> mlua::Result<Value> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Value(serde_json::Value),
    Factory(Factory),
}

/// A map of service ids to plain values or factories.
///
/// # Examples
///
/// ```rust,ignore
/// use stratum::ServiceContainer;
///
/// let services = ServiceContainer::new()
///     .bind_value("site", &serde_json::json!({ "name": "Docs" }))?
///     .bind_factory("router", |lua| {
///         lua.load("return { uri = function(_, name) return '/' .. name end }").eval()
///     });
/// ```
#[derive(Clone, Default)]
pub struct ServiceContainer {
    bindings: HashMap<String, Binding>,
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.bindings.keys().collect();
        ids.sort();
        f.debug_struct("ServiceContainer").field("services", &ids).finish()
    }
}

impl ServiceContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` to a serializable value, converted on every lookup.
    pub fn bind_value<T: Serialize>(mut self, id: &str, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|err| StratumError::ConfigError(format!("service `{}` is not serializable: {}", id, err)))?;
        self.bindings.insert(id.to_string(), Binding::Value(value));
        Ok(self)
    }

    /// Binds `id` to a factory invoked on every lookup.
    pub fn bind_factory<F>(mut self, id: &str, factory: F) -> Self
    where
        F: Fn(&Lua) -> mlua::Result<Value> + Send + Sync + 'static,
    {
        self.bindings.insert(id.to_string(), Binding::Factory(Arc::new(factory)));
        self
    }

    /// Whether `id` is bound.
    pub fn contains(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }
}

impl ServiceLocator for ServiceContainer {
    fn resolve(&self, lua: &Lua, id: &str) -> mlua::Result<Option<Value>> {
        match self.bindings.get(id) {
            Some(Binding::Value(value)) => lua.to_value(value).map(Some),
            Some(Binding::Factory(factory)) => factory(lua).map(Some),
            None => Ok(None),
        }
    }
}
