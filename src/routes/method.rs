use crate::{types::METHOD_LEN_LIMIT, RegistrationError, Route};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

/// Metadata describing a registered method.
///
/// Type names come from [`std::any::type_name`], and are intended for
/// diagnostics only. They are not stable across compiler versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// The method name.
    pub name: String,
    /// The Rust type name of the params.
    pub params: &'static str,
    /// The Rust type name of the result.
    pub result: &'static str,
    /// The number of middlewares wrapping the handler.
    pub middleware: usize,
}

/// A registered method: the erased route and its metadata.
#[derive(Debug, Clone)]
pub(crate) struct Method {
    route: Route,
    info: Arc<MethodInfo>,
}

impl Method {
    pub(crate) fn new(route: Route, info: MethodInfo) -> Self {
        Self {
            route,
            info: Arc::new(info),
        }
    }

    pub(crate) const fn route(&self) -> &Route {
        &self.route
    }

    pub(crate) fn info(&self) -> &MethodInfo {
        &self.info
    }
}

/// The method registry. Built by the [`Hub`] builder and frozen when the hub
/// starts.
///
/// [`Hub`]: crate::Hub
#[derive(Debug, Clone, Default)]
pub(crate) struct Methods(HashMap<String, Method>);

impl Methods {
    /// Check that a method name is routable.
    fn check_name(name: &str) -> Result<(), RegistrationError> {
        if name.is_empty() || name.len() > METHOD_LEN_LIMIT {
            return Err(RegistrationError::InvalidName(name.to_owned()));
        }
        Ok(())
    }

    /// Insert a method. Registering a name twice is an error, and leaves the
    /// first registration in place.
    pub(crate) fn insert(&mut self, method: Method) -> Result<(), RegistrationError> {
        let name = method.info.name.clone();
        Self::check_name(&name)?;
        if self.0.contains_key(&name) {
            return Err(RegistrationError::DuplicateMethod(name));
        }
        self.0.insert(name, method);
        Ok(())
    }

    /// Look up a method by name.
    pub(crate) fn get(&self, name: &str) -> Option<&Method> {
        self.0.get(name)
    }

    /// Metadata for all registered methods, sorted by name.
    pub(crate) fn infos(&self) -> Vec<MethodInfo> {
        let mut infos: Vec<_> = self.0.values().map(|m| m.info().clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}
