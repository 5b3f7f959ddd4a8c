//! Caller identity and access checks.
//!
//! A caller is either a user holding capabilities or a service. Queries are
//! guarded by access annotations, each naming the capabilities and services
//! allowed through.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// The authenticated caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Calling user, when the request comes from a person.
    pub user: Option<String>,

    /// Calling service, when the request comes from another service.
    pub service: Option<String>,

    /// Capabilities held by the user.
    pub capabilities: HashSet<String>,
}

impl Caller {
    /// A user caller with the given capabilities.
    pub fn user<I, S>(name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: Some(name.into()),
            service: None,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    /// A service caller.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            user: None,
            service: Some(name.into()),
            capabilities: HashSet::new(),
        }
    }

    /// Whether the request carried any identity at all.
    pub fn is_anonymous(&self) -> bool {
        self.user.is_none() && self.service.is_none()
    }

    /// Principal name for logs.
    pub fn principal(&self) -> &str {
        self.service
            .as_deref()
            .or(self.user.as_deref())
            .unwrap_or("anonymous")
    }

    /// Check the caller against allowed capabilities and services.
    ///
    /// - A service is allowed if it is listed in `services`.
    /// - A user is allowed if it holds any capability in `capabilities`.
    pub fn is_allowed(
        &self,
        capabilities: &BTreeSet<String>,
        services: &BTreeSet<String>,
    ) -> bool {
        if let Some(service) = &self.service
            && services.contains(service)
        {
            return true;
        }
        self.user.is_some() && self.capabilities.iter().any(|c| capabilities.contains(c))
    }
}

/// Capabilities and services granted by a named access annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessAnnotationEntry {
    /// Annotation name (`AdminDashboardAccess`).
    pub annotation: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub services: Vec<String>,
}

impl AccessAnnotationEntry {
    pub fn capability_set(&self) -> BTreeSet<String> {
        self.capabilities.iter().cloned().collect()
    }

    pub fn service_set(&self) -> BTreeSet<String> {
        self.services.iter().cloned().collect()
    }
}

/// Access required to use the dashboard actions at all.
#[derive(Debug, Clone, Default)]
pub struct DashboardAccess {
    pub capabilities: BTreeSet<String>,
    pub services: BTreeSet<String>,
}

impl DashboardAccess {
    pub fn new<I, J>(capabilities: I, services: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            capabilities: capabilities.into_iter().collect(),
            services: services.into_iter().collect(),
        }
    }

    /// Whether the caller may use the dashboard.
    pub fn permits(&self, caller: &Caller) -> bool {
        caller.is_allowed(&self.capabilities, &self.services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn user_allowed_by_any_capability() {
        let caller = Caller::user("ana", ["eng", "dba"]);
        assert!(caller.is_allowed(&set(&["dba"]), &set(&[])));
        assert!(!caller.is_allowed(&set(&["admin"]), &set(&[])));
    }

    #[test]
    fn service_allowed_by_name() {
        let caller = Caller::service("payments");
        assert!(caller.is_allowed(&set(&[]), &set(&["payments"])));
        assert!(!caller.is_allowed(&set(&["payments"]), &set(&["billing"])));
    }

    #[test]
    fn anonymous_caller_is_never_allowed() {
        let caller = Caller::default();
        assert!(caller.is_anonymous());
        assert!(!caller.is_allowed(&set(&["admin"]), &set(&["payments"])));
        assert_eq!(caller.principal(), "anonymous");
    }

    #[test]
    fn capabilities_without_user_do_not_count() {
        let caller = Caller {
            user: None,
            service: None,
            capabilities: HashSet::from(["admin".to_string()]),
        };
        assert!(!caller.is_allowed(&set(&["admin"]), &set(&[])));
    }

    #[test]
    fn dashboard_access_checks_caller() {
        let access = DashboardAccess::new(vec!["admin".to_string()], vec!["ops".to_string()]);
        assert!(access.permits(&Caller::user("ana", ["admin"])));
        assert!(access.permits(&Caller::service("ops")));
        assert!(!access.permits(&Caller::user("bo", ["eng"])));
    }
}
