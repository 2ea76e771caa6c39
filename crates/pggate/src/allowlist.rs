//! Table and function allow-lists.
//!
//! Both lists are fixed once the gateway is built. Tables come from configuration at startup;
//! functions are a compiled-in constant.

use crate::error::{GatewayError, GatewayResult};
use crate::ident::quote_identifier;
use crate::request::QueryRequest;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Stored procedures the gateway may invoke.
pub const DEFAULT_RPC_FUNCTIONS: &[&str] = &[
    "get_reports_within_radius",
    "get_incidents_within_radius",
    "get_nearby_responders",
    "get_organization_stats",
];

/// Read-only set of table names a request may target.
#[derive(Debug, Clone, Default)]
pub struct TableAllowList {
    tables: Arc<BTreeSet<String>>,
}

impl TableAllowList {
    /// Build from names, validating each as an identifier.
    pub fn new<I, S>(tables: I) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for table in tables {
            let table = table.into();
            quote_identifier(&table)?;
            set.insert(table);
        }
        Ok(Self {
            tables: Arc::new(set),
        })
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Fail with [`GatewayError::TableNotAllowed`] unless `table` is listed.
    pub fn check(&self, table: &str) -> GatewayResult<()> {
        if self.contains(table) {
            Ok(())
        } else {
            Err(GatewayError::TableNotAllowed(table.to_string()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Read-only set of stored-procedure names; only constructible from static names.
#[derive(Debug, Clone, Copy)]
pub struct FunctionAllowList {
    functions: &'static [&'static str],
}

impl FunctionAllowList {
    pub const fn new(functions: &'static [&'static str]) -> Self {
        Self { functions }
    }

    pub fn contains(&self, function: &str) -> bool {
        self.functions.contains(&function)
    }

    /// Fail with [`GatewayError::FunctionNotAllowed`] unless `function` is listed.
    pub fn check(&self, function: &str) -> GatewayResult<()> {
        if self.contains(function) {
            Ok(())
        } else {
            Err(GatewayError::FunctionNotAllowed(function.to_string()))
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.functions
    }
}

impl Default for FunctionAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_RPC_FUNCTIONS)
    }
}

/// The pair of allow-lists a request is checked against.
#[derive(Debug, Clone, Default)]
pub struct AllowLists {
    pub tables: TableAllowList,
    pub functions: FunctionAllowList,
}

impl AllowLists {
    pub fn new(tables: TableAllowList, functions: FunctionAllowList) -> Self {
        Self { tables, functions }
    }

    /// Check the table of a table action, or the function of an `rpc` call.
    pub fn check(&self, request: &QueryRequest) -> GatewayResult<()> {
        match request {
            QueryRequest::Rpc(rpc) => self.functions.check(&rpc.function_name),
            _ => self.tables.check(request.target()),
        }
    }
}
