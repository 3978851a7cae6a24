//! Task query predicates
//!
//! Filters compile to SQL fragments over the `tasks` table. The fragments are
//! joined with AND, so an empty set of filters lists every task.

use rusqlite::types::Value;

use crate::models::{Filter, Task};

/// A boolean SQL expression with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A predicate every row satisfies.
    pub fn always() -> Self {
        Self::new("1=1", Vec::new())
    }

    pub fn is_always(&self) -> bool {
        self.sql == "1=1" && self.params.is_empty()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Logical AND of all predicates. Trivial members are dropped.
    pub fn conjunction<I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for predicate in predicates {
            if predicate.is_always() {
                continue;
            }
            clauses.push(format!("({})", predicate.sql));
            params.extend(predicate.params);
        }

        if clauses.is_empty() {
            Self::always()
        } else {
            Self::new(clauses.join(" AND "), params)
        }
    }
}

/// The stored filters applied together when listing tasks.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The store-side half: one conjunctive predicate.
    pub fn predicate(&self) -> Predicate {
        Predicate::conjunction(self.filters.iter().map(Filter::to_predicate))
    }

    /// The in-memory half, applied to tasks the predicate already admitted.
    pub fn refine(&self, task: &Task) -> bool {
        self.filters.iter().all(|filter| filter.refine(task))
    }

    /// Drop loaded tasks that fail the in-memory refinement.
    pub fn apply_refinement(&self, tasks: Vec<Task>) -> Vec<Task> {
        if !self.filters.iter().any(Filter::needs_refinement) {
            return tasks;
        }
        tasks.into_iter().filter(|task| self.refine(task)).collect()
    }
}
