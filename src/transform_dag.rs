//! Materialize derived tables from SQL templates in dependency order.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::store::{validate_identifier, SqlExecutor, StoreError};
use crate::templates::{SqlTemplates, TemplateError, TemplateVars};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformNode {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TransformNode {
    pub fn new(name: &str, depends_on: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform {0:?} is registered twice")]
    DuplicateNode(String),
    #[error("invalid transform name: {0}")]
    InvalidName(#[source] StoreError),
    #[error("transform {node:?} depends on unknown transform {dependency:?}")]
    UnknownDependency { node: String, dependency: String },
    #[error("dependency cycle among transforms: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("failed to render transform {node:?}: {source}")]
    Template {
        node: String,
        #[source]
        source: TemplateError,
    },
    #[error("transform {node:?} failed: {source}")]
    Execute {
        node: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub materialized: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformDag {
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
}

impl TransformDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes<'a>(
        nodes: impl IntoIterator<Item = &'a TransformNode>,
    ) -> Result<Self, TransformError> {
        let mut dag = Self::new();
        for node in nodes {
            let deps: Vec<&str> = node.depends_on.iter().map(String::as_str).collect();
            dag.add(&node.name, &deps)?;
        }
        Ok(dag)
    }

    pub fn add(&mut self, name: &str, depends_on: &[&str]) -> Result<(), TransformError> {
        validate_identifier(name).map_err(TransformError::InvalidName)?;
        if self.nodes.iter().any(|n| n == name) {
            return Err(TransformError::DuplicateNode(name.to_string()));
        }
        self.nodes.push(name.to_string());
        for dep in depends_on {
            self.edges.push((dep.to_string(), name.to_string()));
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Kahn's algorithm; among ready nodes the earliest registered goes first.
    pub fn static_order(&self) -> Result<Vec<String>, TransformError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut in_degree = vec![0usize; self.nodes.len()];
        for (dep, node) in &self.edges {
            let Some(&from) = index.get(dep.as_str()) else {
                return Err(TransformError::UnknownDependency {
                    node: node.clone(),
                    dependency: dep.clone(),
                });
            };
            let to = index[node.as_str()];
            dependents[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].clone());
            for &to in &dependents[next] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| self.nodes[i].clone())
                .collect();
            return Err(TransformError::Cycle(stuck));
        }

        Ok(order)
    }

    // Renders every template, then materializes nodes one at a time.
    // Stops at the first failure; tables already built are left in place.
    pub fn run(
        &self,
        executor: &dyn SqlExecutor,
        templates: &SqlTemplates,
        vars: &TemplateVars,
    ) -> Result<TransformReport, TransformError> {
        let order = self.static_order()?;

        let mut statements = Vec::with_capacity(order.len());
        for node in &order {
            let select = templates
                .render(node, vars)
                .map_err(|source| TransformError::Template {
                    node: node.clone(),
                    source,
                })?;
            statements.push((node, materialize_sql(node, &select)));
        }

        info!(
            component = "transform_dag",
            event = "transform.run.start",
            nodes = order.len(),
            order = %order.join(",")
        );

        let mut materialized = Vec::with_capacity(order.len());
        for (node, sql) in statements {
            if let Err(source) = executor.execute_batch(&sql) {
                error!(
                    component = "transform_dag",
                    event = "transform.node.failed",
                    node = %node,
                    error = %source
                );
                return Err(TransformError::Execute {
                    node: node.clone(),
                    source,
                });
            }
            info!(
                component = "transform_dag",
                event = "transform.node.materialized",
                node = %node
            );
            materialized.push(node.clone());
        }

        Ok(TransformReport { materialized })
    }
}

pub fn materialize_sql(table: &str, select: &str) -> String {
    let select = select.trim().trim_end_matches(';').trim_end();
    format!("DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} AS\n{select};")
}

pub fn default_transforms() -> Vec<TransformNode> {
    vec![
        TransformNode::new("performance", &[]),
        TransformNode::new("overall_performance", &["performance"]),
        TransformNode::new("top_openings", &[]),
        TransformNode::new("play_rating_trend", &[]),
    ]
}
