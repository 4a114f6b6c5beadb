//! `{{ variable }}` substitution over `<name>.sql` files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

pub type TemplateVars = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template {template} references undefined variable {variable:?}")]
    UndefinedVariable { template: String, variable: String },
    #[error("invalid template name {0:?}")]
    InvalidName(String),
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplates {
    root: PathBuf,
}

impl SqlTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, TemplateError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.sql")))
    }

    pub fn render(&self, name: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
        let path = self.path_for(name)?;
        let source = fs::read_to_string(&path).map_err(|source| TemplateError::Read {
            path: path.clone(),
            source,
        })?;
        render_str(name, &source, vars)
    }
}

pub fn render_str(template: &str, source: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let mut missing: Option<String> = None;
    let rendered = placeholder_pattern().replace_all(source, |caps: &Captures<'_>| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(variable) => Err(TemplateError::UndefinedVariable {
            template: template.to_string(),
            variable,
        }),
        None => Ok(rendered.into_owned()),
    }
}
