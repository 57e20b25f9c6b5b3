//! Project-level data: documents, layer definitions and user access.

use plaid_common::{Config, Id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Maintainer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Id,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub text_layers: Vec<LayerSummary>,
    #[serde(default)]
    pub documents: Vec<DocumentSummary>,
    #[serde(default)]
    pub readers: Vec<Id>,
    #[serde(default)]
    pub writers: Vec<Id>,
    #[serde(default)]
    pub maintainers: Vec<Id>,
}

impl Project {
    /// Highest role the user holds in this project
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        let holds = |ids: &[Id]| ids.iter().any(|id| id == user_id);
        if holds(&self.maintainers) {
            Some(Role::Maintainer)
        } else if holds(&self.writers) {
            Some(Role::Writer)
        } else if holds(&self.readers) {
            Some(Role::Reader)
        } else {
            None
        }
    }

    pub fn can_write(&self, user_id: &str) -> bool {
        self.role_of(user_id).is_some_and(|r| r >= Role::Writer)
    }

    /// Names of every document except `exclude_id`, for duplicate-name checks
    pub fn other_document_names<'a>(&'a self, exclude_id: &'a str) -> impl Iterator<Item = &'a str> {
        self.documents
            .iter()
            .filter(move |d| d.id != exclude_id)
            .map(|d| d.name.as_str())
    }
}
