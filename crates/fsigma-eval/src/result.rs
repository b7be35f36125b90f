use fsigma_parser::RuleDocument;
use serde::{Deserialize, Serialize};

/// The metadata a compiled rule reports when it matches.
///
/// `level` and `description` are empty when the document omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    pub title: String,
    pub id: Option<String>,
    pub level: String,
    pub description: String,
}

impl From<&RuleDocument> for RuleMeta {
    fn from(doc: &RuleDocument) -> Self {
        RuleMeta {
            title: doc.title.clone(),
            id: doc.id.clone(),
            level: doc.level.clone().unwrap_or_default(),
            description: doc.description.clone().unwrap_or_default(),
        }
    }
}
