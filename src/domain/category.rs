// src/domain/category.rs

use serde::Serialize;

/// The three clinical pathways a department can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Anc,
    Surgery,
    NonSurgical,
}

impl CategoryKind {
    /// Canonical lookup over the spellings staff use for department names
    /// ("Non Surgical", "non-surgical", "NONSURGICAL", "Surgical", ...).
    pub fn from_department_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match key.as_str() {
            "ANC" | "ANTENATAL" | "ANTENATALCARE" => Some(CategoryKind::Anc),
            "SURGERY" | "SURGICAL" => Some(CategoryKind::Surgery),
            "NONSURGICAL" | "NONSURGERY" => Some(CategoryKind::NonSurgical),
            _ => None,
        }
    }

    /// Search filter tokens: `anc`, `surgical`, `non_surgical`.
    pub fn from_filter(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "anc" => Some(CategoryKind::Anc),
            "surgical" | "surgery" => Some(CategoryKind::Surgery),
            "non_surgical" | "nonsurgical" | "non_surgery" => Some(CategoryKind::NonSurgical),
            _ => None,
        }
    }
}
