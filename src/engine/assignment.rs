//! Department enumeration and category routing hints.
//!
//! Tickets are routed to departments, never to individual employees. An admin
//! assigns the department explicitly; the category only provides a suggestion
//! that listings surface next to unassigned tickets.

use serde::{Deserialize, Serialize};

use crate::db::Category;

/// Organizational unit that owns a class of tickets and employs staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Department {
    Electrical,
    #[serde(rename = "Water Supply")]
    #[sqlx(rename = "Water Supply")]
    WaterSupply,
    Sanitation,
    Roads,
    Drainage,
    #[serde(rename = "Public Health")]
    #[sqlx(rename = "Public Health")]
    PublicHealth,
}

impl Department {
    pub const ALL: [Department; 6] = [
        Department::Electrical,
        Department::WaterSupply,
        Department::Sanitation,
        Department::Roads,
        Department::Drainage,
        Department::PublicHealth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Electrical => "Electrical",
            Department::WaterSupply => "Water Supply",
            Department::Sanitation => "Sanitation",
            Department::Roads => "Roads",
            Department::Drainage => "Drainage",
            Department::PublicHealth => "Public Health",
        }
    }

    /// Comma-separated list for error messages
    pub fn valid_names() -> String {
        Department::ALL
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', " ");
        Department::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("Unknown department: {}", s))
    }
}

/// Department that usually handles a category, if any
pub fn suggested_department(category: Category) -> Option<Department> {
    match category {
        Category::Electrical => Some(Department::Electrical),
        Category::WaterSupply => Some(Department::WaterSupply),
        Category::Sanitation => Some(Department::Sanitation),
        Category::Roads => Some(Department::Roads),
        Category::Drainage => Some(Department::Drainage),
        Category::PublicHealth => Some(Department::PublicHealth),
        Category::Other => None,
    }
}
