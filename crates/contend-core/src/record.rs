use serde::{Deserialize, Serialize};

/// A row a worker asks the store to insert. The store assigns the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewRecord {
    pub name: String,
    pub category: String,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

impl std::fmt::Display for NewRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} the {}", self.name, self.category)
    }
}

/// A committed row in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
    pub category: String,
}

impl Record {
    /// The fields a worker supplied, without the store-assigned identity.
    pub fn fields(&self) -> NewRecord {
        NewRecord::new(self.name.clone(), self.category.clone())
    }
}
