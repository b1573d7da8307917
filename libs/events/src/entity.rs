//! Model entities referenced by events.

use serde::{Deserialize, Serialize};

use crate::EventError;

/// An application in the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single unit (`app/N`) of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub app: Application,
}

impl Unit {
    /// Parses a unit name, deriving its application from the part before `/`.
    pub fn parse(name: &str) -> Result<Self, EventError> {
        let Some((app, number)) = name.split_once('/') else {
            return Err(EventError::InvalidUnitName(name.to_string()));
        };
        if app.is_empty() || number.is_empty() {
            return Err(EventError::InvalidUnitName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            app: Application::new(app),
        })
    }
}

/// An established relation between this application and another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation endpoint name as declared in metadata.
    pub name: String,
    /// Platform-assigned relation id.
    pub id: u64,
    /// The remote application; `None` while no remote unit has joined.
    pub app: Option<Application>,
    /// Remote units currently in the relation.
    pub units: Vec<Unit>,
}
