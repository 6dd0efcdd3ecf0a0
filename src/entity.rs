//! Entity kinds kept in the backend and the traits the indexes work against.
//!
//! Change detection for index maintenance compares an entity against the revision it carried
//! when it was last loaded from or saved to the backend (`remember_saved`). Editing fields in
//! place leaves that revision alone, so `update` can see what moved.

use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StoreError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            Timestamp::try_from(elapsed.as_millis()).unwrap_or(Timestamp::MAX)
        })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Access {
    Private,
    Public,
}

impl Access {
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Access::Private => "private",
            Access::Public => "public",
        }
    }

    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Access::Private => Access::Public,
            Access::Public => Access::Private,
        }
    }
}

/// Where a shareable entity is listed: its city, its visibility and, for private entities,
/// its owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Placement {
    pub city_id: String,
    pub access: Access,
    pub owner_id: String,
}

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Top-level collection holding the primary records.
    const COLLECTION: &'static str;

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn timestamp(&self) -> Timestamp;
    fn touch(&mut self, timestamp: Timestamp);

    /// Records the current fields as the state the backend holds.
    fn remember_saved(&mut self);

    /// # Errors
    /// `StoreError::MissingId` if the backend has not assigned an id yet.
    fn require_id(&self) -> Result<&str, StoreError> {
        self.id().ok_or(StoreError::MissingId)
    }
}

pub trait Named: Entity {
    fn name(&self) -> &str;
    /// The name the backend holds, if this copy was loaded or saved.
    fn saved_name(&self) -> Option<&str>;
}

pub trait Shareable: Entity {
    fn placement(&self) -> Placement;
    fn saved_placement(&self) -> Option<&Placement>;
}

#[derive(Clone, Debug, PartialEq)]
struct MissionRevision {
    name: String,
    placement: Placement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub owner_id: String,
    pub city_id: String,
    pub access: Access,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(skip)]
    saved: Option<MissionRevision>,
}

impl Mission {
    #[must_use]
    pub fn new(name: &str, owner_id: &str, city_id: &str, access: Access) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            city_id: city_id.to_string(),
            access,
            description: String::new(),
            timestamp: 0,
            saved: None,
        }
    }

    /// Whether this copy carries a loaded or saved revision to diff against.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.saved.is_some()
    }
}

impl Entity for Mission {
    const COLLECTION: &'static str = "missions";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn touch(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    fn remember_saved(&mut self) {
        self.saved = Some(MissionRevision {
            name: self.name.clone(),
            placement: self.placement(),
        });
    }
}

impl Named for Mission {
    fn name(&self) -> &str {
        &self.name
    }

    fn saved_name(&self) -> Option<&str> {
        self.saved.as_ref().map(|revision| revision.name.as_str())
    }
}

impl Shareable for Mission {
    fn placement(&self) -> Placement {
        Placement {
            city_id: self.city_id.clone(),
            access: self.access,
            owner_id: self.owner_id.clone(),
        }
    }

    fn saved_placement(&self) -> Option<&Placement> {
        self.saved.as_ref().map(|revision| &revision.placement)
    }
}

/// A task belongs to any number of missions. The links are not part of the task record;
/// they live in the task/mission association index and are attached when the task is loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(skip)]
    pub mission_ids: IndexSet<String>,
    #[serde(skip)]
    saved_mission_ids: Option<IndexSet<String>>,
}

impl Task {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            description: String::new(),
            timestamp: 0,
            mission_ids: IndexSet::new(),
            saved_mission_ids: None,
        }
    }

    #[must_use]
    pub fn with_missions<I, S>(mut self, mission_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mission_ids = mission_ids.into_iter().map(Into::into).collect();
        self
    }

    /// The mission links the backend holds, if this copy was loaded or saved.
    #[must_use]
    pub fn saved_mission_ids(&self) -> Option<&IndexSet<String>> {
        self.saved_mission_ids.as_ref()
    }
}

impl Entity for Task {
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn touch(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    fn remember_saved(&mut self) {
        self.saved_mission_ids = Some(self.mission_ids.clone());
    }
}
