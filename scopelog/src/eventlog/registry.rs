//! Entity registry
//!
//! Maps owner keys to live entities and remembers the last float emitted per
//! `(entity, parameter)` so unchanged samples can be suppressed. Not
//! synchronized on its own; the writer keeps it behind its lock.

use std::collections::HashMap;

use scopelog_common::Transform;

use crate::domain::{EntityId, EntityKey, Frame};

/// Metadata supplied when registering an entity
///
/// `None` fields keep the entity's current value on re-registration and fall
/// back to defaults for a new entity.
#[derive(Debug, Clone, Default)]
pub struct EntityInfo {
    pub name: Option<String>,
    pub path: Option<String>,
    pub type_name: Option<String>,
    pub category: Option<String>,
    pub static_params: Option<Vec<(String, String)>>,
    pub transform: Option<Transform>,
}

impl EntityInfo {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn static_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_params.get_or_insert_with(Vec::new).push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// A registered telemetry subject
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub path: String,
    pub type_name: String,
    pub category: String,
    pub static_params: Vec<(String, String)>,
    pub transform: Transform,
    pub creation_frame: Frame,
}

impl Entity {
    fn new(id: EntityId, key: EntityKey, frame: Frame) -> Self {
        Self {
            id,
            name: key.to_string(),
            path: String::new(),
            type_name: String::new(),
            category: String::new(),
            static_params: Vec::new(),
            transform: Transform::IDENTITY,
            creation_frame: frame,
        }
    }

    fn apply(&mut self, info: EntityInfo, frame: Frame) {
        if let Some(name) = info.name {
            self.name = name;
        }
        if let Some(path) = info.path {
            self.path = path;
        }
        if let Some(type_name) = info.type_name {
            self.type_name = type_name;
        }
        if let Some(category) = info.category {
            self.category = category;
        }
        if let Some(params) = info.static_params {
            self.static_params = params;
        }
        if let Some(transform) = info.transform {
            self.transform = transform;
        }
        self.creation_frame = frame;
    }
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityKey, Entity>,
    last_values: HashMap<(EntityId, String), f32>,
    next_id: u64,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(&key)
    }

    /// Number of live entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Create or update the entity for `key`; the id is kept on update.
    pub fn register(&mut self, key: EntityKey, info: EntityInfo, frame: Frame) -> &Entity {
        let next_id = &mut self.next_id;
        let entity = self.entities.entry(key).or_insert_with(|| {
            *next_id += 1;
            Entity::new(EntityId(*next_id), key, frame)
        });
        entity.apply(info, frame);
        entity
    }

    /// Look up the entity for `key`, creating it with defaults if unknown.
    ///
    /// The flag is `true` when the entity was created by this call.
    pub fn get_or_register(&mut self, key: EntityKey, frame: Frame) -> (&Entity, bool) {
        let next_id = &mut self.next_id;
        let mut created = false;
        let entity = self.entities.entry(key).or_insert_with(|| {
            created = true;
            *next_id += 1;
            Entity::new(EntityId(*next_id), key, frame)
        });
        (entity, created)
    }

    /// Drop the binding for `key`, returning the removed entity.
    pub fn unregister(&mut self, key: EntityKey) -> Option<Entity> {
        let entity = self.entities.remove(&key)?;
        self.last_values.retain(|(id, _), _| *id != entity.id);
        Some(entity)
    }

    /// Whether `value` differs from the last value recorded for the pair
    #[must_use]
    pub fn value_changed(&self, id: EntityId, param: &str, value: f32) -> bool {
        self.last_values
            .get(&(id, param.to_string()))
            .map_or(true, |last| last.to_bits() != value.to_bits())
    }

    pub fn record_value(&mut self, id: EntityId, param: &str, value: f32) {
        self.last_values.insert((id, param.to_string()), value);
    }
}
