//! Validating model builder.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashSet;
use indexmap::IndexMap;
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::{MetadataError, Result};

use super::{EntityType, Model, Navigation, Property};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Builds a [`Model`], validating it eagerly in [`ModelBuilder::build`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: IndexMap<String, EntityTypeBuilder>,
}

impl ModelBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures an entity type, creating it on first use.
    pub fn entity(
        &mut self,
        name: &str,
        configure: impl FnOnce(&mut EntityTypeBuilder),
    ) -> &mut Self {
        let entity = self
            .entities
            .entry(name.to_string())
            .or_insert_with(|| EntityTypeBuilder::new(name));
        configure(entity);
        self
    }

    /// Validates the configuration and produces an immutable model.
    ///
    /// # Errors
    ///
    /// Returns a [`MetadataError`] describing the first inconsistency found.
    pub fn build(&self) -> Result<Model> {
        for entity in self.entities.values() {
            if let Some(err) = entity.errors.first() {
                return Err(err.clone().into());
            }
        }

        let mut entity_types: IndexMap<String, EntityType> = self
            .entities
            .values()
            .map(|b| (b.entity.name.clone(), b.entity.clone()))
            .collect();

        for entity in entity_types.values() {
            check_inheritance(&entity_types, entity)?;
        }

        let model = Model {
            id: 0,
            entity_types: entity_types.clone(),
        };
        for entity in entity_types.values() {
            check_keys(&model, entity)?;
            check_discriminator(&model, entity)?;
            check_navigations(&model, entity)?;
        }

        // String discriminators default to the entity type name
        let defaults: Vec<(String, Value)> = entity_types
            .values()
            .filter(|e| e.discriminator_value.is_none())
            .filter_map(|e| {
                let prop = model.discriminator_property(e)?;
                (prop.ty == ValueType::String).then(|| (e.name.clone(), Value::from(e.name.as_str())))
            })
            .collect();
        for (name, value) in defaults {
            if let Some(e) = entity_types.get_mut(&name) {
                e.discriminator_value = Some(value);
            }
        }

        Ok(Model {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            entity_types,
        })
    }
}

fn check_inheritance(
    entities: &IndexMap<String, EntityType>,
    entity: &EntityType,
) -> Result<()> {
    let mut seen = HashSet::new();
    seen.insert(entity.name.as_str());
    let mut current = entity;
    while let Some(base) = current.base_type.as_deref() {
        let Some(next) = entities.get(base) else {
            return Err(MetadataError::BaseTypeNotFound {
                entity: current.name.clone(),
                base: base.to_string(),
            }
            .into());
        };
        if !seen.insert(next.name.as_str()) {
            return Err(MetadataError::InheritanceCycle(entity.name.clone()).into());
        }
        current = next;
    }
    Ok(())
}

fn check_keys(model: &Model, entity: &EntityType) -> Result<()> {
    if entity.base_type.is_some() {
        if !entity.key.is_empty() {
            return Err(MetadataError::DerivedTypeKey(entity.name.clone()).into());
        }
        return Ok(());
    }
    if entity.key.is_empty() {
        return Err(MetadataError::MissingKey(entity.name.clone()).into());
    }
    for key in &entity.key {
        if model.find_property(entity, key).is_none() {
            return Err(MetadataError::KeyPropertyMissing {
                entity: entity.name.clone(),
                property: key.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_discriminator(model: &Model, entity: &EntityType) -> Result<()> {
    let root = model.root_type(entity);
    if entity.discriminator_property.is_some() && root.name != entity.name {
        return Err(MetadataError::DiscriminatorNotOnRoot {
            entity: entity.name.clone(),
            root: root.name.clone(),
        }
        .into());
    }
    if let Some(name) = &entity.discriminator_property {
        model.property(entity, name)?;
    }
    if let Some(value) = &entity.discriminator_value {
        let Some(prop) = model.discriminator_property(entity) else {
            return Err(MetadataError::NoDiscriminator {
                entity: entity.name.clone(),
                root: root.name.clone(),
            }
            .into());
        };
        if value.is_null() || !value.is_compatible_with(&prop.ty) {
            return Err(MetadataError::DiscriminatorValueIncompatible {
                entity: entity.name.clone(),
                value: value.to_string(),
                expected: prop.ty.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_navigations(model: &Model, entity: &EntityType) -> Result<()> {
    for nav in &entity.navigations {
        let target = model.entity_type(&nav.target)?;
        let fk_owner = if nav.is_collection { target } else { entity };
        for fk in &nav.foreign_key {
            model.property(fk_owner, fk)?;
        }
    }
    Ok(())
}

/// Configures a single entity type.
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    entity: EntityType,
    errors: Vec<MetadataError>,
}

impl EntityTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            entity: EntityType {
                name: name.to_string(),
                table: None,
                schema: None,
                properties: Vec::new(),
                key: Vec::new(),
                navigations: Vec::new(),
                base_type: None,
                discriminator_property: None,
                discriminator_value: None,
            },
            errors: Vec::new(),
        }
    }

    /// Maps the entity type to a table (defaults to the entity name).
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.entity.table = Some(name.to_string());
        self
    }

    /// Sets the table schema.
    pub fn schema(&mut self, schema: &str) -> &mut Self {
        self.entity.schema = Some(schema.to_string());
        self
    }

    /// Adds a required property mapped to a same-named column.
    pub fn property(&mut self, name: &str, ty: ValueType) -> &mut Self {
        self.add_property(name, ty, false)
    }

    /// Adds a nullable property mapped to a same-named column.
    pub fn optional_property(&mut self, name: &str, ty: ValueType) -> &mut Self {
        self.add_property(name, ty, true)
    }

    fn add_property(&mut self, name: &str, ty: ValueType, nullable: bool) -> &mut Self {
        let property = Property {
            name: name.to_string(),
            column: name.to_string(),
            ty: ty.underlying().clone(),
            nullable: nullable || matches!(ty, ValueType::Nullable(_)),
            store_type: None,
        };
        if let Some(existing) = self.entity.properties.iter_mut().find(|p| p.name == name) {
            *existing = property;
        } else {
            self.entity.properties.push(property);
        }
        self
    }

    /// Renames the column of a declared property.
    pub fn column(&mut self, property: &str, column: &str) -> &mut Self {
        match self.find_property_mut(property) {
            Some(p) => p.column = column.to_string(),
            None => self.missing_property(property),
        }
        self
    }

    /// Overrides the store type of a declared property.
    pub fn store_type(&mut self, property: &str, store_type: &str) -> &mut Self {
        match self.find_property_mut(property) {
            Some(p) => p.store_type = Some(store_type.to_string()),
            None => self.missing_property(property),
        }
        self
    }

    /// Declares the primary key.
    pub fn key(&mut self, properties: &[&str]) -> &mut Self {
        self.entity.key = properties.iter().map(ToString::to_string).collect();
        self
    }

    /// Declares the base type (table-per-hierarchy).
    pub fn base_type(&mut self, base: &str) -> &mut Self {
        self.entity.base_type = Some(base.to_string());
        self
    }

    /// Declares the discriminator property; only valid on a hierarchy root.
    pub fn discriminator(&mut self, property: &str) -> &mut Self {
        self.entity.discriminator_property = Some(property.to_string());
        self
    }

    /// Sets the discriminator value identifying rows of this concrete type.
    pub fn discriminator_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.entity.discriminator_value = Some(value.into());
        self
    }

    /// Adds an optional reference navigation with a foreign key on this type.
    pub fn reference(&mut self, name: &str, target: &str, foreign_key: &[&str]) -> &mut Self {
        self.add_navigation(name, target, foreign_key, false, false)
    }

    /// Adds a required reference navigation with a foreign key on this type.
    pub fn required_reference(
        &mut self,
        name: &str,
        target: &str,
        foreign_key: &[&str],
    ) -> &mut Self {
        self.add_navigation(name, target, foreign_key, false, true)
    }

    /// Adds a collection navigation with a foreign key on the target type.
    pub fn collection(&mut self, name: &str, target: &str, foreign_key: &[&str]) -> &mut Self {
        self.add_navigation(name, target, foreign_key, true, false)
    }

    fn add_navigation(
        &mut self,
        name: &str,
        target: &str,
        foreign_key: &[&str],
        is_collection: bool,
        is_required: bool,
    ) -> &mut Self {
        self.entity.navigations.push(Navigation {
            name: name.to_string(),
            target: target.to_string(),
            foreign_key: foreign_key.iter().map(ToString::to_string).collect(),
            is_collection,
            is_required,
        });
        self
    }

    fn find_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.entity.properties.iter_mut().find(|p| p.name == name)
    }

    fn missing_property(&mut self, property: &str) {
        self.errors.push(MetadataError::PropertyNotFound {
            entity: self.entity.name.clone(),
            property: property.to_string(),
        });
    }
}
