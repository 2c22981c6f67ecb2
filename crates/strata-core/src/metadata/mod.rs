//! Metadata model: entity types, properties, navigations, and keys.
//!
//! The model is immutable once built (see [`ModelBuilder`]) and read-only
//! from the query pipeline's perspective. Each built model carries a
//! process-unique identity used in compiled-query cache keys.
//!
//! Inheritance is table-per-hierarchy: derived entity types share the
//! root's table and schema, and rows are told apart by an optional
//! discriminator column declared on the root.

mod builder;

use indexmap::IndexMap;
use strata_common::types::{Value, ValueType};
use strata_common::utils::error::MetadataError;
use strata_common::utils::hash::stable_hash;

pub use builder::{EntityTypeBuilder, ModelBuilder};

/// A mapped scalar property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Column name.
    pub column: String,
    /// Non-nullable base type.
    pub ty: ValueType,
    /// Whether the column admits null.
    pub nullable: bool,
    /// Explicit store type, overriding the type mapper's default.
    pub store_type: Option<String>,
}

impl Property {
    /// Returns the property's type as seen by query expressions.
    #[must_use]
    pub fn clr_type(&self) -> ValueType {
        if self.nullable {
            self.ty.clone().make_nullable()
        } else {
            self.ty.clone()
        }
    }
}

/// A navigation to a related entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// Navigation name.
    pub name: String,
    /// Target entity type.
    pub target: String,
    /// Foreign key properties. For references they live on the declaring
    /// type; for collections they live on the target.
    pub foreign_key: Vec<String>,
    /// True for one-to-many navigations.
    pub is_collection: bool,
    /// True if the foreign key is required (reference navigations only).
    pub is_required: bool,
}

/// An entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) schema: Option<String>,
    pub(crate) properties: Vec<Property>,
    pub(crate) key: Vec<String>,
    pub(crate) navigations: Vec<Navigation>,
    pub(crate) base_type: Option<String>,
    pub(crate) discriminator_property: Option<String>,
    pub(crate) discriminator_value: Option<Value>,
}

impl EntityType {
    /// Returns the entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the properties declared on this type (not inherited ones).
    #[must_use]
    pub fn declared_properties(&self) -> &[Property] {
        &self.properties
    }

    /// Returns the navigations declared on this type.
    #[must_use]
    pub fn declared_navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    /// Returns the base type name.
    #[must_use]
    pub fn base_type(&self) -> Option<&str> {
        self.base_type.as_deref()
    }

    /// Returns the discriminator value for this concrete type.
    #[must_use]
    pub fn discriminator_value(&self) -> Option<&Value> {
        self.discriminator_value.as_ref()
    }
}

/// An immutable, validated metadata model.
#[derive(Debug, Clone)]
pub struct Model {
    id: u64,
    entity_types: IndexMap<String, EntityType>,
}

impl Model {
    /// Starts building a model.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    /// Returns the process-unique model identity.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the hash representing this model's identity in cache keys.
    #[must_use]
    pub fn identity_hash(&self) -> u64 {
        stable_hash(&("strata-model", self.id))
    }

    /// Iterates entity types in declaration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entity_types.values()
    }

    /// Looks up an entity type.
    #[must_use]
    pub fn find_entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.get(name)
    }

    /// Looks up an entity type, failing if it does not exist.
    pub fn entity_type(&self, name: &str) -> Result<&EntityType, MetadataError> {
        self.find_entity_type(name)
            .ok_or_else(|| MetadataError::EntityNotFound(name.to_string()))
    }

    /// Returns the chain from the hierarchy root down to `entity`.
    #[must_use]
    pub fn hierarchy_chain<'a>(&'a self, entity: &'a EntityType) -> Vec<&'a EntityType> {
        let mut chain = vec![entity];
        let mut current = entity;
        while let Some(base) = current.base_type.as_deref().and_then(|b| self.find_entity_type(b))
        {
            // Validation rejects cycles; the guard keeps lookups total regardless
            if chain.iter().any(|e| e.name == base.name) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain.reverse();
        chain
    }

    /// Returns the hierarchy root of `entity`.
    #[must_use]
    pub fn root_type<'a>(&'a self, entity: &'a EntityType) -> &'a EntityType {
        self.hierarchy_chain(entity)[0]
    }

    /// Returns all properties of `entity`, inherited ones first.
    #[must_use]
    pub fn properties<'a>(&'a self, entity: &'a EntityType) -> Vec<&'a Property> {
        self.hierarchy_chain(entity)
            .into_iter()
            .flat_map(|e| e.properties.iter())
            .collect()
    }

    /// Finds a property on `entity` or its base types.
    #[must_use]
    pub fn find_property<'a>(&'a self, entity: &'a EntityType, name: &str) -> Option<&'a Property> {
        self.properties(entity).into_iter().find(|p| p.name == name)
    }

    /// Finds a property, failing with a metadata error.
    pub fn property<'a>(
        &'a self,
        entity: &'a EntityType,
        name: &str,
    ) -> Result<&'a Property, MetadataError> {
        self.find_property(entity, name)
            .ok_or_else(|| MetadataError::PropertyNotFound {
                entity: entity.name.clone(),
                property: name.to_string(),
            })
    }

    /// Finds a navigation on `entity` or its base types.
    #[must_use]
    pub fn find_navigation<'a>(
        &'a self,
        entity: &'a EntityType,
        name: &str,
    ) -> Option<&'a Navigation> {
        self.hierarchy_chain(entity)
            .into_iter()
            .flat_map(|e| e.navigations.iter())
            .find(|n| n.name == name)
    }

    /// Returns the primary key properties of `entity`.
    #[must_use]
    pub fn key<'a>(&'a self, entity: &'a EntityType) -> Vec<&'a Property> {
        let root = self.root_type(entity);
        root.key
            .iter()
            .filter_map(|k| self.find_property(root, k))
            .collect()
    }

    /// Returns all types deriving (transitively) from `entity`.
    #[must_use]
    pub fn derived_types<'a>(&'a self, entity: &'a EntityType) -> Vec<&'a EntityType> {
        self.entity_types
            .values()
            .filter(|e| {
                e.name != entity.name
                    && self
                        .hierarchy_chain(e)
                        .iter()
                        .any(|ancestor| ancestor.name == entity.name)
            })
            .collect()
    }

    /// Returns the table name, resolved from the hierarchy root.
    #[must_use]
    pub fn table_name<'a>(&'a self, entity: &'a EntityType) -> &'a str {
        let root = self.root_type(entity);
        root.table.as_deref().unwrap_or(&root.name)
    }

    /// Returns the schema, resolved from the hierarchy root.
    #[must_use]
    pub fn schema<'a>(&'a self, entity: &'a EntityType) -> Option<&'a str> {
        self.root_type(entity).schema.as_deref()
    }

    /// Returns the hierarchy's discriminator property, if any.
    #[must_use]
    pub fn discriminator_property<'a>(&'a self, entity: &'a EntityType) -> Option<&'a Property> {
        let root = self.root_type(entity);
        root.discriminator_property
            .as_deref()
            .and_then(|name| self.find_property(root, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_model() -> Model {
        let mut builder = Model::builder();
        builder
            .entity("Blog", |e| {
                e.table("Blogs")
                    .schema("dbo")
                    .property("Id", ValueType::Int32)
                    .property("Url", ValueType::String)
                    .property("Kind", ValueType::String)
                    .key(&["Id"])
                    .discriminator("Kind");
            })
            .entity("RssBlog", |e| {
                e.base_type("Blog")
                    .optional_property("FeedUrl", ValueType::String)
                    .discriminator_value("rss");
            })
            .entity("Post", |e| {
                e.property("Id", ValueType::Int32)
                    .property("BlogId", ValueType::Int32)
                    .key(&["Id"])
                    .required_reference("Blog", "Blog", &["BlogId"]);
            });
        builder.build().unwrap()
    }

    #[test]
    fn test_hierarchy_shares_root_table() {
        let model = blog_model();
        let rss = model.entity_type("RssBlog").unwrap();
        assert_eq!(model.table_name(rss), "Blogs");
        assert_eq!(model.schema(rss), Some("dbo"));
        assert_eq!(model.root_type(rss).name(), "Blog");
    }

    #[test]
    fn test_inherited_properties_come_first() {
        let model = blog_model();
        let rss = model.entity_type("RssBlog").unwrap();
        let names: Vec<&str> = model.properties(rss).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Url", "Kind", "FeedUrl"]);
        assert_eq!(model.key(rss)[0].name, "Id");
    }

    #[test]
    fn test_derived_types() {
        let model = blog_model();
        let blog = model.entity_type("Blog").unwrap();
        let derived: Vec<&str> = model.derived_types(blog).iter().map(|e| e.name()).collect();
        assert_eq!(derived, vec!["RssBlog"]);
    }

    #[test]
    fn test_default_discriminator_value_is_type_name() {
        let model = blog_model();
        let blog = model.entity_type("Blog").unwrap();
        assert_eq!(blog.discriminator_value(), Some(&Value::from("Blog")));
        let rss = model.entity_type("RssBlog").unwrap();
        assert_eq!(rss.discriminator_value(), Some(&Value::from("rss")));
        assert_eq!(model.discriminator_property(rss).unwrap().name, "Kind");
    }

    #[test]
    fn test_unknown_entity_lookup() {
        let model = blog_model();
        assert_eq!(
            model.entity_type("Comment").unwrap_err(),
            MetadataError::EntityNotFound("Comment".to_string())
        );
    }

    #[test]
    fn test_models_have_distinct_identity() {
        let a = blog_model();
        let b = blog_model();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.identity_hash(), b.identity_hash());
        assert_eq!(a.identity_hash(), a.clone().identity_hash());
    }
}
