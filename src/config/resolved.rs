//! Resolved model descriptors: what the operation helper and the managers read at runtime.
//! Built either from a validated models file (see `loader`) or in code with the builder methods.

use crate::case::to_snake_case;
use crate::config::{ColumnDefaultConfig, ValidationRule};
use std::collections::HashMap;

/// Primary key type, used to generate keys in the memory store and to pick SQL casts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

impl PkType {
    pub fn from_sql_type(sql_type: &str) -> PkType {
        let type_lower = sql_type.to_lowercase();
        if type_lower.contains("uuid") {
            PkType::Uuid
        } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
            PkType::BigInt
        } else if type_lower.contains("serial") || type_lower.contains("integer") || type_lower.contains("int") {
            PkType::Int
        } else {
            PkType::Text
        }
    }
}

/// Target of a foreign key field. Carries a copy of the target's fields so lookups through the
/// relation (`author__name`) can be checked and cast without the target descriptor.
#[derive(Clone, Debug)]
pub struct RelationInfo {
    pub model: String,
    pub schema_name: String,
    pub table_name: String,
    /// Column on the target the foreign key points at (usually its primary key).
    pub to_field: String,
    pub fields: Vec<FieldInfo>,
}

impl RelationInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    /// Type as written in DDL (e.g. "varchar(200)", "bigserial").
    pub sql_type: String,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding values.
    pub pg_type: Option<String>,
    pub nullable: bool,
    pub default: Option<ColumnDefaultConfig>,
    pub unique: bool,
    pub primary_key: bool,
    pub relation: Option<RelationInfo>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        FieldInfo {
            name: name.into(),
            pg_type: cast_type_for(&sql_type),
            sql_type,
            nullable: true,
            default: None,
            unique: false,
            primary_key: false,
            relation: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_literal(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(ColumnDefaultConfig::Literal(literal.into()));
        self
    }

    pub fn default_expression(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(ColumnDefaultConfig::Expression { expression: expression.into() });
        self
    }

    /// Foreign key to `target`'s primary key.
    pub fn references(mut self, target: &ModelMeta) -> Self {
        self.relation = Some(RelationInfo {
            model: target.name.clone(),
            schema_name: target.schema_name.clone(),
            table_name: target.table_name.clone(),
            to_field: target.pk_column.clone(),
            fields: target.fields.iter().map(FieldInfo::without_relation).collect(),
        });
        self
    }

    /// Whether the store fills the value when none is supplied (DEFAULT or serial).
    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.sql_type.to_lowercase().contains("serial")
    }

    /// Type used in `$n::type` casts: the explicit cast type, else the DDL type with serial
    /// pseudo-types mapped to their integer type.
    pub fn cast_type(&self) -> String {
        if let Some(t) = &self.pg_type {
            return t.clone();
        }
        match self.sql_type.to_lowercase().as_str() {
            "bigserial" | "serial8" => "bigint".into(),
            "serial" | "serial4" => "integer".into(),
            "smallserial" | "serial2" => "smallint".into(),
            _ => self.sql_type.clone(),
        }
    }

    pub(crate) fn without_relation(&self) -> FieldInfo {
        FieldInfo {
            relation: None,
            ..self.clone()
        }
    }
}

/// Cast applied to bound parameters so text/JSON values bind to typed columns.
pub fn cast_type_for(sql_type: &str) -> Option<String> {
    let lower = sql_type.to_lowercase();
    if lower == "timestamptz" || lower == "timestamp with time zone" {
        Some("timestamptz".into())
    } else if lower == "timestamp" || lower.starts_with("timestamp ") {
        Some("timestamp".into())
    } else if lower == "date" {
        Some("date".into())
    } else if lower.contains("uuid") {
        Some("uuid".into())
    } else if lower == "numeric" || lower.starts_with("numeric(") || lower.starts_with("decimal") {
        Some("numeric".into())
    } else if lower == "jsonb" {
        Some("jsonb".into())
    } else if sql_type.contains('.') {
        // Schema-qualified custom type (e.g. library.book_status); cast so text binds correctly
        Some(sql_type.to_string())
    } else {
        None
    }
}

/// Descriptor of one model: its declared fields and table.
#[derive(Clone, Debug)]
pub struct ModelMeta {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    /// Empty until a primary key field is declared.
    pub pk_column: String,
    pub pk_type: PkType,
    pub fields: Vec<FieldInfo>,
    /// Composite unique constraints.
    pub unique: Vec<Vec<String>>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ModelMeta {
    /// New descriptor in schema `public` with table `snake_case(name)`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        ModelMeta {
            table_name: to_snake_case(&name),
            name,
            schema_name: "public".into(),
            pk_column: String::new(),
            pk_type: PkType::Text,
            fields: Vec::new(),
            unique: Vec::new(),
            validation: HashMap::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = schema.into();
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        if field.primary_key {
            self.pk_column = field.name.clone();
            self.pk_type = PkType::from_sql_type(&field.sql_type);
        }
        self.fields.push(field);
        self
    }

    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique.push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn validate(mut self, field: impl Into<String>, rule: ValidationRule) -> Self {
        self.validation.insert(field.into(), rule);
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    pub fn pk_field(&self) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

/// All models of a models file, by name.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    pub models: Vec<ModelMeta>,
    pub by_name: HashMap<String, ModelMeta>,
}

impl ModelRegistry {
    pub fn get(&self, name: &str) -> Option<&ModelMeta> {
        self.by_name.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_tracks_primary_key_and_relations() {
        let author = ModelMeta::new("Author")
            .table("authors")
            .field(FieldInfo::new("id", "bigserial").primary_key())
            .field(FieldInfo::new("name", "varchar(200)").not_null().unique());
        assert_eq!(author.pk_column, "id");
        assert_eq!(author.pk_type, PkType::BigInt);
        assert!(author.pk_field().map(FieldInfo::has_default).unwrap_or(false));

        let book = ModelMeta::new("BookReview").field(FieldInfo::new("author", "bigint").references(&author));
        assert_eq!(book.table_name, "book_review");
        let rel = book.get_field("author").and_then(|f| f.relation.as_ref()).expect("relation");
        assert_eq!(rel.table_name, "authors");
        assert_eq!(rel.to_field, "id");
        assert!(rel.field("name").is_some());
        assert_eq!(book.field_names().collect::<Vec<_>>(), vec!["author"]);
    }

    #[test]
    fn casts_for_typed_columns() {
        assert_eq!(cast_type_for("timestamptz").as_deref(), Some("timestamptz"));
        assert_eq!(cast_type_for("UUID").as_deref(), Some("uuid"));
        assert_eq!(cast_type_for("numeric(10, 2)").as_deref(), Some("numeric"));
        assert_eq!(cast_type_for("library.book_status").as_deref(), Some("library.book_status"));
        assert_eq!(cast_type_for("varchar(20)"), None);
        assert_eq!(FieldInfo::new("id", "bigserial").cast_type(), "bigint");
        assert_eq!(FieldInfo::new("title", "varchar(20)").cast_type(), "varchar(20)");
        assert_eq!(FieldInfo::new("at", "timestamptz").cast_type(), "timestamptz");
    }
}
