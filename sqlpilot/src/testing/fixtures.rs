//! A small school database used across tests.

use std::collections::BTreeMap;

use crate::agents::ValueMappings;
use crate::catalog::InMemorySchemaCatalog;
use crate::state::{ColumnInfo, Relationship, SchemaInfo, TableInfo};

/// Connection id the school schema is registered under.
pub const SCHOOL_CONNECTION: i64 = 1;

/// Teachers, classes, students and exam scores.
#[must_use]
pub fn school_schema() -> SchemaInfo {
    let tables = [
        TableInfo::new("teachers")
            .with_description("教师")
            .with_column(ColumnInfo::new("id", "INTEGER").primary_key())
            .with_column(ColumnInfo::new("name", "TEXT"))
            .with_column(ColumnInfo::new("subject", "TEXT"))
            .with_column(ColumnInfo::new("title", "TEXT").with_description("职称")),
        TableInfo::new("classes")
            .with_description("班级")
            .with_column(ColumnInfo::new("id", "INTEGER").primary_key())
            .with_column(ColumnInfo::new("name", "TEXT"))
            .with_column(ColumnInfo::new("grade", "INTEGER"))
            .with_column(ColumnInfo::new("teacher_id", "INTEGER").foreign_key()),
        TableInfo::new("students")
            .with_description("学生")
            .with_column(ColumnInfo::new("id", "INTEGER").primary_key())
            .with_column(ColumnInfo::new("name", "TEXT"))
            .with_column(ColumnInfo::new("gender", "TEXT"))
            .with_column(ColumnInfo::new("class_id", "INTEGER").foreign_key())
            .with_column(ColumnInfo::new("teacher_id", "INTEGER").foreign_key()),
        TableInfo::new("scores")
            .with_description("成绩")
            .with_column(ColumnInfo::new("id", "INTEGER").primary_key())
            .with_column(ColumnInfo::new("student_id", "INTEGER").foreign_key())
            .with_column(ColumnInfo::new("subject", "TEXT"))
            .with_column(ColumnInfo::new("score", "REAL"))
            .with_column(ColumnInfo::new("exam_date", "DATE")),
    ];

    SchemaInfo {
        tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        relationships: vec![
            Relationship::new("classes", "teacher_id", "teachers", "id"),
            Relationship::new("students", "class_id", "classes", "id"),
            Relationship::new("students", "teacher_id", "teachers", "id"),
            Relationship::new("scores", "student_id", "students", "id"),
        ],
        value_mappings: BTreeMap::new(),
    }
}

/// Natural-language terms for stored values.
#[must_use]
pub fn school_value_mappings() -> ValueMappings {
    let mut mappings = ValueMappings::new();
    mappings.insert(
        "teachers.title".to_string(),
        [("高级教师", "senior"), ("一级教师", "first_grade")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    mappings.insert(
        "students.gender".to_string(),
        [("男", "M"), ("女", "F")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    mappings
}

/// A catalog holding the school schema under [`SCHOOL_CONNECTION`].
#[must_use]
pub fn school_catalog() -> InMemorySchemaCatalog {
    let catalog = InMemorySchemaCatalog::new();
    catalog.register(SCHOOL_CONNECTION, school_schema(), school_value_mappings());
    catalog
}
