use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Ordered list of names stored as a JSON array column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl From<Vec<String>> for StringList {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

/// Marker for an install/uninstall that started but has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PendingOperation {
    #[sea_orm(string_value = "install")]
    Install,
    #[sea_orm(string_value = "uninstall")]
    Uninstall,
}

impl PendingOperation {
    pub fn as_str(&self) -> &str {
        match self {
            PendingOperation::Install => "install",
            PendingOperation::Uninstall => "uninstall",
        }
    }
}

impl std::fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "modules")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub display_name: String,
    pub version: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub active: bool,
    pub installed: bool,
    pub installable: bool,
    pub application: bool,
    pub auto_install: bool,
    #[sea_orm(column_type = "Json")]
    pub dependencies: StringList,
    #[sea_orm(column_type = "Json")]
    pub models: StringList,
    pub pending_operation: Option<PendingOperation>,
    pub installed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether this module lists `name` among its dependencies.
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Model {
        let now = chrono::Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            name: "finance".into(),
            display_name: "Finance".into(),
            version: "1.0.0".into(),
            summary: None,
            description: None,
            active: false,
            installed: true,
            installable: true,
            application: true,
            auto_install: false,
            dependencies: StringList(vec!["hr".into()]),
            models: StringList::default(),
            pending_operation: None,
            installed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_depends_on() {
        let m = sample();
        assert!(m.depends_on("hr"));
        assert!(!m.depends_on("finance"));
    }

    #[test]
    fn test_serializes_camel_case_with_plain_lists() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["displayName"], "Finance");
        assert_eq!(json["autoInstall"], false);
        assert_eq!(json["dependencies"], serde_json::json!(["hr"]));
        assert!(json["pendingOperation"].is_null());
        assert!(json.get("installedAt").is_some());
    }

    #[test]
    fn test_pending_operation_display() {
        assert_eq!(PendingOperation::Install.to_string(), "install");
        assert_eq!(
            serde_json::to_string(&PendingOperation::Uninstall).unwrap(),
            r#""uninstall""#
        );
    }
}
