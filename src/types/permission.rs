use std::fmt;

use serde::{Deserialize, Serialize};

/// The relation a user holds on a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Owner,
    Viewer,
}

/// Something a user may attempt against a database or its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    CreatePost,
    EditPost,
    DeletePost,
    Tag,
    DeleteTag,
    DeleteDatabase,
    ManageViewers,
}

impl PermissionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            PermissionType::Owner => "owner",
            PermissionType::Viewer => "viewer",
        }
    }

    /// Converts a stored permission string to its variant.
    pub fn parse(s: &str) -> Option<PermissionType> {
        match s {
            "owner" => Some(PermissionType::Owner),
            "viewer" => Some(PermissionType::Viewer),
            _ => None,
        }
    }

    /// Owners may do anything in their database. Viewers are read-only.
    #[must_use]
    pub const fn allows(self, action: Action) -> bool {
        match self {
            PermissionType::Owner => true,
            PermissionType::Viewer => matches!(action, Action::Read),
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl rusqlite::types::ToSql for PermissionType {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl rusqlite::types::FromSql for PermissionType {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let s = value.as_str()?;
        PermissionType::parse(s)
            .ok_or_else(|| rusqlite::types::FromSqlError::Other(format!("unknown permission type '{s}'").into()))
    }
}
