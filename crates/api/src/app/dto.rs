use std::str::FromStr;

use serde::{Deserialize, Serialize};

use goods_core::{Good, GoodChanges, GoodId, NewGood, Pagination, Priority, PriorityItem, ProjectId};

use crate::app::errors::ApiError;

// -------------------------
// Query parameters
// -------------------------

/// `?id=..&projectId=..`
///
/// Kept as raw strings so malformed values produce our error body rather
/// than the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdParams {
    pub id: Option<String>,
    pub project_id: Option<String>,
}

impl IdParams {
    pub fn parse(&self) -> Result<(GoodId, ProjectId), ApiError> {
        let id = parse_positive(self.id.as_deref(), "Invalid good ID")?;
        let project_id = parse_positive(self.project_id.as_deref(), "Invalid project ID")?;
        Ok((id, project_id))
    }
}

/// `?projectId=..`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    pub project_id: Option<String>,
}

impl ProjectParams {
    pub fn parse(&self) -> Result<ProjectId, ApiError> {
        parse_positive(self.project_id.as_deref(), "Invalid project ID")
    }
}

/// `?limit=..&offset=..`; unparsable values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListParams {
    pub fn pagination(&self) -> Pagination {
        let parse = |raw: &Option<String>| raw.as_deref().and_then(|v| v.trim().parse::<i64>().ok());
        Pagination::new(parse(&self.limit), parse(&self.offset))
    }
}

fn parse_positive<T: FromStr>(raw: Option<&str>, message: &'static str) -> Result<T, ApiError> {
    raw.ok_or_else(|| ApiError::invalid(message))?
        .parse::<T>()
        .map_err(|_| ApiError::invalid(message))
}

// -------------------------
// Request bodies
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateGoodRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CreateGoodRequest {
    pub fn into_new_good(self, project_id: ProjectId) -> Result<NewGood, ApiError> {
        Ok(NewGood::new(project_id, self.name, self.description)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoodRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl UpdateGoodRequest {
    pub fn into_changes(self) -> Result<GoodChanges, ApiError> {
        Ok(GoodChanges::new(self.name, self.description)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprioritizeRequest {
    pub new_priority: i64,
}

impl ReprioritizeRequest {
    pub fn priority(&self) -> Result<Priority, ApiError> {
        if self.new_priority < 1 {
            return Err(ApiError::invalid("Priority must be greater than 0"));
        }
        Priority::requested(self.new_priority).map_err(|_| {
            ApiError::invalid(format!(
                "Priority must not exceed {}",
                Priority::MAX_REQUESTED
            ))
        })
    }
}

// -------------------------
// Response bodies
// -------------------------

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub total: u64,
    pub removed: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub meta: ListMeta,
    pub goods: Vec<Good>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveResponse {
    pub id: GoodId,
    pub project_id: ProjectId,
    pub removed: bool,
}

impl From<&Good> for RemoveResponse {
    fn from(good: &Good) -> Self {
        Self {
            id: good.id,
            project_id: good.project_id,
            removed: good.removed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrioritiesResponse {
    pub priorities: Vec<PriorityItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_params_require_positive_integers() {
        let ok = IdParams {
            id: Some("7".into()),
            project_id: Some("2".into()),
        };
        assert_eq!(
            ok.parse().unwrap(),
            (GoodId::from_raw(7), ProjectId::from_raw(2))
        );

        for (id, project_id) in [(None, Some("1")), (Some("0"), Some("1")), (Some("1"), Some("x"))] {
            let params = IdParams {
                id: id.map(str::to_string),
                project_id: project_id.map(str::to_string),
            };
            assert_eq!(params.parse().unwrap_err().code(), 4);
        }
    }

    #[test]
    fn list_params_fall_back_to_defaults() {
        let params = ListParams {
            limit: Some("abc".into()),
            offset: Some("-3".into()),
        };
        assert_eq!(params.pagination(), Pagination::default());

        let params = ListParams {
            limit: Some("250".into()),
            offset: Some("5".into()),
        };
        assert_eq!(params.pagination(), Pagination::new(Some(100), Some(5)));
    }

    #[test]
    fn new_priority_is_positive_and_bounded() {
        assert_eq!(
            ReprioritizeRequest { new_priority: 3 }.priority().unwrap(),
            Priority::from_raw(3)
        );
        for value in [0, -1, i64::MAX, Priority::MAX_REQUESTED + 1] {
            let err = ReprioritizeRequest { new_priority: value }.priority().unwrap_err();
            assert_eq!(err.code(), 4);
        }
    }

    #[test]
    fn remove_response_uses_camel_case() {
        let body = serde_json::to_value(RemoveResponse {
            id: GoodId::from_raw(1),
            project_id: ProjectId::from_raw(2),
            removed: true,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "id": 1, "projectId": 2, "removed": true }));
    }
}
