use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 255;

/// A registered 3D model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub file_size: u64,
    #[serde(default)]
    pub vertices: Option<u64>,
    #[serde(default)]
    pub triangles: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A registered image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub file_path: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Insert payload for a model. Identity and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewModel {
    pub name: String,
    pub file_path: String,
    pub file_size: u64,
    #[serde(default)]
    pub vertices: Option<u64>,
    #[serde(default)]
    pub triangles: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    pub name: String,
    pub file_path: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Common accessors the stores need for ordering.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn uploaded_at(&self) -> DateTime<Utc>;
}

impl Record for ModelRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

impl Record for ImageRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn check_name(errors: &mut Vec<FieldError>, name: &str) {
    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

fn check_path(errors: &mut Vec<FieldError>, path: &str) {
    if path.trim().is_empty() {
        errors.push(FieldError::new("filePath", "must not be empty"));
    }
}

impl NewModel {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_name(&mut errors, &self.name);
        check_path(&mut errors, &self.file_path);
        errors
    }

    pub fn into_record(self, id: String, uploaded_at: DateTime<Utc>) -> ModelRecord {
        ModelRecord {
            id,
            name: self.name,
            file_path: self.file_path,
            file_size: self.file_size,
            vertices: self.vertices,
            triangles: self.triangles,
            description: self.description,
            uploaded_at,
        }
    }
}

impl NewImage {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_name(&mut errors, &self.name);
        check_path(&mut errors, &self.file_path);
        if matches!(self.category.as_deref(), Some(c) if c.trim().is_empty()) {
            errors.push(FieldError::new("category", "must not be blank when present"));
        }
        errors
    }

    pub fn into_record(self, id: String, uploaded_at: DateTime<Utc>) -> ImageRecord {
        ImageRecord {
            id,
            name: self.name,
            file_path: self.file_path,
            category: self.category,
            description: self.description,
            uploaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_json_uses_camel_case() {
        let json = serde_json::json!({
            "name": "Robot",
            "filePath": "/api/files/abc",
            "fileSize": 2048,
            "vertices": 300,
        });
        let model: NewModel = serde_json::from_value(json).unwrap();
        assert_eq!(model.file_path, "/api/files/abc");
        assert_eq!(model.vertices, Some(300));
        assert_eq!(model.triangles, None);

        let record = model.into_record("id-1".to_string(), Utc::now());
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["fileSize"], 2048);
        assert!(out["uploadedAt"].is_string());
        assert!(out["triangles"].is_null());
    }

    #[test]
    fn negative_sizes_do_not_deserialize() {
        let json = serde_json::json!({
            "name": "Robot",
            "filePath": "/api/files/abc",
            "fileSize": -1,
        });
        assert!(serde_json::from_value::<NewModel>(json).is_err());
    }

    #[test]
    fn validation_reports_each_bad_field() {
        let model = NewModel {
            name: "  ".to_string(),
            file_path: String::new(),
            file_size: 0,
            vertices: None,
            triangles: None,
            description: None,
        };
        let fields: Vec<String> = model.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "filePath"]);

        let image = NewImage {
            name: "x".repeat(MAX_NAME_LEN + 1),
            file_path: "/objects/uploads/1".to_string(),
            category: Some(" ".to_string()),
            description: None,
        };
        let fields: Vec<String> = image.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "category"]);
    }
}
