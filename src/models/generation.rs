use axum::body::Bytes;
use axum::extract::Multipart;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const IMAGE_FILE_FIELD: &str = "image_file";
pub const PROMPT_FIELD: &str = "prompt_text";
pub const NEGATIVE_PROMPT_FIELD: &str = "negative_prompt_text";
pub const CHECKPOINT_FIELD: &str = "ckpt_name";
pub const NUM_IMAGES_FIELD: &str = "num_images";
pub const SEED_FIELD: &str = "seed";
pub const WORKFLOW_FIELD: &str = "workflow";

/// One multipart field, kept byte-for-byte.
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// An inbound generation submission, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub fields: Vec<FormField>,
}

impl GenerationRequest {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut fields = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                tracing::debug!("Skipping unnamed multipart field");
                continue;
            };
            let file_name = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let data = field.bytes().await?;

            fields.push(FormField {
                name,
                file_name,
                content_type,
                data,
            });
        }

        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Text value of a non-file field, if it is valid UTF-8.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name)
            .filter(|f| f.file_name.is_none())
            .and_then(|f| std::str::from_utf8(&f.data).ok())
    }

    pub fn image_bytes(&self) -> usize {
        self.field(IMAGE_FILE_FIELD).map_or(0, |f| f.data.len())
    }

    /// Re-serialise every field into an outbound multipart form.
    pub fn into_form(self) -> Result<Form, AppError> {
        let mut form = Form::new();

        for field in self.fields {
            let mut part = Part::bytes(field.data.to_vec());
            if let Some(file_name) = field.file_name {
                part = part.file_name(file_name);
            }
            if let Some(content_type) = field.content_type {
                part = part.mime_str(&content_type)?;
            }
            form = form.part(field.name, part);
        }

        Ok(form)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BackendErrorBody {
    pub error: Option<String>,
}

/// Identity echo appended to a successful generation response.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub email: Option<String>,
    pub quota_remaining: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_field(name: &str, value: &str) -> FormField {
        FormField {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: Bytes::from(value.to_owned()),
        }
    }

    #[test]
    fn test_text_ignores_file_fields() {
        let request = GenerationRequest {
            fields: vec![
                text_field(PROMPT_FIELD, "a bright living room"),
                FormField {
                    name: IMAGE_FILE_FIELD.into(),
                    file_name: Some("room.png".into()),
                    content_type: Some("image/png".into()),
                    data: Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]),
                },
            ],
        };

        assert_eq!(request.text(PROMPT_FIELD), Some("a bright living room"));
        assert_eq!(request.text(IMAGE_FILE_FIELD), None);
        assert_eq!(request.text(SEED_FIELD), None);
        assert_eq!(request.image_bytes(), 4);
    }

    #[test]
    fn test_into_form_rejects_bad_content_type() {
        let request = GenerationRequest {
            fields: vec![FormField {
                name: IMAGE_FILE_FIELD.into(),
                file_name: Some("room.png".into()),
                content_type: Some("not a mime".into()),
                data: Bytes::new(),
            }],
        };

        assert!(request.into_form().is_err());
    }
}
