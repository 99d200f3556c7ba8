use serde_json::Value;

use crate::schema::ResourceContents;

/// The first content part of a `resources/read` result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceContent {
    Text {
        uri: String,
        mime_type: Option<String>,
        text: String,
    },
    /// Base64-encoded binary content, passed through undecoded.
    Blob {
        uri: String,
        mime_type: Option<String>,
        blob: String,
    },
}

impl ResourceContent {
    pub fn uri(&self) -> &str {
        match self {
            ResourceContent::Text { uri, .. } | ResourceContent::Blob { uri, .. } => uri,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            ResourceContent::Text { mime_type, .. } | ResourceContent::Blob { mime_type, .. } => {
                mime_type.as_deref()
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ResourceContent::Text { text, .. } => Some(text),
            ResourceContent::Blob { .. } => None,
        }
    }

    /// Parse text content as JSON. `None` for blobs and for text that is not
    /// valid JSON.
    pub fn json(&self) -> Option<Value> {
        self.text().and_then(|text| serde_json::from_str(text).ok())
    }
}

impl From<ResourceContents> for ResourceContent {
    fn from(contents: ResourceContents) -> Self {
        match contents {
            ResourceContents::Text(t) => ResourceContent::Text {
                uri: t.uri,
                mime_type: t.mime_type,
                text: t.text,
            },
            ResourceContents::Blob(b) => ResourceContent::Blob {
                uri: b.uri,
                mime_type: b.mime_type,
                blob: b.blob,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_content_decodes_json() {
        let content = ResourceContent::from(ResourceContents::text(
            "freelance://market-trends",
            r#"{"trending_skills": ["Rust"]}"#,
        ));
        assert_eq!(content.uri(), "freelance://market-trends");
        assert_eq!(content.json(), Some(json!({"trending_skills": ["Rust"]})));
    }

    #[test]
    fn test_blob_has_no_text() {
        let content = ResourceContent::Blob {
            uri: "freelance://logo".into(),
            mime_type: Some("image/png".into()),
            blob: "iVBORw0KGgo=".into(),
        };
        assert_eq!(content.text(), None);
        assert_eq!(content.json(), None);
        assert_eq!(content.mime_type(), Some("image/png"));
    }
}
