//! Validation shared by the create and edit post flows, and by comments.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use crate::core::db::{EntityStore, PostFields};
use crate::core::errors::StoreResult;
use crate::core::helpers::sanitize_text;
use crate::models::ImageUpload;

pub const IMAGE_EXTENSIONS: &[&str] = &["gif", "png", "jpg", "jpeg", "webp", "bmp"];

const REQUIRED: &str = "This field is required.";

pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub enum FormResult<T> {
    Valid(T),
    Invalid(FieldErrors),
}

impl<T> FormResult<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, FormResult::Valid(_))
    }
}

/// Raw post form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostSubmission {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub group: Option<Value>,
    #[serde(default)]
    pub image: Option<ImageUpload>,
}

impl PostSubmission {
    pub fn from_form(params: &HashMap<String, String>) -> Self {
        Self {
            text: params.get("text").cloned(),
            group: params.get("group").map(|g| Value::String(g.clone())),
            image: None,
        }
    }

    /// Current values of a post, for pre-filling the edit form.
    pub fn from_fields(text: &str, group_id: Option<u64>) -> Self {
        Self {
            text: Some(text.to_string()),
            group: group_id.map(Value::from),
            image: None,
        }
    }

    /// Selected group id, if the field parses as one.
    pub fn group_id(&self) -> Option<u64> {
        match &self.group {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentSubmission {
    #[serde(default)]
    pub text: Option<String>,
}

impl CommentSubmission {
    pub fn from_form(params: &HashMap<String, String>) -> Self {
        Self {
            text: params.get("text").cloned(),
        }
    }
}

fn add_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

fn required_text(raw: Option<&str>, field: &str, errors: &mut FieldErrors) -> String {
    let text = sanitize_text(raw.unwrap_or_default());
    if text.trim().is_empty() {
        add_error(errors, field, REQUIRED);
    }
    text
}

pub fn is_image_name(name: &str) -> bool {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let known = ext.as_deref().is_some_and(|e| IMAGE_EXTENSIONS.contains(&e));
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    known && mime.type_() == mime_guess::mime::IMAGE
}

pub struct PostForm;

impl PostForm {
    pub fn validate(submission: PostSubmission, store: &EntityStore) -> StoreResult<FormResult<PostFields>> {
        let mut errors = FieldErrors::new();

        let text = required_text(submission.text.as_deref(), "text", &mut errors);

        let group_id = match &submission.group {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(_) => match submission.group_id() {
                Some(id) if store.get_group(id)?.is_some() => Some(id),
                _ => {
                    add_error(
                        &mut errors,
                        "group",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            },
        };

        if let Some(upload) = &submission.image {
            if upload.data.is_empty() {
                add_error(&mut errors, "image", "The submitted file is empty.");
            } else if !is_image_name(&upload.name) {
                add_error(
                    &mut errors,
                    "image",
                    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                );
            }
        }

        if !errors.is_empty() {
            return Ok(FormResult::Invalid(errors));
        }

        Ok(FormResult::Valid(PostFields {
            text,
            group_id,
            image: submission.image,
        }))
    }
}

pub struct CommentForm;

impl CommentForm {
    pub fn validate(submission: CommentSubmission) -> FormResult<String> {
        let mut errors = FieldErrors::new();
        let text = required_text(submission.text.as_deref(), "text", &mut errors);
        if errors.is_empty() {
            FormResult::Valid(text)
        } else {
            FormResult::Invalid(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kv::MemoryKv;
    use std::sync::Arc;

    fn store_with_group() -> (EntityStore, u64) {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        let group = store.create_group("Cats", "cats", "").unwrap();
        (store, group.id)
    }

    #[test]
    fn text_is_required() {
        let (store, _) = store_with_group();
        let result = PostForm::validate(
            PostSubmission { text: Some("   ".into()), ..Default::default() },
            &store,
        )
        .unwrap();
        match result {
            FormResult::Invalid(errors) => assert!(errors.contains_key("text")),
            FormResult::Valid(_) => panic!("blank text accepted"),
        }
    }

    #[test]
    fn group_accepts_number_string_or_blank() {
        let (store, group_id) = store_with_group();
        for group in [Value::from(group_id), Value::String(group_id.to_string())] {
            let result = PostForm::validate(
                PostSubmission { text: Some("hi".into()), group: Some(group), image: None },
                &store,
            )
            .unwrap();
            assert_eq!(
                result,
                FormResult::Valid(PostFields { text: "hi".into(), group_id: Some(group_id), image: None })
            );
        }

        let blank = PostForm::validate(
            PostSubmission { text: Some("hi".into()), group: Some(Value::String(String::new())), image: None },
            &store,
        )
        .unwrap();
        assert!(blank.is_valid());
    }

    #[test]
    fn unknown_group_is_rejected() {
        let (store, _) = store_with_group();
        let result = PostForm::validate(
            PostSubmission { text: Some("hi".into()), group: Some(Value::from(999)), image: None },
            &store,
        )
        .unwrap();
        assert!(matches!(result, FormResult::Invalid(e) if e.contains_key("group")));
    }

    #[test]
    fn image_must_look_like_an_image() {
        let (store, _) = store_with_group();
        let with_image = |name: &str| PostSubmission {
            text: Some("pic".into()),
            group: None,
            image: Some(ImageUpload { name: name.into(), data: vec![0x47, 0x49, 0x46] }),
        };

        assert!(PostForm::validate(with_image("small.gif"), &store).unwrap().is_valid());
        assert!(!PostForm::validate(with_image("notes.txt"), &store).unwrap().is_valid());
        assert!(!PostForm::validate(with_image("noext"), &store).unwrap().is_valid());
    }

    #[test]
    fn comment_text_is_sanitized_and_required() {
        assert_eq!(
            CommentForm::validate(CommentSubmission { text: Some("<i>nice</i>".into()) }),
            FormResult::Valid("nice".to_string())
        );
        assert!(!CommentForm::validate(CommentSubmission { text: None }).is_valid());
    }

    #[test]
    fn urlencoded_form_maps_fields() {
        let mut params = HashMap::new();
        params.insert("text".to_string(), "hello".to_string());
        params.insert("group".to_string(), "3".to_string());
        let submission = PostSubmission::from_form(&params);
        assert_eq!(submission.text.as_deref(), Some("hello"));
        assert_eq!(submission.group_id(), Some(3));
    }
}
