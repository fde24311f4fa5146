//! Provider-neutral chat messages.
//!
//! Invokers build [`ModelMessage`]s; the provider adapter in
//! [`crate::provider`] turns them into `edgequake_llm::ChatMessage`s. Keeping
//! our own type at this seam lets tests assert exactly what would be sent
//! without a network round trip.

use crate::pipeline::normalize::EncodedImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { image: EncodedImage },
}

/// A role-tagged, ordered list of content blocks. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    role: Role,
    blocks: Vec<ContentBlock>,
}

impl ModelMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            blocks: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// A user turn carrying an instruction followed by an image.
    pub fn user_with_image(text: impl Into<String>, image: EncodedImage) -> Self {
        Self {
            role: Role::User,
            blocks: vec![
                ContentBlock::Text { text: text.into() },
                ContentBlock::Image { image },
            ],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// All text blocks joined with blank lines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &EncodedImage> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::Image { image } => Some(image),
            ContentBlock::Text { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_image() -> EncodedImage {
        EncodedImage {
            data: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
            width: 1,
            height: 1,
            original_width: 1,
            original_height: 1,
        }
    }

    #[test]
    fn user_with_image_keeps_block_order() {
        let msg = ModelMessage::user_with_image("read this", tiny_image());
        assert_eq!(msg.role(), Role::User);
        assert!(matches!(msg.blocks()[0], ContentBlock::Text { .. }));
        assert!(matches!(msg.blocks()[1], ContentBlock::Image { .. }));
        assert_eq!(msg.text(), "read this");
        assert_eq!(msg.images().count(), 1);
    }

    #[test]
    fn system_message_has_no_images() {
        let msg = ModelMessage::system("rubric");
        assert_eq!(msg.role(), Role::System);
        assert_eq!(msg.images().count(), 0);
    }

    #[test]
    fn serialises_with_type_tags() {
        let json = serde_json::to_value(ModelMessage::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["blocks"][0]["type"], "text");
    }
}
