//! The contract between the engine and the messaging webhook layer.
//!
//! The webhook layer delivers an already-parsed [`InboundMessage`] and gets
//! back at most one human-readable response string. Engine failures never
//! cross this boundary; they are converted into apologetic response text
//! here.

use serde::{Deserialize, Serialize};

use crate::classifier::Engine;
use crate::pending::PendingLabels;

/// Message content as extracted by the webhook collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundContent {
    Image {
        #[serde(rename = "imageUrl")]
        url: String,
    },
    Text {
        #[serde(rename = "text")]
        body: String,
    },
}

/// One inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    #[serde(flatten)]
    pub content: InboundContent,
}

/// Recognizes the training command: first whitespace-delimited token,
/// case-insensitive, equal to `train`; the second token is the label,
/// lowercased. Anything else is not a command.
pub fn parse_train_command(text: &str) -> Option<String> {
    let mut tokens = text.split_whitespace();
    let command = tokens.next()?;
    if !command.eq_ignore_ascii_case("train") {
        return None;
    }
    let label = tokens.next()?;
    Some(label.to_lowercase())
}

/// Handles one inbound message and produces the response text to deliver
/// back over the channel, or `None` when the message warrants no reply
/// (unrecognized text).
pub async fn respond(
    engine: &Engine,
    pending: &PendingLabels,
    message: &InboundMessage,
) -> Option<String> {
    match &message.content {
        InboundContent::Image { url } => {
            let reply = if let Some(label) = pending.take_if_pending(&message.sender) {
                match engine.ingest_and_retrain(url, &label).await {
                    Ok(_) => format!(
                        "I have trained myself to recognize the image you sent me as a {label}. Your teaching is appreciated"
                    ),
                    Err(err) => {
                        log::error!("training on image from {} failed: {err}", message.sender);
                        "something went wrong when trying to train on image".to_string()
                    }
                }
            } else {
                match engine.classify(url).await {
                    Ok(result) => format!(
                        "I'm about {:.1}% sure that the image you sent me is a {}",
                        result.confidence, result.label
                    ),
                    Err(err) => {
                        log::error!("classifying image from {} failed: {err}", message.sender);
                        "Something went wrong when trying to classify image".to_string()
                    }
                }
            };
            Some(reply)
        }
        InboundContent::Text { body } => {
            let label = parse_train_command(body)?;
            pending.declare(&message.sender, &label);
            Some(format!(
                "Send me an image and I will learn to recognize it as a {label}"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_command_is_case_insensitive() {
        assert_eq!(parse_train_command("train husky").as_deref(), Some("husky"));
        assert_eq!(parse_train_command("TRAIN husky").as_deref(), Some("husky"));
        assert_eq!(parse_train_command("TrAiN Husky").as_deref(), Some("husky"));
    }

    #[test]
    fn label_is_lowercased() {
        assert_eq!(
            parse_train_command("train POODLE").as_deref(),
            Some("poodle")
        );
    }

    #[test]
    fn extra_tokens_after_the_label_are_ignored() {
        assert_eq!(
            parse_train_command("train husky please").as_deref(),
            Some("husky")
        );
    }

    #[test]
    fn non_commands_are_rejected() {
        assert_eq!(parse_train_command("hello there"), None);
        assert_eq!(parse_train_command("train"), None);
        assert_eq!(parse_train_command(""), None);
        assert_eq!(parse_train_command("training husky"), None);
    }

    #[test]
    fn inbound_message_matches_the_webhook_shape() {
        let message: InboundMessage = serde_json::from_str(
            r#"{"sender":"15551234567","kind":"image","imageUrl":"https://cdn.example/dog.jpg"}"#,
        )
        .unwrap();
        assert_eq!(message.sender, "15551234567");
        assert_eq!(
            message.content,
            InboundContent::Image {
                url: "https://cdn.example/dog.jpg".to_string()
            }
        );

        let message: InboundMessage =
            serde_json::from_str(r#"{"sender":"A","kind":"text","text":"train husky"}"#).unwrap();
        assert_eq!(
            message.content,
            InboundContent::Text {
                body: "train husky".to_string()
            }
        );
    }
}
