//! AI chat proxy backed by Yandex GPT.
//!
//! Stateless request/response mapping: the client sends the message plus its
//! own rolling history, we wrap it with a style-dependent system prompt and
//! forward to the completion endpoint. Failure paths always carry a
//! human-facing `response` string next to the machine `error` so the chat UI
//! can render something instead of a blank bubble.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::InnerState;

const COMPLETION_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
const HISTORY_WINDOW: usize = 10;
const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    result: CompletionResult,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: Option<ChatMessage>,
}

fn style_prompt(style: &str) -> &'static str {
    match style {
        "business" => "Отвечай деловым тоном, кратко и по существу.",
        "ironic" => "Отвечай с лёгкой иронией и юмором.",
        "casual" => "Отвечай непринуждённо, как в обычной переписке.",
        _ => "Отвечай дружелюбно, используй эмодзи, будь позитивным.",
    }
}

fn system_prompt(style: &str) -> String {
    format!(
        "Ты - цифровой двойник пользователя в приложении GoShorts. \n{}\n\
         Помогай пользователю с задачами, отвечай на вопросы, веди диалог естественно.\n\
         Будь полезным и внимательным ассистентом.",
        style_prompt(style)
    )
}

/// Builds the upstream message list: system prompt, the last ten history
/// entries with roles normalized to user/assistant, then the new message.
fn build_messages(style: &str, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        text: system_prompt(style),
    }];

    let tail = history.len().saturating_sub(HISTORY_WINDOW);
    for msg in &history[tail..] {
        messages.push(ChatMessage {
            role: if msg.role == "user" {
                "user".to_string()
            } else {
                "assistant".to_string()
            },
            text: msg.text.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user".to_string(),
        text: message.to_string(),
    });

    messages
}

#[tracing::instrument(name = "AI chat", skip(inner, request))]
pub async fn chat(
    State(inner): State<InnerState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<Value>) {
    let InnerState { http, .. } = inner;

    let api_key = match std::env::var("YANDEX_GPT_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            tracing::warn!("YANDEX_GPT_API_KEY is not configured");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "API key not configured",
                    "response": "Привет! Я пока не настроен. Добавь API ключ Yandex GPT в настройках проекта.",
                })),
            );
        }
    };

    let folder_id =
        std::env::var("YANDEX_FOLDER_ID").unwrap_or_else(|_| "b1gvvvvvvvvvvvvvvvvv".to_string());

    let style = request.style.as_deref().unwrap_or("friendly");
    let payload = CompletionRequest {
        model_uri: format!("gpt://{}/yandexgpt-lite", folder_id),
        completion_options: CompletionOptions {
            stream: false,
            temperature: 0.7,
            max_tokens: 500,
        },
        messages: build_messages(style, &request.history, &request.message),
    };

    let response = http
        .post(COMPLETION_URL)
        .header("Authorization", format!("Api-Key {}", api_key))
        .timeout(CHAT_TIMEOUT)
        .json(&payload)
        .send()
        .await;

    let response = match response {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(error = %err, "Yandex GPT request failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": err.to_string(),
                    "response": "Произошла ошибка. Проверь подключение к интернету.",
                })),
            );
        }
    };

    if !response.status().is_success() {
        tracing::error!(status = %response.status(), "Yandex GPT API error");
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "Yandex GPT API error",
                "response": "Извини, не могу ответить прямо сейчас. Попробуй позже!",
            })),
        );
    }

    let completion: CompletionResponse = match response.json().await {
        Ok(completion) => completion,
        Err(err) => {
            tracing::error!(error = %err, "Failed to parse Yandex GPT response");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to parse response",
                    "response": "Извини, не могу ответить прямо сейчас. Попробуй позже!",
                })),
            );
        }
    };

    let ai_response = completion
        .result
        .alternatives
        .into_iter()
        .next()
        .and_then(|alt| alt.message)
        .map(|msg| msg.text)
        .unwrap_or_else(|| "Не удалось получить ответ.".to_string());

    (StatusCode::OK, Json(json!({ "response": ai_response })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_entry(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn unknown_style_falls_back_to_friendly() {
        assert_eq!(style_prompt("unknown"), style_prompt("friendly"));
        assert_ne!(style_prompt("business"), style_prompt("friendly"));
    }

    #[test]
    fn messages_wrap_history_with_system_and_user() {
        let history = vec![history_entry("user", "hi"), history_entry("bot", "hello")];
        let messages = build_messages("friendly", &history, "how are you?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
        assert_eq!(messages[3].text, "how are you?");
    }

    #[test]
    fn history_is_truncated_to_last_ten() {
        let history: Vec<ChatMessage> = (0..25)
            .map(|i| history_entry("user", &format!("msg {i}")))
            .collect();
        let messages = build_messages("casual", &history, "latest");

        // system + 10 history + new message
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].text, "msg 15");
        assert_eq!(messages[10].text, "msg 24");
    }
}
