//! Wire contract of the remote conversational session.
//!
//! The session is a bidirectional WebSocket carrying JSON messages. Outbound:
//! one setup message, then realtime audio frames and tool-response batches.
//! Inbound: a message may carry a tool-call batch, a synthesized-audio chunk,
//! either, both, or neither; both payloads must be handled when present.

use crate::audio::AudioFrame;
use crate::config::LiveConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// MIME tag for outbound capture frames.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Fixed system instruction describing the five-stage workflow, in the
/// operator's language.
pub const SYSTEM_INSTRUCTION: &str = "\
Sen bir iş akış yöneticisisin. Aşağıdaki 5 aşamalı süreci yönetiyorsun:
1. TO_CHECK: Kontrolü Yapılacak İşler (İlk aşama)
2. CHECK_COMPLETED: Kontrolü Yapılan İşler (İkinci aşama)
3. DEPOSIT_PAID: Depozito Yatırıldı
4. GAS_OPENED: Gaz Açıldı
5. SERVICE_DIRECTED: Servis Yönlendirildi

Kullanıcı Türkçe konuşacak.
Müşteri eklerken adres veya telefon bilgisi verilirse onları da kaydet.
\"Sıra no\" veya \"Numara\" denirse ilgili kartın numarasını söyleyebilirsin.
Profesyonel ve yardımsever ol.";

/// Declarations for the three remote-invokable operations.
#[must_use]
pub fn function_declarations() -> Value {
    json!([
        {
            "name": "addTask",
            "description": "Yeni bir iş veya müşteri ekle.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "title": {
                        "type": "STRING",
                        "description": "İşin veya müşterinin adı (Örn: Daire 5, Ahmet Bey)"
                    },
                    "column": {
                        "type": "STRING",
                        "description": "Durum kolonu: TO_CHECK, CHECK_COMPLETED, DEPOSIT_PAID, GAS_OPENED, SERVICE_DIRECTED"
                    },
                    "assignee": { "type": "STRING", "description": "İşin atandığı kişi" },
                    "phone": { "type": "STRING", "description": "Müşteri telefon numarası" },
                    "address": { "type": "STRING", "description": "Müşteri adresi veya daire bilgisi" }
                },
                "required": ["title"]
            }
        },
        {
            "name": "moveTask",
            "description": "Bir işi başka bir aşamaya taşı.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "searchTitle": { "type": "STRING", "description": "Taşınacak işin adı" },
                    "targetColumn": {
                        "type": "STRING",
                        "description": "Hedef kolon: TO_CHECK, CHECK_COMPLETED, DEPOSIT_PAID, GAS_OPENED, SERVICE_DIRECTED"
                    }
                },
                "required": ["searchTitle", "targetColumn"]
            }
        },
        {
            "name": "getBoardStatus",
            "description": "Tüm işlerin durumunu özetle.",
            "parameters": { "type": "OBJECT", "properties": {} }
        }
    ])
}

/// Session setup message: model, tool declarations, audio-only response
/// modality, system instruction, and the fixed voice selection.
#[must_use]
pub fn setup_message(config: &LiveConfig) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", config.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_INSTRUCTION }]
            },
            "tools": [{ "functionDeclarations": function_declarations() }]
        }
    })
}

/// Outbound message carrying one captured audio frame.
#[must_use]
pub fn realtime_input(frame: &AudioFrame) -> Value {
    json!({
        "realtimeInput": {
            "mediaChunks": [{
                "mimeType": INPUT_MIME_TYPE,
                "data": frame.payload
            }]
        }
    })
}

/// Outbound message answering a tool-call batch. One message per inbound
/// batch, responses in received order.
#[must_use]
pub fn tool_response(responses: &[FunctionResponse]) -> Value {
    json!({
        "toolResponse": {
            "functionResponses": responses
        }
    })
}

/// A structured function-invocation request from the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Call identifier, echoed back in the response.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Named-argument bundle.
    #[serde(default)]
    pub args: Value,
}

/// The correlated result for one [`FunctionCall`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Structured outcome payload, wrapped as `{"result": ...}`.
    pub response: Value,
}

impl FunctionResponse {
    #[must_use]
    pub fn new(call: &FunctionCall, result: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "result": result }),
        }
    }
}

/// One inbound server message. Tool-call and audio payloads are independent
/// and non-exclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    /// First inline audio payload of the model turn, if any.
    #[must_use]
    pub fn audio_payload(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.as_str())
    }
}

/// Batch of function calls carried by one inbound message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Base64 synthesized-audio chunk (24kHz PCM).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn setup_message_carries_tools_and_voice() {
        let config = LiveConfig::default();
        let msg = setup_message(&config);
        let tools = &msg["setup"]["tools"][0]["functionDeclarations"];
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["addTask", "moveTask", "getBoardStatus"]);
        assert_eq!(
            msg["setup"]["generationConfig"]["responseModalities"],
            json!(["AUDIO"])
        );
        assert_eq!(
            msg["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Fenrir"
        );
    }

    #[test]
    fn realtime_input_wraps_frame() {
        let frame = AudioFrame {
            payload: "AAAA".to_owned(),
        };
        let msg = realtime_input(&frame);
        let chunk = &msg["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], INPUT_MIME_TYPE);
        assert_eq!(chunk["data"], "AAAA");
    }

    #[test]
    fn inbound_message_may_carry_both_payloads() {
        let raw = json!({
            "toolCall": {
                "functionCalls": [
                    { "id": "call-1", "name": "getBoardStatus", "args": {} }
                ]
            },
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "text": "ok" },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAECAw==" } }
                    ]
                }
            }
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let calls = &msg.tool_call.as_ref().unwrap().function_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "getBoardStatus");
        assert_eq!(msg.audio_payload(), Some("AAECAw=="));
    }

    #[test]
    fn inbound_message_may_carry_neither() {
        let msg: ServerMessage = serde_json::from_value(json!({ "setupComplete": {} })).unwrap();
        assert!(msg.tool_call.is_none());
        assert!(msg.audio_payload().is_none());
        assert!(msg.setup_complete.is_some());
    }

    #[test]
    fn tool_response_echoes_ids_in_order() {
        let calls = [
            FunctionCall {
                id: Some("a".into()),
                name: "addTask".into(),
                args: json!({}),
            },
            FunctionCall {
                id: Some("b".into()),
                name: "moveTask".into(),
                args: json!({}),
            },
        ];
        let responses: Vec<FunctionResponse> = calls
            .iter()
            .map(|c| FunctionResponse::new(c, json!({ "status": "success" })))
            .collect();
        let msg = tool_response(&responses);
        let out = msg["toolResponse"]["functionResponses"].as_array().unwrap();
        assert_eq!(out[0]["id"], "a");
        assert_eq!(out[1]["id"], "b");
        assert_eq!(out[0]["response"]["result"]["status"], "success");
    }
}
