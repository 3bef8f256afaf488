//! Answer synthesizer chain
//!
//! Turns a successful query result plus the original question into the
//! `{answer, infos}` payload. The model is asked for JSON, but what comes
//! back is classified into `SynthesisReply` rather than trusted.

use crate::conversation::Message;
use crate::llm::{LanguageModel, ModelRequest};
use crate::models::{Answers, RestaurantInfo, ANSWER_PREFIX};
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

const ANSWER_GEN_INSTRUCTION: &str = r#"당신은 SQL 쿼리 결과를 해석하여 사용자에게 친절하고 명확한 답변을 제공하는 전문가입니다.
제공되는 정보들은 성시경의 유튜브 영상 중 "먹을텐데"에 대한 정보들 입니다.

주어진 쿼리 결과를 분석하고, 사용자의 질문에 직접적으로 답변해주세요.

주어진 쿼리 정보를 누락시키지 마세요.

사용자와의 대화 내용:
{input}

답변 작성 시 다음 사항을 지켜주세요:
1. 식당 정보를 제공할 때는 이름, 주소, 지하철역을 제공 해주세요.
2. 식당의 메뉴들과 후기를 충분하게 제공 해주세요.
3. 쿼리 결과에서 restaurant_id가 같은 여러 행이 있다면, 이는 하나의 식당에 여러 메뉴가 있다는 의미입니다. 이런 경우 식당 정보는 한 번만 표시하고, 모든 메뉴를 함께 나열해주세요.
4. 정보가 부족한 경우, 찾을 수 없다는 메시지를 제공 해주세요.
5. 사용자가 이해하기 쉬운 자연스러운 한국어로 답변하세요.

출력 형식:

{
    "answer": "아주 간단한 답변 내용",
    "infos": [
        {
            "name": "식당 이름",
            "address": "식당 주소",
            "subway": "식당 지하철역",
            "lat": "식당 위도",
            "lng": "식당 경도",
            "menu": "메뉴1, 메뉴2, ...",
            "review": "식당 후기"
        }
    ]
}
"#;

/// Fallback text when the model returned nothing usable
pub const EMPTY_REPLY: &str = "응답을 생성할 수 없습니다.";

/// The shapes a synthesizer reply can take
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisReply {
    /// A well-formed `{answer, infos}` object
    Structured(Answers),
    /// An object with an `answer` key whose remaining fields did not fit;
    /// whatever restaurant entries parsed are kept
    AnswerMap(Answers),
    /// A bare string, JSON-quoted or not
    PlainText(String),
    /// Any other JSON value
    Other(Value),
}

impl SynthesisReply {
    /// Classify raw model output
    pub fn classify(raw: &str) -> Self {
        let body = strip_json_fence(raw);

        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) if map.contains_key("answer") => {
                match serde_json::from_value::<Answers>(Value::Object(map.clone())) {
                    Ok(answers) => SynthesisReply::Structured(answers),
                    Err(e) => {
                        warn!(error = %e, "Synthesizer reply has an answer but malformed infos");
                        SynthesisReply::AnswerMap(salvage(&map))
                    }
                }
            }
            Ok(Value::String(text)) => SynthesisReply::PlainText(text),
            Ok(other) => SynthesisReply::Other(other),
            Err(_) => SynthesisReply::PlainText(raw.trim().to_string()),
        }
    }

    /// Assistant message for this reply. Object replies carry their payload
    /// as result data next to an `Answer:` echo.
    pub fn into_message(self) -> Message {
        match self {
            SynthesisReply::Structured(answers) | SynthesisReply::AnswerMap(answers) => {
                let answers = answers.normalized();
                Message::assistant_with_result(
                    format!("{} {}", ANSWER_PREFIX, answers.answer),
                    answers,
                )
            }
            SynthesisReply::PlainText(text) => Message::assistant(with_answer_prefix(text)),
            SynthesisReply::Other(value) => {
                let text = if is_falsy(&value) {
                    EMPTY_REPLY.to_string()
                } else {
                    value.to_string()
                };
                Message::assistant(with_answer_prefix(text))
            }
        }
    }
}

fn with_answer_prefix(text: String) -> String {
    if text.starts_with(ANSWER_PREFIX) {
        text
    } else {
        format!("{} {}", ANSWER_PREFIX, text)
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn salvage(map: &Map<String, Value>) -> Answers {
    let answer = match map.get("answer") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let infos = map
        .get("infos")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<RestaurantInfo>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    Answers { answer, infos }
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn synthesize(&self, question: &str, query_result: &str) -> Result<SynthesisReply> {
        let context = format!("질문: {}\n\n쿼리 결과: {}", question, query_result);
        let prompt = ANSWER_GEN_INSTRUCTION.replace("{input}", &context);

        let response = self
            .model
            .generate(ModelRequest::new(vec![Message::user(prompt)]).json())
            .await?;

        Ok(SynthesisReply::classify(&response.content))
    }
}
