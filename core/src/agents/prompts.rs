//! Prompt registry: one [`TaskKind`] per supported task, each knowing how to
//! phrase its system instruction, build the user message from request
//! parameters, and read the model's JSON answer back into a typed result.
//!
//! Parsing is total. Whatever JSON the model produced, the task's documented
//! default shape comes back instead of an error.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

const SEGMENT_PROMPT: &str = "You are a precise sentence segmenter. Split the {language} text supplied by the user into individual sentences. \
Keep every sentence exactly as written: do not translate, correct, merge or drop anything. \
Abbreviations (e.g. \"Mr.\", \"U.S.\"), decimal numbers (e.g. \"3.14\") and quoted speech must stay inside the sentence they belong to. \
Respond with a JSON object of the form {\"segments\": [\"sentence 1\", \"sentence 2\"]}.";

const SEGMENT_ALIGN_PROMPT: &str = "You align parallel English and Chinese texts. Split both texts into sentences and pair each English sentence with its Chinese counterpart. \
One sentence in one language may correspond to several sentences in the other; in that case join them into a single side of the pair. \
Keep the original wording of both languages verbatim. \
Respond with a JSON object of the form {\"pairs\": [{\"en\": \"English sentence\", \"zh\": \"中文句子\"}]}.";

const TRANSLATE_PROMPT: &str = "You are a professional translator. Translate the user's text from {from} to {to}. \
Preserve the meaning, tone and register of the original; do not add explanations or notes. \
Respond with a JSON object of the form {\"translation\": \"...\"}.";

const SCORE_PROMPT: &str = "You are a strict but encouraging translation teacher. Compare the learner's translation with the reference translation of the original sentence. \
Give a score from 0 to 100 reflecting accuracy, fluency and faithfulness, short feedback on the main issues, and concrete suggestions for improvement. \
Respond with a JSON object of the form {\"score\": 85, \"feedback\": \"...\", \"suggestions\": [\"...\"]}.";

const GREETING_PROMPT: &str = "You write short, warm greetings for a language-learning app. Produce {count} different greetings for the user. \
Each greeting is a single sentence written entirely in ONE language, either English or Chinese; never mix languages inside one greeting. \
Make them personal when a name is known, fit the time of day, and motivate the user to keep practising. \
Respond with a JSON object of the form {\"greetings\": [\"...\"]}.";

const DEFAULT_GREETING_COUNT: u64 = 3;

/// Why a prompt could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),
}

/// Supported task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Segment,
    SegmentAlign,
    Translate,
    Score,
    Greeting,
    Custom,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Segment,
        TaskKind::SegmentAlign,
        TaskKind::Translate,
        TaskKind::Score,
        TaskKind::Greeting,
        TaskKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Segment => "segment",
            TaskKind::SegmentAlign => "segment-align",
            TaskKind::Translate => "translate",
            TaskKind::Score => "score",
            TaskKind::Greeting => "greeting",
            TaskKind::Custom => "custom",
        }
    }

    pub fn system_prompt(&self, params: &Value) -> Result<String, PromptError> {
        let prompt = match self {
            TaskKind::Segment => {
                let language = opt_str(params, "language").unwrap_or("English");
                SEGMENT_PROMPT.replace("{language}", language)
            }
            TaskKind::SegmentAlign => SEGMENT_ALIGN_PROMPT.to_string(),
            TaskKind::Translate => TRANSLATE_PROMPT
                .replace("{from}", opt_str(params, "from").unwrap_or("English"))
                .replace("{to}", opt_str(params, "to").unwrap_or("Chinese")),
            TaskKind::Score => SCORE_PROMPT.to_string(),
            TaskKind::Greeting => {
                GREETING_PROMPT.replace("{count}", &greeting_count(params).to_string())
            }
            TaskKind::Custom => req_str(params, "systemPrompt")?.to_string(),
        };
        Ok(prompt)
    }

    pub fn user_message(&self, params: &Value) -> Result<String, PromptError> {
        let message = match self {
            TaskKind::Segment | TaskKind::Translate => req_str(params, "text")?.to_string(),
            TaskKind::SegmentAlign => format!(
                "English text:\n{}\n\nChinese text:\n{}",
                req_str(params, "englishText")?,
                req_str(params, "chineseText")?
            ),
            TaskKind::Score => format!(
                "Original: {}\nReference translation: {}\nUser translation: {}",
                req_str(params, "original")?,
                req_str(params, "reference")?,
                req_str(params, "userTranslation")?
            ),
            TaskKind::Greeting => {
                let name = opt_str(params, "name")
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or("not set");
                let hour = params
                    .get("hour")
                    .and_then(Value::as_u64)
                    .filter(|h| *h < 24)
                    .map(|h| h as u8)
                    .unwrap_or_else(current_hour);
                format!(
                    "User name: {name}\nTime of day: {}\nNumber of greetings: {}",
                    time_of_day(hour),
                    greeting_count(params)
                )
            }
            TaskKind::Custom => req_str(params, "userMessage")?.to_string(),
        };
        Ok(message)
    }

    /// Map decoded model output to this task's result shape.
    pub fn parse(&self, value: Value) -> TaskOutput {
        match self {
            TaskKind::Segment => TaskOutput::Segments {
                segments: string_list(value.get("segments")),
            },
            TaskKind::SegmentAlign => TaskOutput::Pairs {
                pairs: sentence_pairs(value.get("pairs")),
            },
            TaskKind::Translate => TaskOutput::Translation {
                translation: string_field(&value, "translation"),
            },
            TaskKind::Score => TaskOutput::Score {
                score: value.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                feedback: string_field(&value, "feedback"),
                suggestions: string_list(value.get("suggestions")),
            },
            TaskKind::Greeting => TaskOutput::Greetings {
                greetings: string_list(value.get("greetings")),
            },
            TaskKind::Custom => TaskOutput::Raw(value),
        }
    }
}

impl FromStr for TaskKind {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PromptError::UnknownTaskType(s.to_string()))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System and user message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub kind: TaskKind,
    pub system: String,
    pub user: String,
}

/// Resolve `task_type` and build both messages.
pub fn build_prompt(task_type: &str, params: &Value) -> Result<BuiltPrompt, PromptError> {
    let kind: TaskKind = task_type.parse()?;
    Ok(BuiltPrompt {
        kind,
        system: kind.system_prompt(params)?,
        user: kind.user_message(params)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentencePair {
    pub en: String,
    pub zh: String,
}

/// Task-specific result. Serialises to the bare shape, e.g.
/// `{"segments": [...]}` or whatever JSON a custom task returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Segments {
        segments: Vec<String>,
    },
    Pairs {
        pairs: Vec<SentencePair>,
    },
    Translation {
        translation: String,
    },
    Score {
        score: f64,
        feedback: String,
        suggestions: Vec<String>,
    },
    Greetings {
        greetings: Vec<String>,
    },
    Raw(Value),
}

/// Greeting bucket for an hour of the day (0-23).
pub fn time_of_day(hour: u8) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

fn current_hour() -> u8 {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .hour()
}

fn greeting_count(params: &Value) -> u64 {
    params
        .get("count")
        .and_then(Value::as_u64)
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_GREETING_COUNT)
}

fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn req_str<'a>(params: &'a Value, key: &'static str) -> Result<&'a str, PromptError> {
    opt_str(params, key).ok_or(PromptError::MissingParam(key))
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn sentence_pairs(value: Option<&Value>) -> Vec<SentencePair> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|pair| {
                    let side = |key: &str| {
                        pair.get(key)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };
                    SentencePair {
                        en: side("en"),
                        zh: side("zh"),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
