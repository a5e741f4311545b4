//! Conversation and backend wire types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Role of a conversation message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,

    /// Message produced by the backend or by the client on its behalf
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single entry of the conversation log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Reply of `POST /api/chat`
///
/// `tool_result` arrives either as an array of descriptors or as a single
/// bare object depending on the backend version. Both are normalized into a
/// list here; `null` or a missing field becomes an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "nullable_string")]
    pub reply: String,

    #[serde(default, deserialize_with = "one_or_many")]
    pub tool_result: Vec<TaskDescriptor>,
}

impl ChatResponse {
    /// Task id carried by the first descriptor, if any.
    ///
    /// Later descriptors are never consulted, even when the first one has
    /// no id.
    pub fn first_task_id(&self) -> Option<&str> {
        self.tool_result
            .first()
            .and_then(|d| d.task_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// One element of `tool_result`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Remaining fields (echoed arguments, inline backtest fields, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<TaskDescriptor>),
    One(TaskDescriptor),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<TaskDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(list)) => list,
        Some(OneOrMany::One(single)) => vec![single],
        None => Vec::new(),
    })
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Backtest status reported by `GET /api/backtest/status/{task_id}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// `complete` and `failed` end a polling cycle; everything else keeps it alive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Complete => write!(f, "complete"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reply of the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: TaskStatus,

    /// Decoded best-effort: a payload that does not fit [`BacktestResult`]
    /// is kept whole in its `extra` map instead of failing the response
    #[serde(
        default,
        deserialize_with = "best_effort_result",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<BacktestResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn complete(result: BacktestResult) -> Self {
        Self {
            status: TaskStatus::Complete,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

fn best_effort_result<'de, D>(deserializer: D) -> Result<Option<BacktestResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(fields)) => Some(
            serde_json::from_value(Value::Object(fields.clone())).unwrap_or(BacktestResult {
                extra: fields,
                ..Default::default()
            }),
        ),
        _ => None,
    })
}

/// Counts sometimes arrive as floats (`42.0`); whole values are accepted,
/// anything else reads as absent
fn whole_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(as_whole_number)
        .and_then(|n| T::try_from(n).ok()))
}

fn as_whole_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outcome of a finished backtest. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BacktestResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Fast moving-average window
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub fast: Option<u32>,

    /// Slow moving-average window
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub slow: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cagr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,

    /// Number of closed trades
    #[serde(
        default,
        deserialize_with = "whole_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub trades: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Fields outside the known set (sharpe, profit, ...), kept as delivered
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BacktestResult {
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Default::default()
        }
    }

    /// Human-readable `label: value` lines for the fields that are present.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(symbol) = &self.symbol {
            lines.push(format!("symbol: {}", symbol));
        }
        match (self.fast, self.slow) {
            (Some(fast), Some(slow)) => lines.push(format!("windows: {}/{}", fast, slow)),
            (Some(fast), None) => lines.push(format!("fast window: {}", fast)),
            (None, Some(slow)) => lines.push(format!("slow window: {}", slow)),
            (None, None) => {}
        }
        if self.start.is_some() || self.end.is_some() {
            lines.push(format!(
                "period: {} ~ {}",
                self.start.as_deref().unwrap_or("?"),
                self.end.as_deref().unwrap_or("now")
            ));
        }
        if let Some(cagr) = self.cagr {
            lines.push(format!("CAGR: {:.2}%", cagr * 100.0));
        }
        if let Some(dd) = self.max_drawdown {
            lines.push(format!("max drawdown: {:.2}%", dd * 100.0));
        }
        if let Some(rate) = self.win_rate {
            lines.push(format!("win rate: {:.2}%", rate * 100.0));
        }
        if let Some(trades) = self.trades {
            lines.push(format!("trades: {}", trades));
        }
        for (key, value) in &self.extra {
            lines.push(format!("{}: {}", key, value));
        }
        if let Some(note) = &self.note {
            lines.push(format!("note: {}", note));
        }

        lines
    }
}
