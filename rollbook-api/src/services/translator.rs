//! Natural-language query translator for the chat assistant
//!
//! Turn protocol: one completion call decides whether a query is needed
//! and which of three fixed shapes to run (students, attendance, stats);
//! the selected query executes against the store; a second completion
//! call phrases the capped result as the final answer.
//!
//! Filters arrive from the model as loose JSON and are decoded into
//! closed per-kind structs; unrecognized keys are rejected at that
//! boundary and downgrade the turn to "no query" instead of being
//! passed through.

use chrono::{Datelike, NaiveDate};
use rollbook_common::types::{AttendanceStatus, Sex, YearLevel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::{attendance, students};
use crate::error::{ApiError, ApiResult};
use crate::services::llm::{LlmClient, LlmError};
use crate::services::stats;

/// Instruction document sent ahead of every analysis call
const SYSTEM_PROMPT: &str = r#"You are an AI assistant for a school attendance management system. You have access to a database with the following tables:

**students:**
- name: string (student's full name) - ALWAYS search by name only
- sex: 'Male' | 'Female'
- year: string (EY, Reception, Year 1, Year 2, Year 3, Year 4, Year 5, Year 6, Year 7, Year 8, Year 9, Year 10, Year 11, Year 12, Year 13)

**attendance_records:**
- student: reference to a student
- date: calendar date
- status: 'Present' | 'Absent' | 'Late' | 'Excused'
- reason: string (optional)
- notes: string (optional)

IMPORTANT RULES:
- NEVER use or mention student IDs
- ALWAYS search students by name only
- For date queries, use "today" or "yesterday" keywords, or an explicit YYYY-MM-DD date
- Keep filters simple: only use name, year, sex, date, status, and period

When a user asks questions:
1. Analyze what data they need
2. Respond with a JSON object containing:
   - "needsData": boolean (true if you need to query the database)
   - "queryType": "students" | "attendance" | "stats" | "none"
   - "filters": object with query parameters
   - "response": your natural language response

Examples:
- "How many students are in Year 7?" -> {"needsData": true, "queryType": "students", "filters": {"year": "Year 7"}, "response": ""}
- "Who was absent today?" -> {"needsData": true, "queryType": "attendance", "filters": {"date": "today", "status": "Absent"}, "response": ""}
- "What's the attendance rate this month?" -> {"needsData": true, "queryType": "stats", "filters": {"period": "month"}, "response": ""}
- "How do I add a student?" -> {"needsData": false, "queryType": "none", "filters": {}, "response": "To add a student, go to Student Management and click the 'Add Student' button..."}

Be helpful, concise, and accurate. If you don't have enough information, ask clarifying questions."#;

const GENERIC_APOLOGY: &str = "Sorry, I encountered an error processing your request.";
pub const NOT_CONFIGURED: &str =
    "The AI assistant is not configured. Please contact the administrator.";
const AUTH_FAILED: &str =
    "The AI service authentication failed. Please check the API key configuration.";
const FORMATTING_FALLBACK: &str =
    "I found some data but had trouble formatting the response. Please try rephrasing your question.";

/// Largest number of items echoed back to the caller and fed into the
/// phrasing call; longer lists get a "... and N more" marker.
const RESULT_CAP: usize = 20;
const STUDENT_QUERY_LIMIT: usize = 100;
const ATTENDANCE_QUERY_LIMIT: i64 = 100;

/// One prior conversation turn supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Date scope for attendance queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Yesterday,
    On(NaiveDate),
}

impl DateFilter {
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DateFilter::Today => today,
            DateFilter::Yesterday => today.pred_opt().unwrap_or(today),
            DateFilter::On(day) => *day,
        }
    }
}

impl<'de> Deserialize<'de> for DateFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(DateFilter::Today),
            "yesterday" => Ok(DateFilter::Yesterday),
            _ => s
                .parse::<NaiveDate>()
                .map(DateFilter::On)
                .map_err(|_| serde::de::Error::custom(format!("Unrecognized date filter: {}", s))),
        }
    }
}

/// Reporting period for statistics queries; anything unstated is
/// year-to-date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    #[serde(rename = "year-to-date")]
    YearToDate,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::YearToDate => "year-to-date",
        }
    }

    /// Inclusive [start, end] day range ending today
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = match self {
            Period::Today => today,
            Period::Week => today - chrono::Duration::days(7),
            Period::Month => today.with_day(1).unwrap_or(today),
            Period::YearToDate => {
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today)
            }
        };
        (start, today)
    }
}

/// Student-lookup filters
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentFilters {
    pub year: Option<YearLevel>,
    pub sex: Option<Sex>,
    /// Case-insensitive substring over the display name
    pub name: Option<String>,
}

/// Attendance-lookup filters
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttendanceFilters {
    pub date: Option<DateFilter>,
    pub status: Option<AttendanceStatus>,
}

/// Statistics filters
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsFilters {
    pub period: Option<Period>,
}

/// The three fixed query shapes, or no query at all
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Students(StudentFilters),
    Attendance(AttendanceFilters),
    Stats(StatsFilters),
    None,
}

/// Outcome of the analysis call
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub plan: QueryPlan,
    pub reply: String,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default, rename = "needsData")]
    needs_data: bool,
    #[serde(default, rename = "queryType")]
    query_type: String,
    #[serde(default)]
    filters: Value,
    #[serde(default)]
    response: String,
}

/// Pull a JSON object out of the model's reply: a ```json fence if
/// present, otherwise the outermost braces.
fn extract_json(text: &str) -> Option<&str> {
    if let Some(fence_start) = text.find("```json") {
        let rest = &text[fence_start + "```json".len()..];
        if let Some(fence_end) = rest.find("```") {
            return Some(rest[..fence_end].trim());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn decode_filters<T: Default + serde::de::DeserializeOwned>(filters: &Value) -> Result<T, String> {
    if filters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(filters.clone()).map_err(|e| e.to_string())
}

/// Parse the analysis reply. A reply that is not the expected structure
/// (prose, or filters with unrecognized keys) is treated as a direct
/// natural-language answer with no query, never an error.
pub fn parse_analysis(text: &str) -> Analysis {
    let direct = |text: &str| Analysis {
        plan: QueryPlan::None,
        reply: text.to_string(),
    };

    let Some(json_text) = extract_json(text) else {
        return direct(text);
    };
    let Ok(raw) = serde_json::from_str::<RawAnalysis>(json_text) else {
        tracing::debug!("Analysis reply was not the expected structure; using it verbatim");
        return direct(text);
    };

    if !raw.needs_data {
        return Analysis {
            plan: QueryPlan::None,
            reply: raw.response,
        };
    }

    let plan = match raw.query_type.as_str() {
        "students" => decode_filters::<StudentFilters>(&raw.filters).map(QueryPlan::Students),
        "attendance" => decode_filters::<AttendanceFilters>(&raw.filters).map(QueryPlan::Attendance),
        "stats" => decode_filters::<StatsFilters>(&raw.filters).map(QueryPlan::Stats),
        _ => Ok(QueryPlan::None),
    };

    match plan {
        Ok(plan) => Analysis {
            plan,
            reply: raw.response,
        },
        Err(reason) => {
            tracing::warn!(%reason, "Rejected filters from analysis reply; answering without a query");
            Analysis {
                plan: QueryPlan::None,
                reply: raw.response,
            }
        }
    }
}

/// Cap a list result for echoing and phrasing; appends a summary marker
/// when items were dropped.
fn cap_result(data: Value) -> Value {
    let Value::Array(items) = data else {
        return data;
    };
    if items.len() <= RESULT_CAP {
        return Value::Array(items);
    }

    let dropped = items.len() - RESULT_CAP;
    let mut capped: Vec<Value> = items.into_iter().take(RESULT_CAP).collect();
    capped.push(json!({ "note": format!("... and {} more records", dropped) }));
    Value::Array(capped)
}

/// Statistics payload returned to the chat caller
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatStats {
    total: i64,
    present: i64,
    absent: i64,
    late: i64,
    excused: i64,
    period: &'static str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_students: i64,
    school_days: i64,
    attendance_rate: f64,
}

/// Final result of one chat turn
#[derive(Debug)]
pub struct ChatReply {
    pub message: String,
    /// Raw (capped) query result, None when no query ran
    pub data: Option<Value>,
}

/// Chat front door: owns the completion client and the decide → execute
/// → phrase round trip.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    client: LlmClient,
}

impl QueryTranslator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Process one chat turn against the store.
    pub async fn chat_turn(
        &self,
        pool: &SqlitePool,
        message: &str,
        history: &[ChatTurn],
    ) -> ApiResult<ChatReply> {
        let today = chrono::Local::now().date_naive();

        let prompt = build_analysis_prompt(message, history);
        let text = self
            .client
            .complete(&prompt)
            .await
            .map_err(|e| upstream_error(&e))?;

        let analysis = parse_analysis(&text);

        let data = match &analysis.plan {
            QueryPlan::None => None,
            QueryPlan::Students(filters) => Some(run_student_query(pool, filters).await?),
            QueryPlan::Attendance(filters) => {
                Some(run_attendance_query(pool, filters, today).await?)
            }
            QueryPlan::Stats(filters) => Some(run_stats_query(pool, filters, today).await?),
        };

        let Some(data) = data else {
            return Ok(ChatReply {
                message: analysis.reply,
                data: None,
            });
        };

        let capped = cap_result(data);

        // Second call phrases the result; its failure degrades to a
        // fixed fallback rather than losing the data.
        let message = match self.phrase_with_data(message, &capped).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Phrasing call failed");
                FORMATTING_FALLBACK.to_string()
            }
        };

        Ok(ChatReply {
            message,
            data: Some(capped),
        })
    }

    async fn phrase_with_data(&self, question: &str, data: &Value) -> Result<String, LlmError> {
        let rendered = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        let prompt = format!(
            "User asked: \"{}\"\n\n\
             I retrieved the following data from the database:\n{}\n\n\
             Provide a clear, concise, and helpful response to the user's question based on \
             this data. Format the response in a friendly, conversational way. If there are \
             specific numbers or lists, present them clearly.",
            question, rendered
        );
        self.client.complete(&prompt).await
    }
}

/// Map a completion failure onto the sanitized message shown to the end
/// user; the raw failure is logged, never echoed.
fn upstream_error(err: &LlmError) -> ApiError {
    tracing::error!(error = %err, "Chat service call failed");
    let message = match err {
        LlmError::MissingApiKey => NOT_CONFIGURED,
        LlmError::AuthFailed => AUTH_FAILED,
        _ => GENERIC_APOLOGY,
    };
    ApiError::Upstream(message.to_string())
}

fn build_analysis_prompt(message: &str, history: &[ChatTurn]) -> String {
    // Only the last 3 turns carry over
    let start = history.len().saturating_sub(3);
    let context = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nPrevious conversation:\n{}\n\nUser: {}\n\n\
         Analyze the user's question and respond with a JSON object following the format \
         specified above.",
        SYSTEM_PROMPT, context, message
    )
}

async fn run_student_query(pool: &SqlitePool, filters: &StudentFilters) -> ApiResult<Value> {
    // Name-only lookup: the chat vocabulary never searches by the
    // external identifier.
    let mut found = students::search_by_name(pool, filters.name.as_deref(), filters.year).await?;
    if let Some(sex) = filters.sex {
        found.retain(|s| s.sex == sex);
    }
    found.truncate(STUDENT_QUERY_LIMIT);
    Ok(serde_json::to_value(found).map_err(|e| ApiError::Internal(e.to_string()))?)
}

async fn run_attendance_query(
    pool: &SqlitePool,
    filters: &AttendanceFilters,
    today: NaiveDate,
) -> ApiResult<Value> {
    let day = filters.date.as_ref().map(|d| d.resolve(today));
    let found =
        attendance::list_for_day_with_status(pool, day, filters.status, ATTENDANCE_QUERY_LIMIT)
            .await?;
    Ok(serde_json::to_value(found).map_err(|e| ApiError::Internal(e.to_string()))?)
}

async fn run_stats_query(
    pool: &SqlitePool,
    filters: &StatsFilters,
    today: NaiveDate,
) -> ApiResult<Value> {
    let period = filters.period.unwrap_or(Period::YearToDate);
    let (start, end) = period.range(today);

    let counts = stats::status_counts(pool, Some((start, end)), None).await?;
    let total_students = students::count_students(pool).await?;
    let rate = stats::attendance_rate(
        total_students,
        counts.school_days,
        counts.present,
        counts.late,
    );

    let payload = ChatStats {
        total: counts.total_records,
        present: counts.present,
        absent: counts.absent,
        late: counts.late,
        excused: counts.excused,
        period: period.label(),
        start_date: start,
        end_date: end,
        total_students,
        school_days: counts.school_days,
        attendance_rate: rate,
    };

    Ok(serde_json::to_value(payload).map_err(|e| ApiError::Internal(e.to_string()))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parses_bare_json_analysis() {
        let analysis = parse_analysis(
            r#"{"needsData": true, "queryType": "attendance", "filters": {"date": "today", "status": "Absent"}, "response": ""}"#,
        );
        assert_eq!(
            analysis.plan,
            QueryPlan::Attendance(AttendanceFilters {
                date: Some(DateFilter::Today),
                status: Some(AttendanceStatus::Absent),
            })
        );
    }

    #[test]
    fn parses_fenced_json_analysis() {
        let text = "Here is my analysis:\n```json\n{\"needsData\": true, \"queryType\": \"students\", \"filters\": {\"year\": \"Year 7\"}, \"response\": \"\"}\n```\nDone.";
        let analysis = parse_analysis(text);
        assert_eq!(
            analysis.plan,
            QueryPlan::Students(StudentFilters {
                year: Some(YearLevel::Year7),
                ..Default::default()
            })
        );
    }

    #[test]
    fn prose_reply_becomes_direct_answer() {
        let analysis = parse_analysis("I'm sorry, I can only help with attendance questions.");
        assert_eq!(analysis.plan, QueryPlan::None);
        assert_eq!(
            analysis.reply,
            "I'm sorry, I can only help with attendance questions."
        );
    }

    #[test]
    fn needs_data_false_skips_the_query() {
        let analysis = parse_analysis(
            r#"{"needsData": false, "queryType": "none", "filters": {}, "response": "Go to Student Management."}"#,
        );
        assert_eq!(analysis.plan, QueryPlan::None);
        assert_eq!(analysis.reply, "Go to Student Management.");
    }

    #[test]
    fn unknown_filter_keys_are_rejected() {
        // "studentId" is not part of the closed student-filter vocabulary
        let analysis = parse_analysis(
            r#"{"needsData": true, "queryType": "students", "filters": {"studentId": "S-1"}, "response": ""}"#,
        );
        assert_eq!(analysis.plan, QueryPlan::None);
    }

    #[test]
    fn null_filters_decode_to_defaults() {
        let analysis = parse_analysis(
            r#"{"needsData": true, "queryType": "stats", "filters": null, "response": ""}"#,
        );
        assert_eq!(analysis.plan, QueryPlan::Stats(StatsFilters::default()));
    }

    #[test]
    fn date_filter_accepts_keywords_and_explicit_dates() {
        let f: DateFilter = serde_json::from_str("\"today\"").unwrap();
        assert_eq!(f, DateFilter::Today);
        let f: DateFilter = serde_json::from_str("\"Yesterday\"").unwrap();
        assert_eq!(f, DateFilter::Yesterday);
        let f: DateFilter = serde_json::from_str("\"2024-03-01\"").unwrap();
        assert_eq!(f, DateFilter::On(day("2024-03-01")));
        assert!(serde_json::from_str::<DateFilter>("\"next Tuesday\"").is_err());
    }

    #[test]
    fn date_filter_resolution() {
        let today = day("2024-03-15");
        assert_eq!(DateFilter::Today.resolve(today), today);
        assert_eq!(DateFilter::Yesterday.resolve(today), day("2024-03-14"));
        assert_eq!(
            DateFilter::On(day("2024-01-02")).resolve(today),
            day("2024-01-02")
        );
    }

    #[test]
    fn period_ranges_end_today() {
        let today = day("2024-03-15");
        assert_eq!(Period::Today.range(today), (today, today));
        assert_eq!(Period::Week.range(today), (day("2024-03-08"), today));
        assert_eq!(Period::Month.range(today), (day("2024-03-01"), today));
        assert_eq!(Period::YearToDate.range(today), (day("2024-01-01"), today));
    }

    #[tokio::test]
    async fn student_query_matches_names_but_never_external_ids() {
        use crate::db::students::{insert_student, NewStudent};

        let pool = crate::db::test_pool().await;
        insert_student(
            &pool,
            &NewStudent {
                name: "Amina Khalil".to_string(),
                sex: Sex::Female,
                year: YearLevel::Year7,
                student_id: Some("ZZ-77".to_string()),
                date_of_birth: None,
                email: None,
                phone: None,
                address: None,
            },
        )
        .await
        .unwrap();

        let by_external_id = run_student_query(
            &pool,
            &StudentFilters {
                name: Some("zz-77".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_external_id, json!([]));

        let by_name = run_student_query(
            &pool,
            &StudentFilters {
                name: Some("khal".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_name.as_array().unwrap().len(), 1);
        assert_eq!(by_name[0]["name"], "Amina Khalil");
    }

    #[test]
    fn cap_leaves_short_lists_alone() {
        let data = json!([{"a": 1}, {"a": 2}]);
        assert_eq!(cap_result(data.clone()), data);
    }

    #[test]
    fn cap_truncates_and_marks_long_lists() {
        let items: Vec<Value> = (0..25).map(|i| json!({ "i": i })).collect();
        let capped = cap_result(Value::Array(items));

        let arr = capped.as_array().unwrap();
        assert_eq!(arr.len(), RESULT_CAP + 1);
        assert_eq!(
            arr.last().unwrap()["note"],
            json!("... and 5 more records")
        );
    }

    #[test]
    fn prompt_keeps_only_last_three_turns() {
        let history: Vec<ChatTurn> = (0..5)
            .map(|i| ChatTurn {
                role: "user".to_string(),
                content: format!("turn {}", i),
            })
            .collect();

        let prompt = build_analysis_prompt("hello", &history);
        assert!(!prompt.contains("turn 0"));
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("turn 2"));
        assert!(prompt.contains("turn 4"));
        assert!(prompt.contains("User: hello"));
    }
}
