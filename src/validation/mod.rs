/**
 * Content Validation & Sanitization
 * Pure functions between untrusted JSON request bodies and the persistence
 * layer. Validation aggregates every failure into an error list; sanitization
 * never fails, it only drops or truncates.
 */
pub mod sanitize;

use chrono::{Datelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use sanitize::{clamp, clean_text, strip_html};

/// Fixed allow-list of page sections. A key outside this list never reaches
/// the query layer.
pub const SECTION_KEYS: &[&str] = &[
    "hero",
    "about",
    "experience",
    "education",
    "awards",
    "publications",
    "community",
    "contact",
];

/// Project category enum. Anything else is a hard validation error.
pub const PROJECT_CATEGORIES: &[&str] =
    &["web", "mobile", "cloud", "ai", "data", "infrastructure", "other"];

lazy_static! {
    /// Identifier pattern shared by section keys and icon names.
    static ref IDENTIFIER_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();

    /// Badge ids are interpolated into an outbound URL; alphanumeric only
    /// (SSRF guard).
    static ref BADGE_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]+$").unwrap();
}

/// Outcome of validating one request body.
#[derive(Debug)]
pub struct Validated {
    /// Only validated, sanitized fields; nothing else is copied over.
    pub sanitized: Map<String, Value>,
    pub errors: Vec<String>,
}

impl Validated {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn is_allowed_section_key(key: &str) -> bool {
    key.len() <= 50
        && IDENTIFIER_REGEX.is_match(key)
        && SECTION_KEYS.contains(&key.to_lowercase().as_str())
}

pub fn is_valid_badge_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 100 && BADGE_ID_REGEX.is_match(id)
}

/// Parse a numeric id from a query string, range-checked to be positive.
pub fn parse_positive_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accept only http/https URLs. `javascript:` and friends are rejected
/// outright rather than sanitized.
fn checked_url(raw: &str) -> Result<String, ()> {
    let parsed = Url::parse(raw.trim()).map_err(|_| ())?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        _ => Err(()),
    }
}

// ============================================================================
// Project input
// ============================================================================

/// Bounded free-text field: presence with the wrong type or over the length
/// cap is an error; absence is fine.
fn take_text(
    input: &Map<String, Value>,
    out: &mut Map<String, Value>,
    errors: &mut Vec<String>,
    field: &str,
    max: usize,
) {
    match input.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => {
            if s.chars().count() > max {
                errors.push(format!("{} must be at most {} characters", field, max));
            } else {
                out.insert(field.to_string(), Value::String(strip_html(s)));
            }
        }
        Some(_) => errors.push(format!("{} must be a string", field)),
    }
}

fn take_url(
    input: &Map<String, Value>,
    out: &mut Map<String, Value>,
    errors: &mut Vec<String>,
    field: &str,
) {
    match input.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.trim().is_empty() => {
            out.insert(field.to_string(), Value::String(String::new()));
        }
        Some(Value::String(s)) => match checked_url(s) {
            Ok(url) if url.chars().count() <= 500 => {
                out.insert(field.to_string(), Value::String(url));
            }
            Ok(_) => errors.push(format!("{} must be at most 500 characters", field)),
            Err(()) => errors.push(format!("{} must be a valid http or https URL", field)),
        },
        Some(_) => errors.push(format!("{} must be a string", field)),
    }
}

/// Validate and sanitize a project create/update payload (spec shape: every
/// field optional, aggregated errors, allow-list output).
pub fn validate_project_input(input: &Value) -> Validated {
    let mut out = Map::new();
    let mut errors = Vec::new();

    let obj = match input.as_object() {
        Some(obj) => obj,
        None => {
            return Validated {
                sanitized: out,
                errors: vec!["request body must be a JSON object".to_string()],
            };
        }
    };

    take_text(obj, &mut out, &mut errors, "title", 200);
    take_text(obj, &mut out, &mut errors, "tagline", 500);
    take_text(obj, &mut out, &mut errors, "challenge", 2000);
    take_text(obj, &mut out, &mut errors, "solution", 2000);

    // impact: [{metric, value}] — non-conforming elements are dropped
    // silently, the array itself must be an array. Capped at 10.
    match obj.get("impact") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            let kept: Vec<Value> = items
                .iter()
                .filter_map(|item| {
                    let entry = item.as_object()?;
                    let metric = entry.get("metric")?.as_str()?;
                    let value = entry.get("value")?.as_str()?;
                    if metric.chars().count() > 200 || value.chars().count() > 200 {
                        return None;
                    }
                    let mut clean = Map::new();
                    clean.insert("metric".to_string(), Value::String(strip_html(metric)));
                    clean.insert("value".to_string(), Value::String(strip_html(value)));
                    Some(Value::Object(clean))
                })
                .take(10)
                .collect();
            out.insert("impact".to_string(), Value::Array(kept));
        }
        Some(_) => errors.push("impact must be an array".to_string()),
    }

    // technologies: array of strings, cap 20; elements over 100 chars are
    // dropped, not truncated.
    match obj.get("technologies") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            let kept: Vec<Value> = items
                .iter()
                .filter_map(|item| item.as_str())
                .filter(|s| s.chars().count() <= 100)
                .map(|s| Value::String(strip_html(s)))
                .take(20)
                .collect();
            out.insert("technologies".to_string(), Value::Array(kept));
        }
        Some(_) => errors.push("technologies must be an array".to_string()),
    }

    match obj.get("category") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if PROJECT_CATEGORIES.contains(&s.as_str()) => {
            out.insert("category".to_string(), Value::String(s.clone()));
        }
        Some(_) => errors.push(format!(
            "category must be one of: {}",
            PROJECT_CATEGORIES.join(", ")
        )),
    }

    match obj.get("icon_name") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.len() <= 50 && IDENTIFIER_REGEX.is_match(s) => {
            out.insert("icon_name".to_string(), Value::String(s.clone()));
        }
        Some(_) => errors.push(
            "icon_name must contain only letters, digits, hyphens and underscores (max 50)"
                .to_string(),
        ),
    }

    match obj.get("year") {
        None | Some(Value::Null) => {}
        Some(v) => {
            let max_year = i64::from(Utc::now().year()) + 1;
            match as_i64(v) {
                Some(year) if (1990..=max_year).contains(&year) => {
                    out.insert("year".to_string(), Value::from(year));
                }
                _ => errors.push(format!("year must be an integer between 1990 and {}", max_year)),
            }
        }
    }

    take_url(obj, &mut out, &mut errors, "link");
    take_url(obj, &mut out, &mut errors, "project_url");
    take_url(obj, &mut out, &mut errors, "thumbnail_url");

    match obj.get("id") {
        None | Some(Value::Null) => {}
        Some(v) => match as_i64(v) {
            Some(id) if id > 0 => {
                out.insert("id".to_string(), Value::from(id));
            }
            _ => errors.push("id must be a positive integer".to_string()),
        },
    }

    match obj.get("sort_order") {
        None | Some(Value::Null) => {}
        Some(v) => match as_i64(v) {
            Some(order) if order >= 0 => {
                out.insert("sort_order".to_string(), Value::from(order));
            }
            _ => errors.push("sort_order must be a non-negative integer".to_string()),
        },
    }

    match obj.get("is_visible") {
        None | Some(Value::Null) => {}
        Some(Value::Bool(b)) => {
            out.insert("is_visible".to_string(), Value::Bool(*b));
        }
        Some(_) => errors.push("is_visible must be a boolean".to_string()),
    }

    Validated { sanitized: out, errors }
}

/// Fields a project history restore is allowed to write back onto the live
/// row. Anything else in the stored snapshot is ignored.
pub const PROJECT_RESTORE_FIELDS: &[&str] = &[
    "title",
    "tagline",
    "challenge",
    "solution",
    "impact",
    "technologies",
    "category",
    "icon_name",
    "year",
    "link",
    "project_url",
];

/// Allow-list extraction of a stored project snapshot for restore: the
/// snapshot is replayed through the same validator, then reduced to the
/// restore field set.
pub fn extract_project_restore(snapshot: &Value) -> Map<String, Value> {
    let validated = validate_project_input(snapshot);
    let mut out = Map::new();
    for field in PROJECT_RESTORE_FIELDS {
        if let Some(v) = validated.sanitized.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    out
}

// ============================================================================
// Section content
// ============================================================================

/// Top-level free-text fields accepted in any section, with char caps.
const SECTION_TEXT_FIELDS: &[(&str, usize)] = &[
    ("title", 200),
    ("subtitle", 300),
    ("heading", 200),
    ("tagline", 500),
    ("description", 2000),
    ("body", 5000),
    ("imageUrl", 500),
    ("ctaLabel", 100),
    ("ctaUrl", 500),
    ("email", 254),
    ("location", 200),
];

/// Copy a string field by allow-list, truncating and stripping markup.
fn extract_text(src: &Map<String, Value>, dst: &mut Map<String, Value>, field: &str, max: usize) {
    if let Some(Value::String(s)) = src.get(field) {
        dst.insert(field.to_string(), Value::String(clean_text(s, max)));
    }
}

fn extract_string_array(
    src: &Map<String, Value>,
    dst: &mut Map<String, Value>,
    field: &str,
    cap: usize,
    each_max: usize,
) {
    if let Some(Value::Array(items)) = src.get(field) {
        let kept: Vec<Value> = items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| Value::String(clean_text(s, each_max)))
            .take(cap)
            .collect();
        dst.insert(field.to_string(), Value::Array(kept));
    }
}

fn extract_objects<F>(
    src: &Map<String, Value>,
    dst: &mut Map<String, Value>,
    field: &str,
    cap: usize,
    extract_one: F,
) where
    F: Fn(&Map<String, Value>) -> Map<String, Value>,
{
    if let Some(Value::Array(items)) = src.get(field) {
        let kept: Vec<Value> = items
            .iter()
            .filter_map(|v| v.as_object())
            .map(|obj| Value::Object(extract_one(obj)))
            .take(cap)
            .collect();
        dst.insert(field.to_string(), Value::Array(kept));
    }
}

fn extract_job(src: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    extract_text(src, &mut out, "title", 200);
    extract_text(src, &mut out, "company", 200);
    extract_text(src, &mut out, "period", 100);
    extract_text(src, &mut out, "location", 200);
    extract_text(src, &mut out, "description", 2000);
    extract_string_array(src, &mut out, "technologies", 20, 100);
    out
}

fn extract_item(src: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    extract_text(src, &mut out, "title", 200);
    extract_text(src, &mut out, "subtitle", 300);
    extract_text(src, &mut out, "description", 2000);
    extract_text(src, &mut out, "year", 10);
    extract_text(src, &mut out, "url", 500);
    out
}

fn extract_skill(src: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    extract_text(src, &mut out, "name", 100);
    if let Some(level) = src.get("level").and_then(as_i64) {
        out.insert("level".to_string(), Value::from(level.clamp(0, 100)));
    }
    out
}

fn extract_event(src: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    extract_text(src, &mut out, "name", 200);
    extract_text(src, &mut out, "role", 100);
    extract_text(src, &mut out, "date", 50);
    extract_text(src, &mut out, "description", 1000);
    extract_text(src, &mut out, "url", 500);
    out
}

/// Sanitize section content by allow-list extraction: a brand-new object is
/// built from the recognized fields only, so nothing a client smuggles into
/// the payload survives to storage. Never errors.
pub fn sanitize_section_content(content: &Value) -> Value {
    let src = match content.as_object() {
        Some(obj) => obj,
        None => return Value::Object(Map::new()),
    };

    let mut out = Map::new();
    for (field, max) in SECTION_TEXT_FIELDS {
        extract_text(src, &mut out, field, *max);
    }
    extract_string_array(src, &mut out, "highlights", 20, 300);
    extract_objects(src, &mut out, "jobs", 50, extract_job);
    extract_objects(src, &mut out, "items", 50, extract_item);
    extract_objects(src, &mut out, "skills", 100, extract_skill);
    extract_objects(src, &mut out, "communityEvents", 50, extract_event);
    extract_objects(src, &mut out, "pastEvents", 100, extract_event);
    extract_objects(src, &mut out, "mlsaInvolvements", 10, extract_event);

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_key_allow_list() {
        assert!(is_allowed_section_key("hero"));
        assert!(is_allowed_section_key("About"));
        assert!(!is_allowed_section_key("blog"));
        assert!(!is_allowed_section_key("hero'; DROP TABLE content_sections;--"));
        assert!(!is_allowed_section_key(""));
    }

    #[test]
    fn test_badge_id_alphanumeric_only() {
        assert!(is_valid_badge_id("abc123DEF"));
        assert!(!is_valid_badge_id("abc-123"));
        assert!(!is_valid_badge_id("../etc/passwd"));
        assert!(!is_valid_badge_id(""));
        assert!(!is_valid_badge_id(&"a".repeat(101)));
    }

    #[test]
    fn test_parse_positive_id() {
        assert_eq!(parse_positive_id("42"), Some(42));
        assert_eq!(parse_positive_id(" 7 "), Some(7));
        assert_eq!(parse_positive_id("0"), None);
        assert_eq!(parse_positive_id("-3"), None);
        assert_eq!(parse_positive_id("abc"), None);
    }

    #[test]
    fn test_project_title_over_200_rejected() {
        let result = validate_project_input(&json!({ "title": "x".repeat(201) }));
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("title")));
        assert!(!result.sanitized.contains_key("title"));
    }

    #[test]
    fn test_project_title_html_stripped() {
        let result = validate_project_input(&json!({ "title": "<b>My</b> Project" }));
        assert!(result.is_valid());
        assert_eq!(result.sanitized["title"], "My Project");
    }

    #[test]
    fn test_project_absent_fields_are_fine() {
        let result = validate_project_input(&json!({}));
        assert!(result.is_valid());
        assert!(result.sanitized.is_empty());
    }

    #[test]
    fn test_project_errors_aggregate() {
        let result = validate_project_input(&json!({
            "title": "x".repeat(201),
            "category": "quantum",
            "year": 1850,
        }));
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_impact_drops_nonconforming_elements() {
        let result = validate_project_input(&json!({
            "impact": [
                { "metric": "Uptime", "value": "99.9%" },
                { "metric": "x".repeat(300), "value": "y" },
                { "metric": 12, "value": "y" },
                "not an object",
            ]
        }));
        assert!(result.is_valid());
        let impact = result.sanitized["impact"].as_array().unwrap();
        assert_eq!(impact.len(), 1);
        assert_eq!(impact[0]["metric"], "Uptime");
    }

    #[test]
    fn test_impact_capped_at_10() {
        let entries: Vec<_> = (0..15)
            .map(|i| json!({ "metric": format!("m{}", i), "value": "v" }))
            .collect();
        let result = validate_project_input(&json!({ "impact": entries }));
        assert_eq!(result.sanitized["impact"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_impact_non_array_is_error() {
        let result = validate_project_input(&json!({ "impact": "high" }));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_technologies_capped_at_20() {
        let techs: Vec<_> = (0..30).map(|i| json!(format!("tech{}", i))).collect();
        let result = validate_project_input(&json!({ "technologies": techs }));
        assert_eq!(result.sanitized["technologies"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_technologies_over_length_element_dropped() {
        let result = validate_project_input(&json!({
            "technologies": ["Rust", "x".repeat(101), "Postgres"]
        }));
        assert!(result.is_valid());
        let techs = result.sanitized["technologies"].as_array().unwrap();
        assert_eq!(techs.len(), 2);
        assert_eq!(techs[0], "Rust");
        assert_eq!(techs[1], "Postgres");
    }

    #[test]
    fn test_thumbnail_url_validated_like_other_urls() {
        let ok = validate_project_input(&json!({
            "thumbnail_url": "https://cdn.example.com/t.png"
        }));
        assert!(ok.is_valid());
        assert_eq!(ok.sanitized["thumbnail_url"], "https://cdn.example.com/t.png");
        let bad = validate_project_input(&json!({ "thumbnail_url": "javascript:alert(1)" }));
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_category_enum_hard_error() {
        let ok = validate_project_input(&json!({ "category": "web" }));
        assert!(ok.is_valid());
        let bad = validate_project_input(&json!({ "category": "blockchain" }));
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_icon_name_pattern() {
        let ok = validate_project_input(&json!({ "icon_name": "server-cog_2" }));
        assert!(ok.is_valid());
        let bad = validate_project_input(&json!({ "icon_name": "<img>" }));
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_year_bounds() {
        assert!(validate_project_input(&json!({ "year": 2020 })).is_valid());
        assert!(validate_project_input(&json!({ "year": "2005" })).is_valid());
        assert!(!validate_project_input(&json!({ "year": 1989 })).is_valid());
        let next_decade = Utc::now().year() + 10;
        assert!(!validate_project_input(&json!({ "year": next_decade })).is_valid());
    }

    #[test]
    fn test_javascript_url_hard_rejected() {
        let result = validate_project_input(&json!({ "link": "javascript:alert(1)" }));
        assert!(!result.is_valid());
        assert!(!result.sanitized.contains_key("link"));
    }

    #[test]
    fn test_https_url_accepted() {
        let result = validate_project_input(&json!({ "project_url": "https://example.com/x" }));
        assert!(result.is_valid());
        assert_eq!(result.sanitized["project_url"], "https://example.com/x");
    }

    #[test]
    fn test_update_id_must_be_positive() {
        assert!(validate_project_input(&json!({ "id": 3 })).is_valid());
        assert!(!validate_project_input(&json!({ "id": 0 })).is_valid());
        assert!(!validate_project_input(&json!({ "id": "seven" })).is_valid());
    }

    #[test]
    fn test_non_object_body_rejected() {
        let result = validate_project_input(&json!([1, 2, 3]));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_restore_extraction_is_allow_listed() {
        let snapshot = json!({
            "title": "Restored",
            "category": "web",
            "is_visible": false,
            "sort_order": 9,
            "injected_admin_flag": true,
        });
        let restored = extract_project_restore(&snapshot);
        assert_eq!(restored["title"], "Restored");
        assert_eq!(restored["category"], "web");
        assert!(!restored.contains_key("injected_admin_flag"));
        assert!(!restored.contains_key("is_visible"));
        assert!(!restored.contains_key("sort_order"));
    }

    #[test]
    fn test_section_content_allow_list_extraction() {
        let content = json!({
            "title": "About me",
            "__proto__": { "polluted": true },
            "unknownField": "dropped",
            "jobs": [
                {
                    "title": "Engineer",
                    "company": "<script>alert(1)</script>Acme",
                    "secret": "dropped",
                    "technologies": ["Rust", "Postgres"]
                }
            ]
        });
        let clean = sanitize_section_content(&content);
        assert_eq!(clean["title"], "About me");
        assert!(clean.get("__proto__").is_none());
        assert!(clean.get("unknownField").is_none());
        let job = &clean["jobs"][0];
        assert_eq!(job["company"], "Acme");
        assert!(job.get("secret").is_none());
    }

    #[test]
    fn test_section_nested_arrays_capped() {
        let jobs: Vec<_> = (0..80).map(|i| json!({ "title": format!("j{}", i) })).collect();
        let involvements: Vec<_> = (0..30).map(|i| json!({ "name": format!("e{}", i) })).collect();
        let clean = sanitize_section_content(&json!({
            "jobs": jobs,
            "mlsaInvolvements": involvements,
        }));
        assert_eq!(clean["jobs"].as_array().unwrap().len(), 50);
        assert_eq!(clean["mlsaInvolvements"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_section_field_truncation() {
        let clean = sanitize_section_content(&json!({ "heading": "h".repeat(500) }));
        assert_eq!(clean["heading"].as_str().unwrap().len(), 200);
    }

    #[test]
    fn test_section_skill_level_clamped() {
        let clean = sanitize_section_content(&json!({
            "skills": [{ "name": "Rust", "level": 250 }, { "name": "Go", "level": -5 }]
        }));
        assert_eq!(clean["skills"][0]["level"], 100);
        assert_eq!(clean["skills"][1]["level"], 0);
    }

    #[test]
    fn test_section_non_object_content_becomes_empty() {
        let clean = sanitize_section_content(&json!("just a string"));
        assert_eq!(clean, json!({}));
    }
}
