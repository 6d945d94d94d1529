// Notion property extraction
//
// Turns the typed property objects of a database row into display text.

use super::Requirements;
use serde_json::{Map, Value};

/// Title used when a row has no title property or it is empty
pub const UNTITLED: &str = "מלגה ללא כותרת";

const VOLUNTEERING_FIELDS: [&str; 4] = [
    "RequiresVolunteering",
    "VolunteeringRequired",
    "Requires Volunteering",
    "התנדבות נדרשת",
];

const MILITARY_FIELDS: [&str; 4] = [
    "RequiresMilitaryService",
    "MilitaryServiceRequired",
    "Requires Military Service",
    "שירות צבאי נדרש",
];

const REQUIRED_VALUES: [&str; 3] = ["כן", "נדרש", "חובה"];
const OPTIONAL_VALUES: [&str; 2] = ["לא", "אופציונלי"];

/// Extracted value of a single property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// Flatten to text; list items are joined by spaces, empties dropped
    pub fn to_text(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::List(items) => items
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Text(s) => s.is_empty(),
            PropertyValue::List(items) => items.is_empty(),
        }
    }
}

fn str_at<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn array_at<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn join_plain_text(items: &[Value]) -> String {
    items.iter().map(|item| str_at(item, "plain_text")).collect()
}

fn date_range(date: &Value) -> String {
    let start = str_at(date, "start");
    let end = str_at(date, "end");
    if !start.is_empty() && !end.is_empty() {
        format!("{} - {}", start, end)
    } else {
        start.to_string()
    }
}

/// URL of a file entry, hosted or external
fn file_url(item: &Value) -> &str {
    let hosted = str_at(item.get("file").unwrap_or(&Value::Null), "url");
    if !hosted.is_empty() {
        return hosted;
    }
    str_at(item.get("external").unwrap_or(&Value::Null), "url")
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "כן"
    } else {
        "לא"
    }
}

/// Render a scalar of a formula or rollup result
fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(obj @ Value::Object(_)) if obj.get("start").is_some() => date_range(obj),
        Some(other) => other.to_string(),
    }
}

/// Extract the value of one property according to its `type`
pub fn extract_value(prop: &Value) -> PropertyValue {
    let prop_type = str_at(prop, "type");
    let inner = prop.get(prop_type).unwrap_or(&Value::Null);

    let text = match prop_type {
        "title" | "rich_text" => join_plain_text(array_at(prop, prop_type)),
        "select" => str_at(inner, "name").to_string(),
        "multi_select" => {
            return PropertyValue::List(
                array_at(prop, "multi_select")
                    .iter()
                    .map(|item| str_at(item, "name").to_string())
                    .collect(),
            )
        }
        "date" => date_range(inner),
        "url" | "email" | "phone_number" => inner.as_str().unwrap_or("").to_string(),
        "number" => match inner {
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        },
        "checkbox" => yes_no(inner.as_bool().unwrap_or(false)).to_string(),
        "people" => array_at(prop, "people")
            .iter()
            .map(|person| str_at(person, "name"))
            .collect::<Vec<_>>()
            .join(", "),
        "files" => array_at(prop, "files")
            .iter()
            .map(|item| {
                let name = str_at(item, "name");
                if name.is_empty() {
                    file_url(item)
                } else {
                    name
                }
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        "relation" => format!("{} פריטים", array_at(prop, "relation").len()),
        "formula" => {
            let kind = str_at(inner, "type");
            scalar_text(inner.get(kind))
        }
        "rollup" => {
            let kind = str_at(inner, "type");
            if kind == "array" {
                array_at(inner, "array").len().to_string()
            } else if kind.is_empty() {
                String::new()
            } else {
                scalar_text(inner.get(kind))
            }
        }
        _ => "לא זמין".to_string(),
    };
    PropertyValue::Text(text)
}

/// Flattened text of a property
pub fn property_text(prop: &Value) -> String {
    extract_value(prop).to_text()
}

/// First non-empty url property, else the first file url
pub fn find_best_url(props: &Map<String, Value>) -> String {
    for prop in props.values() {
        match str_at(prop, "type") {
            "url" => {
                let url = prop.get("url").and_then(Value::as_str).unwrap_or("");
                if !url.is_empty() {
                    return url.to_string();
                }
            }
            "files" => {
                if let Some(url) = array_at(prop, "files")
                    .iter()
                    .map(file_url)
                    .find(|url| !url.is_empty())
                {
                    return url.to_string();
                }
            }
            _ => {}
        }
    }
    String::new()
}

/// Interpret the first present requirement field
///
/// Checkbox values are taken as-is; select values must be one of the known
/// yes/no words. Anything else is unknown.
fn extract_requirement(props: &Map<String, Value>, names: &[&str]) -> Option<bool> {
    let prop = names.iter().find_map(|name| props.get(*name))?;
    match str_at(prop, "type") {
        "checkbox" => prop.get("checkbox").and_then(Value::as_bool),
        "select" => {
            let value = str_at(prop.get("select").unwrap_or(&Value::Null), "name");
            if REQUIRED_VALUES.contains(&value) {
                Some(true)
            } else if OPTIONAL_VALUES.contains(&value) {
                Some(false)
            } else {
                None
            }
        }
        "multi_select" => {
            let values: Vec<&str> = array_at(prop, "multi_select")
                .iter()
                .map(|item| str_at(item, "name"))
                .collect();
            if values.iter().any(|v| REQUIRED_VALUES.contains(v)) {
                Some(true)
            } else if values.iter().any(|v| OPTIONAL_VALUES.contains(v)) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn extract_requirements(props: &Map<String, Value>) -> Requirements {
    Requirements {
        volunteering: extract_requirement(props, &VOLUNTEERING_FIELDS),
        military: extract_requirement(props, &MILITARY_FIELDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_text_properties() {
        let title = json!({"type": "title", "title": [{"plain_text": "מלגת "}, {"plain_text": "מצוינות"}]});
        assert_eq!(property_text(&title), "מלגת מצוינות");

        let select = json!({"type": "select", "select": {"name": "שנתית"}});
        assert_eq!(property_text(&select), "שנתית");

        let empty_select = json!({"type": "select", "select": null});
        assert_eq!(property_text(&empty_select), "");
    }

    #[test]
    fn test_date_property() {
        let range = json!({"type": "date", "date": {"start": "2024-01-01", "end": "2024-02-01"}});
        assert_eq!(property_text(&range), "2024-01-01 - 2024-02-01");

        let single = json!({"type": "date", "date": {"start": "2024-01-01", "end": null}});
        assert_eq!(property_text(&single), "2024-01-01");
    }

    #[test]
    fn test_scalar_properties() {
        assert_eq!(property_text(&json!({"type": "number", "number": 5000})), "5000");
        assert_eq!(property_text(&json!({"type": "number", "number": null})), "");
        assert_eq!(property_text(&json!({"type": "checkbox", "checkbox": true})), "כן");
        assert_eq!(property_text(&json!({"type": "checkbox", "checkbox": false})), "לא");
        assert_eq!(
            property_text(&json!({"type": "relation", "relation": [{}, {}, {}]})),
            "3 פריטים"
        );
        assert_eq!(property_text(&json!({"type": "button", "button": {}})), "לא זמין");
        assert_eq!(
            property_text(&json!({"type": "status", "status": {"name": "פעיל"}})),
            "לא זמין"
        );
    }

    #[test]
    fn test_people_and_files() {
        let people = json!({"type": "people", "people": [{"name": "Dana"}, {"name": "Avi"}]});
        assert_eq!(property_text(&people), "Dana, Avi");

        let files = json!({"type": "files", "files": [
            {"name": "", "external": {"url": "https://x.test/a.pdf"}},
            {"name": "form.pdf", "file": {"url": "https://x.test/b.pdf"}}
        ]});
        assert_eq!(property_text(&files), "https://x.test/a.pdf, form.pdf");
    }

    #[test]
    fn test_formula_and_rollup() {
        let formula = json!({"type": "formula", "formula": {"type": "string", "string": "פתוח"}});
        assert_eq!(property_text(&formula), "פתוח");

        let rollup_array = json!({"type": "rollup", "rollup": {"type": "array", "array": [1, 2]}});
        assert_eq!(property_text(&rollup_array), "2");

        let rollup_number = json!({"type": "rollup", "rollup": {"type": "number", "number": 7}});
        assert_eq!(property_text(&rollup_number), "7");

        let flag = json!({"type": "formula", "formula": {"type": "boolean", "boolean": true}});
        assert_eq!(property_text(&flag), "True");
        let flag = json!({"type": "formula", "formula": {"type": "boolean", "boolean": false}});
        assert_eq!(property_text(&flag), "False");
    }

    #[test]
    fn test_multi_select_is_list() {
        let multi = json!({"type": "multi_select", "multi_select": [{"name": "סטודנטים"}, {"name": "פריפריה"}]});
        assert_eq!(
            extract_value(&multi),
            PropertyValue::List(vec!["סטודנטים".to_string(), "פריפריה".to_string()])
        );
        assert_eq!(property_text(&multi), "סטודנטים פריפריה");
    }

    #[test]
    fn test_find_best_url_prefers_first_url_or_file() {
        let p = props(json!({
            "Empty": {"type": "url", "url": null},
            "Docs": {"type": "files", "files": [{"name": "x", "file": {"url": "https://files.test/x"}}]},
            "Link": {"type": "url", "url": "https://apply.test"}
        }));
        assert_eq!(find_best_url(&p), "https://files.test/x");

        assert_eq!(find_best_url(&Map::new()), "");
    }

    #[test]
    fn test_requirements() {
        let p = props(json!({
            "התנדבות נדרשת": {"type": "checkbox", "checkbox": true},
            "MilitaryServiceRequired": {"type": "select", "select": {"name": "אופציונלי"}}
        }));
        let req = extract_requirements(&p);
        assert_eq!(req.volunteering, Some(true));
        assert_eq!(req.military, Some(false));

        let unknown = props(json!({
            "RequiresVolunteering": {"type": "select", "select": {"name": "אולי"}}
        }));
        assert_eq!(extract_requirements(&unknown), Requirements::default());
    }
}
