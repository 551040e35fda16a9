//! Decision report — the flat, ordered key/value output of a run.
//!
//! Keys keep their first insertion position; setting a key again replaces
//! the value in place, so the last decision wins without reordering the
//! report. `passed` is always present and maps to the process exit code.

use colored::Colorize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Report {
    fields: Vec<(String, Value)>,
}

impl Report {
    /// Start a report for one audited entity. `passed` starts false so an
    /// early abort still renders a complete report.
    pub fn new(audit: &str, entity: &str) -> Self {
        let mut report = Report { fields: Vec::new() };
        report.set("audit", audit);
        report.set("entity", entity);
        report.set("start_time", chrono::Utc::now().to_rfc3339());
        report.set("passed", false);
        report
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn set_passed(&mut self, passed: bool) {
        self.set("passed", passed);
    }

    pub fn passed(&self) -> bool {
        matches!(self.get("passed"), Some(Value::Bool(true)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// `key: value` pairs separated by blank lines, the shape downstream
    /// ticketing has always consumed.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Bool(true) if key == "passed" => "true".green().to_string(),
                Value::Bool(false) if key == "passed" => "false".red().to_string(),
                other => other.to_string(),
            };
            out.push_str(&format!("{key}: {rendered}\n\n"));
        }
        out
    }

    pub fn render_json(&self) -> String {
        let map: serde_json::Map<String, Value> =
            self.fields.iter().cloned().collect();
        // Map cannot fail to serialize.
        serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_default()
    }
}
