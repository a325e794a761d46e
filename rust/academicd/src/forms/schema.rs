use std::borrow::Cow;
use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::template::{FieldType, FormTemplate};
use super::value::{FieldValue, FormValues};

/// Validation rules synthesized from a template, one per declared key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub template_id: String,
    pub rules: Vec<FieldRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub key: String,
    pub label: String,
    pub required: bool,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuleKind {
    Text {
        min_len: Option<usize>,
        max_len: Option<usize>,
        email: bool,
    },
    /// Empty `options` accepts any value.
    Choice {
        options: Vec<String>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Bool,
    List,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub key: String,
    pub label: String,
    pub message: String,
}

/// Builds the schema for `template`. Never fails; unknown field types get an
/// unconstrained text rule.
pub fn compile(template: &FormTemplate) -> Schema {
    let mut seen = HashSet::new();
    let mut rules = Vec::new();
    for field in template.fields() {
        if !seen.insert(field.key.as_str()) {
            continue;
        }
        let kind = match field.field_type {
            FieldType::Text | FieldType::Textarea => RuleKind::Text {
                min_len: field.min_length,
                max_len: field.max_length,
                email: false,
            },
            FieldType::Email => RuleKind::Text {
                min_len: field.min_length,
                max_len: field.max_length,
                email: true,
            },
            FieldType::Select => RuleKind::Choice {
                options: field
                    .options
                    .iter()
                    .filter(|o| !o.value.is_empty())
                    .map(|o| o.value.clone())
                    .collect(),
            },
            FieldType::Number => RuleKind::Number {
                min: field.min,
                max: field.max,
            },
            FieldType::Checkbox => RuleKind::Bool,
            FieldType::Array => RuleKind::List,
            FieldType::Signature => RuleKind::Signature,
            FieldType::Other => RuleKind::Text {
                min_len: None,
                max_len: None,
                email: false,
            },
        };
        rules.push(FieldRule {
            key: field.key.clone(),
            label: field.display_label().to_string(),
            required: field.required,
            kind,
        });
    }
    Schema {
        template_id: template.id.clone(),
        rules,
    }
}

impl Schema {
    pub fn rule(&self, key: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.key == key)
    }

    /// Checks every rule; issues come back in template order.
    pub fn validate(&self, values: &FormValues) -> Result<(), Vec<ValidationIssue>> {
        let issues: Vec<ValidationIssue> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(values.get(&rule.key)))
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// SHA-256 of the canonical rule list. Equal for schemas compiled from
    /// equal templates.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.rules).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

impl FieldRule {
    /// `None` when the value passes. A missing value is checked as the
    /// type's default.
    pub fn check(&self, value: Option<&FieldValue>) -> Option<ValidationIssue> {
        let message = match &self.kind {
            RuleKind::Text {
                min_len,
                max_len,
                email,
            } => self.check_text(value, *min_len, *max_len, *email),
            RuleKind::Choice { options } => self.check_choice(value, options),
            RuleKind::Number { min, max } => self.check_number(value, *min, *max),
            RuleKind::Bool => match value {
                None | Some(FieldValue::Bool(_)) => None,
                Some(_) => Some(self.invalid()),
            },
            RuleKind::List => self.check_list(value),
            RuleKind::Signature => self.check_signature(value),
        }?;
        Some(ValidationIssue {
            key: self.key.clone(),
            label: self.label.clone(),
            message,
        })
    }

    fn invalid(&self) -> String {
        format!("{} has an invalid value", self.label)
    }

    fn required_msg(&self) -> String {
        format!("{} is required", self.label)
    }

    fn check_text(
        &self,
        value: Option<&FieldValue>,
        min_len: Option<usize>,
        max_len: Option<usize>,
        email: bool,
    ) -> Option<String> {
        let text = match value {
            None => Cow::Borrowed(""),
            Some(v) => match scalar_text(v) {
                Some(t) => t,
                None => return Some(self.invalid()),
            },
        };
        if text.trim().is_empty() {
            return self.required.then(|| self.required_msg());
        }
        let len = text.chars().count();
        if let Some(min) = min_len {
            if len < min {
                return Some(format!(
                    "{} must be at least {} characters",
                    self.label, min
                ));
            }
        }
        if let Some(max) = max_len {
            if len > max {
                return Some(format!(
                    "{} must be at most {} characters",
                    self.label, max
                ));
            }
        }
        if email && !looks_like_email(text.trim()) {
            return Some(format!("{} must be a valid email address", self.label));
        }
        None
    }

    fn check_choice(&self, value: Option<&FieldValue>, options: &[String]) -> Option<String> {
        let text = match value {
            None => Cow::Borrowed(""),
            Some(v) => match scalar_text(v) {
                Some(t) => t,
                None => return Some(self.invalid()),
            },
        };
        let text = text.trim();
        if text.is_empty() {
            return self.required.then(|| self.required_msg());
        }
        if !options.is_empty() && !options.iter().any(|o| o == text) {
            return Some(self.invalid());
        }
        None
    }

    fn check_number(
        &self,
        value: Option<&FieldValue>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Option<String> {
        let n = match value {
            None => None,
            Some(FieldValue::Number(n)) => Some(*n),
            Some(FieldValue::Text(s)) if s.trim().is_empty() => None,
            Some(FieldValue::Text(s)) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Some(n),
                _ => return Some(format!("{} must be a number", self.label)),
            },
            Some(_) => return Some(self.invalid()),
        };
        let Some(n) = n else {
            return self.required.then(|| self.required_msg());
        };
        if let Some(min) = min {
            if n < min {
                return Some(format!("{} must be at least {}", self.label, min));
            }
        }
        if let Some(max) = max {
            if n > max {
                return Some(format!("{} must be at most {}", self.label, max));
            }
        }
        None
    }

    fn check_list(&self, value: Option<&FieldValue>) -> Option<String> {
        let filled = match value {
            None => 0,
            Some(FieldValue::StringList(items)) => {
                items.iter().filter(|s| !s.trim().is_empty()).count()
            }
            // Already comma-joined for the wire.
            Some(FieldValue::Text(s)) => s.split(',').filter(|p| !p.trim().is_empty()).count(),
            Some(_) => return Some(self.invalid()),
        };
        if self.required && filled == 0 {
            return Some(format!("{} must contain at least one entry", self.label));
        }
        None
    }

    fn check_signature(&self, value: Option<&FieldValue>) -> Option<String> {
        let name = match value {
            None => "",
            Some(FieldValue::Signature(sig)) => sig.name.as_str(),
            Some(FieldValue::Text(s)) => s.as_str(),
            Some(_) => return Some(self.invalid()),
        };
        if self.required && name.trim().is_empty() {
            return Some(format!("{} signer name is required", self.label));
        }
        None
    }
}

fn scalar_text(value: &FieldValue) -> Option<Cow<'_, str>> {
    match value {
        FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
        FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.contains(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::value::SignatureValue;
    use serde_json::json;

    fn template(fields: serde_json::Value) -> FormTemplate {
        serde_json::from_value(json!({
            "id": "tpl",
            "title": "t",
            "sections": [{ "id": "s", "fields": fields }]
        }))
        .expect("template json")
    }

    fn values(v: serde_json::Value) -> FormValues {
        FormValues::from_json(&v).expect("values json")
    }

    fn messages(schema: &Schema, v: serde_json::Value) -> Vec<String> {
        match schema.validate(&values(v)) {
            Ok(()) => Vec::new(),
            Err(issues) => issues.into_iter().map(|i| i.message).collect(),
        }
    }

    #[test]
    fn every_declared_field_gets_a_rule() {
        let t = template(json!([
            { "key": "a", "label": "A", "type": "text" },
            { "key": "b", "label": "B", "type": "number" },
            { "key": "c", "label": "C", "type": "checkbox" },
            { "key": "d", "label": "D", "type": "array" },
            { "key": "e", "label": "E", "type": "signature" },
            { "key": "f", "label": "F", "type": "colorpicker" }
        ]));
        let schema = compile(&t);
        for field in t.fields() {
            assert!(schema.rule(&field.key).is_some(), "missing rule {}", field.key);
        }
        assert_eq!(
            schema.rule("f").map(|r| &r.kind),
            Some(&RuleKind::Text {
                min_len: None,
                max_len: None,
                email: false
            })
        );
    }

    #[test]
    fn recompiling_is_equivalent() {
        let t = template(json!([
            { "key": "name", "label": "Name", "type": "text", "required": true, "maxLength": 5 },
            { "key": "score", "label": "Score", "type": "number", "min": 0, "max": 10 }
        ]));
        let a = compile(&t);
        let b = compile(&t);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        for sample in [
            json!({ "name": "Al", "score": 3 }),
            json!({ "name": "Alice", "score": "11" }),
            json!({}),
        ] {
            assert_eq!(
                a.validate(&values(sample.clone())).is_ok(),
                b.validate(&values(sample)).is_ok()
            );
        }
    }

    #[test]
    fn text_length_messages_reference_label() {
        let t = template(json!([
            { "key": "name", "label": "name", "type": "text", "required": true, "maxLength": 5 }
        ]));
        let schema = compile(&t);
        assert_eq!(
            messages(&schema, json!({ "name": "Alice!" })),
            vec!["name must be at most 5 characters"]
        );
        assert!(messages(&schema, json!({ "name": "Al" })).is_empty());
        assert_eq!(messages(&schema, json!({})), vec!["name is required"]);
    }

    #[test]
    fn number_fields_coerce_text_and_check_bounds() {
        let t = template(json!([
            { "key": "gpa", "label": "GPA", "type": "number", "required": true, "min": 0, "max": 4 }
        ]));
        let schema = compile(&t);
        assert!(messages(&schema, json!({ "gpa": "3.5" })).is_empty());
        assert_eq!(messages(&schema, json!({ "gpa": "abc" })), vec!["GPA must be a number"]);
        assert_eq!(messages(&schema, json!({ "gpa": 4.5 })), vec!["GPA must be at most 4"]);
        assert_eq!(messages(&schema, json!({ "gpa": -1 })), vec!["GPA must be at least 0"]);
        assert_eq!(messages(&schema, json!({ "gpa": "" })), vec!["GPA is required"]);
    }

    #[test]
    fn required_array_needs_one_non_blank_entry() {
        let t = template(json!([
            { "key": "debt.subjects", "label": "Subjects", "type": "array", "required": true }
        ]));
        let schema = compile(&t);
        assert_eq!(
            messages(&schema, json!({ "debt.subjects": [] })),
            vec!["Subjects must contain at least one entry"]
        );
        assert_eq!(
            messages(&schema, json!({ "debt.subjects": [""] })),
            vec!["Subjects must contain at least one entry"]
        );
        assert!(messages(&schema, json!({ "debt.subjects": ["a"] })).is_empty());
        assert!(messages(&schema, json!({ "debt.subjects": ["", "a"] })).is_empty());
        assert!(messages(&schema, json!({ "debt.subjects": ["Math", "", "Physics"] })).is_empty());
    }

    #[test]
    fn signature_name_follows_required_and_image_is_optional() {
        let t = template(json!([
            { "key": "sig", "label": "Signature", "type": "signature", "required": true }
        ]));
        let schema = compile(&t);
        assert_eq!(
            messages(&schema, json!({})),
            vec!["Signature signer name is required"]
        );
        let mut v = FormValues::new();
        v.insert(
            "sig",
            FieldValue::Signature(SignatureValue {
                name: "Lan".into(),
                image: None,
            }),
        );
        assert!(schema.validate(&v).is_ok());
        assert!(messages(&schema, json!({ "sig": "Lan" })).is_empty());
    }

    #[test]
    fn select_rejects_blank_and_undeclared_values() {
        let t = template(json!([
            { "key": "faculty", "label": "Faculty", "type": "select", "required": true,
              "options": [
                  { "value": "", "label": "Choose" },
                  { "value": "it", "label": "Information Technology" },
                  { "value": "med", "label": "Medicine" }
              ] },
            { "key": "term", "label": "Term", "type": "select",
              "options": [{ "value": "1", "label": "Term 1" }] }
        ]));
        let schema = compile(&t);
        assert_eq!(
            schema.rule("faculty").map(|r| &r.kind),
            Some(&RuleKind::Choice {
                options: vec!["it".into(), "med".into()]
            })
        );
        assert_eq!(
            messages(&schema, json!({ "faculty": "   " })),
            vec!["Faculty is required"]
        );
        assert_eq!(
            messages(&schema, json!({ "faculty": "law", "term": "9" })),
            vec!["Faculty has an invalid value", "Term has an invalid value"]
        );
        assert!(messages(&schema, json!({ "faculty": "it", "term": "" })).is_empty());
        assert!(messages(&schema, json!({ "faculty": "med", "term": 1 })).is_empty());
    }

    #[test]
    fn select_without_options_accepts_any_text() {
        let t = template(json!([
            { "key": "room", "label": "Room", "type": "select" }
        ]));
        let schema = compile(&t);
        assert!(messages(&schema, json!({ "room": "B.204" })).is_empty());
        assert!(messages(&schema, json!({ "room": " " })).is_empty());
    }

    #[test]
    fn email_and_checkbox_rules() {
        let t = template(json!([
            { "key": "mail", "label": "Email", "type": "email" },
            { "key": "agree", "label": "Agree", "type": "checkbox", "required": true }
        ]));
        let schema = compile(&t);
        assert!(messages(&schema, json!({ "mail": "", "agree": false })).is_empty());
        assert!(messages(&schema, json!({ "mail": "sv@hcmus.edu.vn" })).is_empty());
        assert_eq!(
            messages(&schema, json!({ "mail": "not-an-email", "agree": "yes" })),
            vec!["Email must be a valid email address", "Agree has an invalid value"]
        );
    }
}
