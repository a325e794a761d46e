use super::template::{FieldType, FormTemplate};
use super::value::{FieldValue, FormValues, SignatureValue};

/// Separator for array fields on the wire. Items containing it are not
/// escaped, so such an item splits into several on the way back.
pub const LIST_SEPARATOR: &str = ",";

/// Converts in-memory values into the payload the backend expects.
///
/// Total over the template's declared fields: every declared key is present
/// in the output, keys the template does not declare are dropped.
pub fn serialize(template: &FormTemplate, values: &FormValues) -> FormValues {
    let mut out = FormValues::new();
    for field in template.fields() {
        if out.contains_key(&field.key) {
            continue;
        }
        let value = match (field.field_type, values.get(&field.key)) {
            (FieldType::Signature, Some(FieldValue::Text(name))) => {
                FieldValue::Signature(SignatureValue {
                    name: name.clone(),
                    image: None,
                })
            }
            (FieldType::Array, Some(FieldValue::StringList(items))) => {
                FieldValue::Text(items.join(LIST_SEPARATOR))
            }
            (FieldType::Array, None) => FieldValue::Text(String::new()),
            (_, Some(v)) => v.clone(),
            (t, None) => FieldValue::default_for(t),
        };
        out.insert(field.key.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> FormTemplate {
        serde_json::from_value(json!({
            "id": "tpl",
            "title": "Academic standing",
            "sections": [
                { "id": "s1", "fields": [
                    { "key": "studentName", "label": "Student", "type": "text", "required": true },
                    { "key": "subjects", "label": "Subjects", "type": "array" },
                    { "key": "agree", "label": "Agree", "type": "checkbox" }
                ]},
                { "id": "s2", "fields": [
                    { "key": "applicantSignature", "label": "Applicant", "type": "signature" }
                ]}
            ]
        }))
        .expect("template")
    }

    #[test]
    fn output_covers_every_declared_key() {
        let out = serialize(&template(), &FormValues::new());
        assert_eq!(
            serde_json::to_value(&out).expect("json"),
            json!({
                "studentName": "",
                "subjects": "",
                "agree": false,
                "applicantSignature": { "name": "", "image": null }
            })
        );
    }

    #[test]
    fn arrays_are_comma_joined_and_undeclared_keys_dropped() {
        let values = FormValues::from_json(&json!({
            "subjects": ["Math", "Physics"],
            "stray": "x"
        }))
        .expect("values");
        let out = serialize(&template(), &values);
        assert_eq!(out.get("subjects"), Some(&FieldValue::Text("Math,Physics".into())));
        assert!(!out.contains_key("stray"));
    }

    #[test]
    fn signature_promotion_is_idempotent() {
        let t = template();
        let bare = FormValues::from_json(&json!({ "applicantSignature": "Nguyen Van A" }))
            .expect("values");
        let once = serialize(&t, &bare);
        assert_eq!(
            once.get("applicantSignature"),
            Some(&FieldValue::Signature(SignatureValue {
                name: "Nguyen Van A".into(),
                image: None
            }))
        );
        assert_eq!(serialize(&t, &once), once);

        let shaped = FormValues::from_json(&json!({
            "applicantSignature": { "name": "B", "image": "data:image/png;base64,AAAA" },
            "subjects": ["x"]
        }))
        .expect("values");
        let out = serialize(&t, &shaped);
        assert_eq!(out.get("applicantSignature"), shaped.get("applicantSignature"));
        assert_eq!(serialize(&t, &out), out);
    }

    #[test]
    fn embedded_commas_are_not_escaped() {
        let values = FormValues::from_json(&json!({ "subjects": ["Math, advanced", "Art"] }))
            .expect("values");
        let out = serialize(&template(), &values);
        assert_eq!(
            out.get("subjects"),
            Some(&FieldValue::Text("Math, advanced,Art".into()))
        );
    }
}
