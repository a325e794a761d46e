#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nothing listens here, so every backend call fails fast as unreachable.
pub const UNREACHABLE_API: &str = "http://127.0.0.1:9";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_api(UNREACHABLE_API)
}

pub fn spawn_sidecar_with_api(api_base: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_academicd");
    let mut child = Command::new(exe)
        .env("ACADEMICD_API_BASE", api_base)
        .env("ACADEMICD_API_TIMEOUT_SECS", "5")
        .env_remove("ACADEMICD_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn academicd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

/// Returns the `error` object after checking its code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
    code: &str,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    let error = value.get("error").cloned().unwrap_or(Value::Null);
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some(code),
        "{} error: {}",
        method,
        error
    );
    error
}

/// Leave-of-absence request used across the tests.
pub fn leave_template() -> Value {
    json!({
        "_id": "tpl-leave",
        "title": "Leave of absence",
        "sections": [
            {
                "id": "s1",
                "title": "Student",
                "fields": [
                    { "key": "fullName", "label": "Full name", "type": "text", "required": true, "maxLength": 5 },
                    { "key": "email", "label": "Email", "type": "email", "required": true },
                    { "key": "credits", "label": "Credits", "type": "number", "min": 0, "max": 30 },
                    { "key": "faculty", "label": "Faculty", "type": "select", "required": true,
                      "options": [
                          { "label": "Choose", "value": "" },
                          { "label": "Engineering", "value": "eng" },
                          { "label": "Law", "value": "law" }
                      ] }
                ]
            },
            {
                "id": "s2",
                "title": "Details",
                "fields": [
                    { "key": "reason", "label": "Reason", "type": "textarea" },
                    { "key": "agree", "label": "I agree", "type": "checkbox", "required": true },
                    { "key": "P.term", "label": "Term", "type": "text" },
                    { "key": "P.subjects", "label": "Subjects", "type": "array", "required": true },
                    { "key": "studentSignature", "label": "Signature", "type": "signature", "required": true }
                ]
            }
        ]
    })
}

pub fn valid_values() -> Value {
    json!({
        "fullName": "Bao",
        "email": "bao@uni.edu",
        "credits": 12,
        "faculty": "eng",
        "reason": "family",
        "agree": true,
        "P.term": "HK1",
        "P.subjects": ["Math", "", "Physics"],
        "studentSignature": { "name": "Bao" }
    })
}

/// A 1x1 PNG as a data URL.
pub fn signature_data_url() -> String {
    "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==".to_string()
}
