use std::collections::BTreeSet;

use autosave_common::protocol::bridge::{
    EventParams, DocumentsListResult, ERROR_NO_PATH, ERROR_REJECTED, ERROR_UNKNOWN_DOCUMENT,
    EVENT_METHODS, REQUEST_METHODS,
};
use autosave_common::protocol::jsonrpc::{
    Notification, Request, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
};
use serde_json::json;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/bridge-methods.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

fn string_set<'a>(contract: &'a serde_json::Value, key: &str) -> BTreeSet<&'a str> {
    contract[key]
        .as_array()
        .unwrap_or_else(|| panic!("{key} should be an array"))
        .iter()
        .map(|v| v.as_str().expect("entry should be a string"))
        .collect()
}

#[test]
fn request_methods_match_contract() {
    let contract = load_contract();
    let actual: BTreeSet<&str> = REQUEST_METHODS.iter().copied().collect();
    assert_eq!(
        actual,
        string_set(&contract, "request_methods"),
        "REQUEST_METHODS diverged from contract"
    );
}

#[test]
fn event_methods_match_contract() {
    let contract = load_contract();
    let actual: BTreeSet<&str> = EVENT_METHODS.iter().copied().collect();
    assert_eq!(
        actual,
        string_set(&contract, "event_methods"),
        "EVENT_METHODS diverged from contract"
    );
}

#[test]
fn protocol_versions_match_contract() {
    let contract = load_contract();
    let expected: Vec<&str> = string_set(&contract, "protocol_versions").into_iter().collect();
    assert_eq!(SUPPORTED_PROTOCOL_VERSIONS, &expected[..]);
}

#[test]
fn error_codes_match_contract() {
    let codes = &load_contract()["error_codes"];
    assert_eq!(codes["no_path"], ERROR_NO_PATH);
    assert_eq!(codes["rejected"], ERROR_REJECTED);
    assert_eq!(codes["unknown_document"], ERROR_UNKNOWN_DOCUMENT);
}

#[test]
fn requests_and_events_use_line_framing_shape() {
    let request =
        Request::new("document.save", Some(json!({ "host_id": "7" })), RequestId::Number(9));
    let line = serde_json::to_string(&request).unwrap();
    assert!(!line.contains('\n'));
    let decoded: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(decoded["params"]["host_id"], "7");
    assert_eq!(decoded["id"], 9);

    let note: Notification = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "document.before_close",
        "params": {
            "document": { "host_id": "7", "name": "Report.docx", "path": "/d/Report.docx" }
        }
    }))
    .unwrap();
    let params: EventParams = serde_json::from_value(note.params.unwrap()).unwrap();
    assert_eq!(params.document.name, "Report.docx");
}

#[test]
fn documents_list_tolerates_extra_fields() {
    let result: DocumentsListResult = serde_json::from_value(json!({
        "documents": [{ "host_id": "1", "name": "a.docx", "path": "/d/a.docx", "readonly": false }],
        "count": 1
    }))
    .unwrap();
    assert_eq!(result.documents.len(), 1);
}
