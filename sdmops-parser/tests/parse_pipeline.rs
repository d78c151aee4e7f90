//! End-to-end pipeline tests over synthetic positioned-token documents.
//!
//! Fixtures model the interesting page shapes: the legacy six-column layout,
//! the merged VEX layout, multi-page continuation, and pages that must fail.

use serde_json::json;

use sdmops_parser::sdm::error::RunError;
use sdmops_parser::sdm::pipeline::{parse_document, ParseOptions};
use sdmops_parser::sdm::token::SdmDocument;

fn tok(text: &str, top: f64, left: f64) -> serde_json::Value {
    json!({ "text": text, "top": top, "left": left })
}

fn legacy_header_tokens() -> Vec<serde_json::Value> {
    vec![
        tok("Opcode", 133.0, 72.0),
        tok("Instruction", 133.0, 140.0),
        tok("Op/", 133.0, 217.0),
        tok("En", 145.0, 217.0),
        tok("64-bit", 133.0, 260.0),
        tok("Mode", 145.0, 260.0),
        tok("Compat/", 133.0, 320.0),
        tok("Leg Mode", 145.0, 320.0),
        tok("Description", 133.0, 390.0),
    ]
}

/// A legacy-layout page holding a single one-row record.
fn legacy_page(
    page: u32,
    title: &str,
    opcode: &str,
    instr: &str,
    op_en: &str,
    valid_64: &str,
    valid_compat: &str,
    description: &str,
) -> serde_json::Value {
    let mut tokens = vec![
        tok("INSTRUCTION SET REFERENCE, A-L", 90.0, 72.0),
        tok(title, 110.0, 72.0),
    ];
    tokens.extend(legacy_header_tokens());
    tokens.extend([
        tok(opcode, 170.0, 72.0),
        tok(instr, 170.0, 140.0),
        tok(op_en, 170.0, 217.0),
        tok(valid_64, 170.0, 260.0),
        tok(valid_compat, 170.0, 320.0),
        tok(description, 170.0, 390.0),
        tok("Instruction Operand Encoding", 300.0, 72.0),
        tok("3-42", 760.0, 72.0),
    ]);
    json!({ "page": page, "tokens": tokens, "anchors": [] })
}

fn adcx_page() -> serde_json::Value {
    let tokens = vec![
        tok("INSTRUCTION SET REFERENCE, A-L", 90.0, 72.0),
        tok("ADCX — Unsigned Integer Addition", 110.0, 72.0),
        tok("Opcode/", 133.0, 72.0),
        tok("Instruction", 145.0, 72.0),
        tok("Op/", 133.0, 190.0),
        tok("En", 145.0, 190.0),
        tok("64/32 bit", 133.0, 230.0),
        tok("Mode Support", 145.0, 230.0),
        tok("CPUID", 133.0, 305.0),
        tok("Feature Flag", 145.0, 305.0),
        tok("Description", 133.0, 380.0),
        tok("66 0F 38 F6 /r", 170.0, 72.0),
        tok("ADCX r32, r/m32", 182.0, 72.0),
        tok("RM", 176.0, 190.0),
        tok("V/V", 176.0, 230.0),
        tok("ADX", 176.0, 305.0),
        tok("Unsigned addition of r32 with CF, r/m32 to r32,", 176.0, 380.0),
        tok("writes CF.", 188.0, 380.0),
        tok("66 REX.w 0F 38 F6 /r", 210.0, 72.0),
        tok("ADCX r64, r/m64", 222.0, 72.0),
        tok("RM", 216.0, 190.0),
        tok("V/NE", 216.0, 230.0),
        tok("ADX", 216.0, 305.0),
        tok("Unsigned addition of r64 with CF.", 216.0, 380.0),
        tok("Instruction Operand Encoding", 320.0, 72.0),
    ];
    json!({ "page": 131, "tokens": tokens, "anchors": [] })
}

/// Header vocabulary in an order no registered schema uses.
fn unknown_schema_page(page: u32) -> serde_json::Value {
    let tokens = vec![
        tok("BADOP — Not A Real Layout", 110.0, 72.0),
        tok("Opcode", 133.0, 72.0),
        tok("Description", 133.0, 200.0),
        tok("37", 170.0, 72.0),
        tok("whatever.", 170.0, 200.0),
    ];
    json!({ "page": page, "tokens": tokens, "anchors": [] })
}

fn front_matter(anchors: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "page": 5, "tokens": [], "anchors": anchors })
}

fn doc(pages: Vec<serde_json::Value>) -> SdmDocument {
    SdmDocument::from_json_str(
        &json!({ "source_file": "sdm.xml", "pages": pages }).to_string(),
    )
    .unwrap()
}

fn standard_doc() -> SdmDocument {
    doc(vec![
        front_matter(vec![
            json!({ "text": "AAA—ASCII Adjust AL After Addition", "target_page": 120 }),
            json!({ "text": "ADCX — Unsigned Integer Addition", "target_page": 131 }),
            json!({ "text": "BADOP — Not A Real Layout", "target_page": 140 }),
        ]),
        legacy_page(
            120,
            "AAA—ASCII Adjust AL After Addition",
            "37",
            "AAA",
            "ZO",
            "Invalid",
            "Valid",
            "ASCII adjust AL after addition.",
        ),
        adcx_page(),
        unknown_schema_page(140),
    ])
}

#[test]
fn test_full_run_aggregates_in_index_order() {
    let outcome = parse_document(&standard_doc(), &ParseOptions::default()).unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.records[0].instr, "AAA");
    assert_eq!(outcome.records[1].instr, "ADCX r32, r/m32");
    assert_eq!(outcome.records[2].instr, "ADCX r64, r/m64");

    assert_eq!(outcome.report.parsed_groups, 2);
    assert_eq!(outcome.report.failed_groups, 1);
}

#[test]
fn test_legacy_record_fields() {
    let outcome = parse_document(&standard_doc(), &ParseOptions::default()).unwrap();
    let record = &outcome.records[0];
    assert_eq!(record.opcode, "37");
    assert_eq!(record.opcode_parsed, ["37"]);
    assert_eq!(record.op_en.as_deref(), Some("ZO"));
    assert_eq!(record.valid_in_64bit_mode, Some(false));
    assert_eq!(record.valid_in_compatibility_mode, Some(true));
    assert_eq!(record.description, "ASCII adjust AL after addition.");
    assert_eq!(record.page, 120);
}

#[test]
fn test_vex_record_fields_and_wrapped_description() {
    let outcome = parse_document(&standard_doc(), &ParseOptions::default()).unwrap();
    let record = &outcome.records[1];
    assert_eq!(record.opcode, "66 0F 38 F6 /r");
    assert_eq!(record.opcode_parsed, ["66", "0F", "38", "F6", "/r"]);
    assert_eq!(record.instr_parsed, ["ADCX", "r32", "r/m32"]);
    assert_eq!(record.cpuid_feature_flag.as_deref(), Some("ADX"));
    assert_eq!(record.valid_in_legacy_mode, None);
    assert_eq!(
        record.description,
        "Unsigned addition of r32 with CF, r/m32 to r32, writes CF."
    );
}

#[test]
fn test_unknown_schema_recorded_and_run_continues() {
    let outcome = parse_document(&standard_doc(), &ParseOptions::default()).unwrap();
    let reason = &outcome.failures["BADOP"];
    assert!(
        reason.contains("unknown header schema"),
        "unexpected reason: {}",
        reason
    );
}

#[test]
fn test_allow_list_restricts_processing() {
    let options = ParseOptions {
        allow_list: Some(vec!["ADCX".to_string()]),
    };
    let outcome = parse_document(&standard_doc(), &options).unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records.iter().all(|r| r.instr.starts_with("ADCX")));
}

#[test]
fn test_uncovered_mnemonic_is_fatal() {
    let options = ParseOptions {
        allow_list: Some(vec!["AAA".to_string(), "NOPE".to_string()]),
    };
    let err = parse_document(&standard_doc(), &options).unwrap_err();
    assert_eq!(
        err,
        RunError::Coverage {
            missing: vec!["NOPE".to_string()]
        }
    );
}

#[test]
fn test_requested_but_failing_group_is_uncovered() {
    let options = ParseOptions {
        allow_list: Some(vec!["BADOP".to_string()]),
    };
    let err = parse_document(&standard_doc(), &options).unwrap_err();
    assert!(matches!(err, RunError::Coverage { .. }));
}

#[test]
fn test_empty_index_is_fatal() {
    let empty = doc(vec![front_matter(vec![])]);
    assert_eq!(
        parse_document(&empty, &ParseOptions::default()).unwrap_err(),
        RunError::EmptyIndex
    );
}

#[test]
fn test_nothing_parsed_is_fatal() {
    let failing = doc(vec![
        front_matter(vec![json!({
            "text": "BADOP — Not A Real Layout",
            "target_page": 140
        })]),
        unknown_schema_page(140),
    ]);
    assert_eq!(
        parse_document(&failing, &ParseOptions::default()).unwrap_err(),
        RunError::NothingParsed
    );
}

#[test]
fn test_missing_start_page_is_recorded_per_group() {
    let incomplete = doc(vec![
        front_matter(vec![
            json!({ "text": "AAA—ASCII Adjust AL After Addition", "target_page": 120 }),
            json!({ "text": "GHOST—Points Nowhere", "target_page": 125 }),
        ]),
        legacy_page(
            120,
            "AAA—ASCII Adjust AL After Addition",
            "37",
            "AAA",
            "ZO",
            "Invalid",
            "Valid",
            "ASCII adjust AL after addition.",
        ),
    ]);
    let outcome = parse_document(&incomplete, &ParseOptions::default()).unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.failures["GHOST"].contains("page not found"));
}

#[test]
fn test_continuation_across_pages_with_same_schema() {
    let mut second = legacy_page(
        201,
        "",
        "04",
        "ADD AL, imm8",
        "I",
        "Valid",
        "Valid",
        "Add imm8 to AL.",
    );
    // Continuation pages carry only the chapter strip in their banner.
    second["tokens"]
        .as_array_mut()
        .unwrap()
        .retain(|t| t["text"] != "");
    let d = doc(vec![
        front_matter(vec![json!({ "text": "ADD—Add", "target_page": 200 })]),
        legacy_page(
            200,
            "ADD—Add",
            "00 /r",
            "ADD r/m8, r8",
            "MR",
            "Valid",
            "Valid",
            "Add r8 to r/m8.",
        ),
        second,
        // A fresh section on the next page must stop the continuation.
        legacy_page(
            202,
            "AND—Logical AND",
            "20 /r",
            "AND r/m8, r8",
            "MR",
            "Valid",
            "Valid",
            "AND r8 with r/m8.",
        ),
    ]);
    let outcome = parse_document(&d, &ParseOptions::default()).unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].opcode, "00 /r");
    assert_eq!(outcome.records[1].opcode, "04");
    assert_eq!(outcome.records[1].page, 201);
}

#[test]
fn test_determinism_and_input_order_independence() {
    // Shuffle every page's token list; the outcome must be identical.
    let baseline = parse_document(&standard_doc(), &ParseOptions::default()).unwrap();

    let mut scrambled_json = json!({
        "source_file": "sdm.xml",
        "pages": [
            front_matter(vec![
                json!({ "text": "AAA—ASCII Adjust AL After Addition", "target_page": 120 }),
                json!({ "text": "ADCX — Unsigned Integer Addition", "target_page": 131 }),
                json!({ "text": "BADOP — Not A Real Layout", "target_page": 140 }),
            ]),
            legacy_page(
                120,
                "AAA—ASCII Adjust AL After Addition",
                "37",
                "AAA",
                "ZO",
                "Invalid",
                "Valid",
                "ASCII adjust AL after addition.",
            ),
            adcx_page(),
            unknown_schema_page(140),
        ]
    });
    for page in scrambled_json["pages"].as_array_mut().unwrap() {
        let tokens = page["tokens"].as_array_mut().unwrap();
        tokens.reverse();
    }
    let scrambled =
        SdmDocument::from_json_str(&scrambled_json.to_string()).unwrap();
    let outcome = parse_document(&scrambled, &ParseOptions::default()).unwrap();

    assert_eq!(outcome.records, baseline.records);
    assert_eq!(outcome.failures, baseline.failures);
}
