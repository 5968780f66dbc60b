use crate::workflows::admission::scores::{
    parse_score_sheet, validate_stanine, write_score_template, ScoreImportError,
    SCORE_TEMPLATE_HEADERS,
};

#[test]
fn stanine_bounds_are_inclusive() {
    assert_eq!(validate_stanine(1), Ok(1));
    assert_eq!(validate_stanine(9), Ok(9));
    assert!(validate_stanine(0).is_err());
    assert!(validate_stanine(10).is_err());
    assert!(validate_stanine(-3).is_err());
}

#[test]
fn parses_the_canonical_template() {
    let sheet = "Control Number,First Name,Last Name,Stanine Score\n\
                 ADM-000001,Juan,Dela Cruz,5\n\
                 ADM-000002,Maria,Santos,9\n";
    let (rows, failures) = parse_score_sheet(sheet.as_bytes()).expect("parse");
    assert!(failures.is_empty());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].control_number, "ADM-000001");
    assert_eq!(rows[0].stanine, 5);
    assert_eq!(rows[0].line, 2);
    assert_eq!(rows[1].stanine, 9);
}

#[test]
fn header_matching_ignores_case_and_underscores() {
    let sheet = "control_number,STANINE_SCORE\nADM-000001,4\n";
    let (rows, failures) = parse_score_sheet(sheet.as_bytes()).expect("parse");
    assert!(failures.is_empty());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stanine, 4);
}

#[test]
fn missing_required_columns_abort_the_import() {
    let sheet = "First Name,Last Name\nJuan,Dela Cruz\n";
    assert!(matches!(
        parse_score_sheet(sheet.as_bytes()),
        Err(ScoreImportError::MissingColumns)
    ));
}

#[test]
fn bad_scores_become_row_failures_not_aborts() {
    let sheet = "Control Number,Stanine Score\n\
                 ADM-000001,5\n\
                 ADM-000002,11\n\
                 ADM-000003,high\n\
                 ADM-000004,3\n";
    let (rows, failures) = parse_score_sheet(sheet.as_bytes()).expect("parse");
    assert_eq!(rows.len(), 2);
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].line, 3);
    assert_eq!(failures[0].control_number, "ADM-000002");
    assert!(failures[0].reason.contains("11"));
    assert_eq!(failures[1].line, 4);
}

#[test]
fn blank_control_numbers_are_skipped_as_filler() {
    let sheet = "Control Number,Stanine Score\n\
                 ,\n\
                 ADM-000001,5\n\
                 ,\n";
    let (rows, failures) = parse_score_sheet(sheet.as_bytes()).expect("parse");
    assert!(failures.is_empty());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].line, 3);
}

#[test]
fn template_round_trips_through_the_parser() {
    let mut buffer = Vec::new();
    write_score_template(&mut buffer).expect("template");
    let text = String::from_utf8(buffer.clone()).expect("utf8");
    assert!(text.starts_with(&SCORE_TEMPLATE_HEADERS.join(",")));

    let (rows, failures) = parse_score_sheet(buffer.as_slice()).expect("parse");
    assert!(failures.is_empty());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].control_number, "ADM-000001");
}
