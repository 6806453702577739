use roster_adapters::{MemorySheetSource, SpreadsheetSource};
use roster_core::SCHEMA_V3;

fn sample_workbook() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sheets/sample.json")
}

#[tokio::test]
async fn sample_workbook_matches_current_schema() {
    let source = MemorySheetSource::from_fixture_file(sample_workbook()).expect("fixture");

    let rows_2020 = source.fetch_rows("2020").await.expect("2020");
    let records = SCHEMA_V3.map_rows("2020", &rows_2020).expect("2020 header");
    assert_eq!(records.len(), 4);
    assert_eq!(records.iter().filter(|r| !r.is_processed()).count(), 3);
    assert_eq!(records[2].summer_plans().map(|s| s.plans), None);
    assert_eq!(records[2].text("rawSummerOrg"), "JPL");

    let rows_2021 = source.fetch_rows("2021").await.expect("2021");
    let records = SCHEMA_V3.map_rows("2021", &rows_2021).expect("2021 header");
    assert_eq!(records.len(), 1);
    assert!(records[0].is_processed());
}
