//! Record browser: filters, search, sort and delete on the SQLite fixture.

mod common;

use common::{DOG_COUNT, kennel, scalar};
use kennel_db::browser::{AddForm, RecordBrowser};
use kennel_db::error::DbError;
use kennel_db::filter::FilterSet;
use kennel_db::models::{SortDirection, cell_text};
use serde_json::json;

fn owners(browser: &RecordBrowser) -> Vec<String> {
    let view = browser.view().unwrap();
    let idx = common::column_index(&view.result, "owner").unwrap();
    view.result.rows.iter().map(|r| cell_text(&r[idx])).collect()
}

#[tokio::test]
async fn test_open_shows_all_rows() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    let view = browser.open(&k.session, "dogs").await.unwrap();
    assert_eq!(view.table, "Dogs");
    assert_eq!(view.result.row_count(), DOG_COUNT);
    assert_eq!(view.status(), format!("Table: Dogs. Records: {}", DOG_COUNT));
    assert_eq!(view.result.columns[0], "id_dog");

    let err = browser.open(&k.session, "Cats").await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_filters_are_conjunctive_and_typed() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Dogs").await.unwrap();

    let filters = FilterSet::new().with("gender", "F").with("alive", "true");
    let view = browser.apply_filters(&k.session, filters).await.unwrap();
    assert_eq!(view.result.row_count(), 3);

    let filters = FilterSet::new().with("id_breed", "2");
    let view = browser.apply_filters(&k.session, filters).await.unwrap();
    assert_eq!(view.result.row_count(), 3);

    // Substring, case-insensitive
    let filters = FilterSet::new().with("owner", "OV");
    browser.apply_filters(&k.session, filters).await.unwrap();
    assert_eq!(
        owners(&browser),
        vec!["Ivanov", "Petrova", "Sidorov", "Kuznetsov", "Smirnova", "Orlov"]
    );

    let filters = FilterSet::new().with("birthday", "2019");
    let err = browser.apply_filters(&k.session, filters).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_invalid_filter_keeps_previous_state() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Dogs").await.unwrap();
    browser
        .apply_filters(&k.session, FilterSet::new().with("gender", "M"))
        .await
        .unwrap();

    for bad in [
        FilterSet::new().with("alive", "maybe"),
        FilterSet::new().with("assesment", "five"),
        FilterSet::new().with("colour", "red"),
    ] {
        let err = browser.apply_filters(&k.session, bad).await.unwrap_err();
        assert!(err.is_validation());
    }
    assert_eq!(browser.filters().get("gender"), Some("M"));

    let view = browser.load(&k.session).await.unwrap();
    assert_eq!(view.result.row_count(), 3);
}

#[tokio::test]
async fn test_filter_dialog_hints() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Dogs").await.unwrap();
    browser
        .apply_filters(&k.session, FilterSet::new().with("owner", "iv"))
        .await
        .unwrap();

    let fields = browser.filter_fields(&k.session).await.unwrap();
    let alive = fields.iter().find(|f| f.column == "alive").unwrap();
    assert_eq!(alive.choices, vec!["", "TRUE", "FALSE"]);
    let gender = fields.iter().find(|f| f.column == "gender").unwrap();
    assert_eq!(gender.choices, vec!["", "M", "F"]);
    let owner = fields.iter().find(|f| f.column == "owner").unwrap();
    assert!(owner.choices.is_empty());
    assert_eq!(owner.current, "iv");
}

#[tokio::test]
async fn test_sort_toggle_and_reset() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Dogs").await.unwrap();

    browser.sort_by(&k.session, "owner").await.unwrap();
    let asc = owners(&browser);
    assert_eq!(asc.first().map(String::as_str), Some("Ivanov"));

    browser.sort_by(&k.session, "OWNER").await.unwrap();
    assert_eq!(browser.sort().direction(), SortDirection::Descending);
    let desc = owners(&browser);
    assert_eq!(desc, asc.iter().rev().cloned().collect::<Vec<_>>());

    browser.sort_by(&k.session, "owner").await.unwrap();
    assert_eq!(owners(&browser), asc);

    let err = browser.sort_by(&k.session, "owner; DROP TABLE Dogs").await.unwrap_err();
    assert!(err.is_validation());

    browser
        .apply_filters(&k.session, FilterSet::new().with("gender", "F"))
        .await
        .unwrap();
    let view = browser.reset(&k.session).await.unwrap();
    assert_eq!(view.result.row_count(), DOG_COUNT);
    assert!(browser.filters().is_empty());
    assert_eq!(browser.sort().column(), None);
}

#[tokio::test]
async fn test_search_is_one_shot() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Dogs").await.unwrap();
    browser
        .apply_filters(&k.session, FilterSet::new().with("alive", "TRUE"))
        .await
        .unwrap();

    let view = browser.search(&k.session, "OVA").await.unwrap();
    assert_eq!(view.search.as_deref(), Some("OVA"));
    assert_eq!(owners(&browser), vec!["Petrova", "Smirnova"]);
    assert_eq!(browser.filters().get("alive"), Some("TRUE"));

    // Empty search goes back to the filtered table
    let view = browser.search(&k.session, "  ").await.unwrap();
    assert!(view.search.is_none());
    assert_eq!(view.result.row_count(), 5);

    browser.open(&k.session, "Parents").await.unwrap();
    let err = browser.search(&k.session, "x").await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_delete_by_first_column() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Medicine_book").await.unwrap();

    let result = browser.delete(&k.session, 0).await.unwrap();
    assert_eq!(result.rows_affected, 1);

    // The grid is stale until reloaded; the same row is gone now
    let err = browser.delete(&k.session, 0).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let view = browser.load(&k.session).await.unwrap();
    assert_eq!(view.result.row_count(), 1);
    assert_eq!(view.result.rows[0][0], json!(2));

    assert!(browser.delete(&k.session, 10).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_delete_referenced_row_rolls_back() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    browser.open(&k.session, "Breeds").await.unwrap();

    let err = browser.delete(&k.session, 0).await.unwrap_err();
    assert!(matches!(err, DbError::Database { .. }), "{err:?}");
    assert_eq!(scalar(&k.session, "SELECT COUNT(*) FROM Breeds").await, 2);
}

#[tokio::test]
async fn test_add_form_by_table() {
    let k = kennel().await;
    let mut browser = RecordBrowser::new();
    assert!(browser.add_form(&k.session).await.unwrap_err().is_validation());

    browser.open(&k.session, "Dogs").await.unwrap();
    assert!(matches!(
        browser.add_form(&k.session).await.unwrap(),
        AddForm::Dog(_)
    ));

    browser.open(&k.session, "Breeds").await.unwrap();
    match browser.add_form(&k.session).await.unwrap() {
        AddForm::Table(form) => {
            assert_eq!(form.table, "Breeds");
            assert!(form.field("id_breed").is_none());
        }
        AddForm::Dog(_) => panic!("Breeds got the dog form"),
    }
}
