//! Export to a file format and import it back.

use std::sync::Arc;

use serde_json::json;

use backoffice_core::{AdminContext, MemoryRepository, Record};
use backoffice_translation::exchange::{
    compute_source_hash, ApplyOptions, ExchangeCodec, ExchangeFormat, ExchangeRow, ExchangeService,
    ExportFilter, RowStatus,
};
use backoffice_translation::jobs::MemoryJobStore;

async fn seeded() -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new("pages");
    repo.seed([
        Record::try_from(json!({
            "id": "page_1", "locale": "en", "translation_group_id": "tg_1",
            "title": "Home", "path": "/", "data": {"summary": "Start here"}
        }))
        .unwrap(),
        Record::try_from(json!({
            "id": "page_2", "locale": "es", "translation_group_id": "tg_1",
            "title": "Inicio", "path": "/es", "data": {"summary": "Empieza aqui"}
        }))
        .unwrap(),
    ])
    .await;
    Arc::new(repo)
}

fn service(repo: Arc<MemoryRepository>) -> ExchangeService {
    ExchangeService::new(Arc::new(MemoryJobStore::new())).with_repository("pages", repo)
}

#[tokio::test]
async fn test_csv_export_reapplies_as_noop() {
    let repo = seeded().await;
    let svc = service(repo.clone());
    let ctx = AdminContext::new("translator");
    let filter = ExportFilter {
        resources: vec!["pages".into()],
        source_locale: "en".into(),
        include_source_hash: true,
        ..ExportFilter::default()
    };

    let exported = svc.export(&ctx, &filter, ExchangeFormat::Csv).await.unwrap();
    let csv = ExchangeCodec::encode(ExchangeFormat::Csv, &exported.rows).unwrap();
    let rows = ExchangeCodec::decode(ExchangeFormat::Csv, &csv).unwrap();
    assert_eq!(rows.len(), exported.row_count);

    let before = repo.snapshot().await;
    let result = svc.apply(&ctx, &rows, ApplyOptions::default()).await.unwrap();
    assert_eq!(result.summary.succeeded, rows.len());
    assert_eq!(result.summary.failed, 0);
    assert_eq!(repo.snapshot().await, before);
}

#[tokio::test]
async fn test_stale_source_hash_is_a_conflict() {
    let svc = service(seeded().await);
    let ctx = AdminContext::new("translator");
    let rows = vec![ExchangeRow {
        resource: "pages".into(),
        entity_id: "page_1".into(),
        source_locale: "en".into(),
        target_locale: "es".into(),
        field_path: "title".into(),
        translated_text: "Portada".into(),
        source_hash: "OLD".into(),
        ..ExchangeRow::default()
    }];

    let result = svc.apply(&ctx, &rows, ApplyOptions::default()).await.unwrap();

    let row = &result.results[0];
    assert_eq!(row.status, RowStatus::Conflict);
    let conflict = row.conflict.as_ref().unwrap();
    assert_eq!(conflict.conflict_type, "source_hash_mismatch");
    assert_eq!(
        conflict.current_source_hash.as_deref(),
        Some(compute_source_hash("Home").as_str())
    );
    assert_eq!(conflict.provided_source_hash.as_deref(), Some("OLD"));
    assert_eq!(
        (result.summary.processed, result.summary.succeeded, result.summary.failed),
        (1, 0, 1)
    );
}

#[tokio::test]
async fn test_summary_accounts_for_every_row() {
    let svc = service(seeded().await);
    let ctx = AdminContext::new("translator");
    let json = json!({"rows": [
        {"resource": "pages", "entity_id": "page_1", "source_locale": "en",
         "target_locale": "es", "field_path": "title", "translated_text": "Portada"},
        {"resource": "pages", "entity_id": "page_1", "source_locale": "en",
         "target_locale": "fr", "field_path": "title", "translated_text": "Accueil"},
        {"resource": "posts", "entity_id": "post_1", "source_locale": "en",
         "target_locale": "es", "field_path": "title", "translated_text": "Hola"},
        {"resource": "pages", "entity_id": "page_1", "source_locale": "en",
         "target_locale": "es", "field_path": "summary", "translated_text": "Empieza"}
    ]});
    let rows = ExchangeCodec::decode(ExchangeFormat::Json, json.to_string().as_bytes()).unwrap();
    let options = ApplyOptions {
        continue_on_error: true,
        ..ApplyOptions::default()
    };

    let result = svc.apply(&ctx, &rows, options).await.unwrap();

    let s = &result.summary;
    assert_eq!(s.processed, 4);
    assert_eq!(s.processed, s.succeeded + s.failed + s.skipped);
    assert_eq!(s.succeeded, 2);
    assert!(!result.aborted);
}
