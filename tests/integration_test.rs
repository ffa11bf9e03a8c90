use site_photo_verify::{
    db::{self, JobStore, PgJobStore},
    models::{
        job::{JobStatus, NewJob, Thresholds},
        photo::{ExtractedFields, NewPhoto, PhotoCompletion, PhotoStatus, PhotoType, QualityChecks},
    },
    services::dedupe::Fingerprint,
};
use tokio_test::assert_ok;
use uuid::Uuid;

/// Integration test: job and photo persistence against PostgreSQL
///
/// Covers:
/// 1. Migrations
/// 2. Job creation and active-job lookup
/// 3. Conditional PENDING → IN_PROGRESS
/// 4. Photo placeholder, one-shot completion and prior fingerprints
/// 5. Conditional cursor advance (with field promotion) through to DONE
///
/// Note: This requires a running PostgreSQL instance reachable through
/// DATABASE_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_postgres_job_store() {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = db::init_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    assert_ok!(db::run_migrations(&pool).await);

    let store = PgJobStore::new(pool);
    assert_ok!(store.ping().await);

    // Unique worker so reruns don't see each other's jobs
    let worker = format!("+1555{}", &Uuid::new_v4().simple().to_string()[..7]);

    // 1. Create job
    let job = store
        .create_job(NewJob {
            worker_id: worker.clone(),
            category: Some("FWA".to_string()),
            required_types: vec![PhotoType::label(), PhotoType::azimuth()],
            thresholds: Thresholds::default(),
        })
        .await
        .expect("Failed to create job");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.current_index, 0);

    let active = store
        .find_active_job(&worker)
        .await
        .expect("Active job lookup failed")
        .expect("Job should be active");
    assert_eq!(active.id, job.id);
    assert_eq!(active.required_types, vec![PhotoType::label(), PhotoType::azimuth()]);
    assert_eq!(active.thresholds, Thresholds::default());

    // 2. First contact
    assert!(store.mark_in_progress(job.id).await.unwrap());
    assert!(!store.mark_in_progress(job.id).await.unwrap());

    // 3. Photo lifecycle
    let photo = store
        .insert_photo(NewPhoto {
            job_id: job.id,
            photo_type: PhotoType::label(),
            expected_index: 0,
            image_key: format!("jobs/{}/label/{}.jpg", job.id, Uuid::new_v4()),
        })
        .await
        .expect("Failed to insert photo");
    assert_eq!(photo.status, PhotoStatus::Processing);

    let fields = ExtractedFields {
        mac_id: Some("CC:54:FE:E3:26:F8".to_string()),
        rsn: Some("ABCD1234EF".to_string()),
        ..Default::default()
    };
    let completion = PhotoCompletion {
        photo_type: PhotoType::label(),
        fingerprint: Some(Fingerprint::from_bits(0xDEAD_BEEF_0000_0001)),
        extracted_text: Some("MAC: CC:54:FE:E3:26:F8\nS/N: ABCD1234EF".to_string()),
        fields: fields.clone(),
        checks: QualityChecks {
            sharpness: Some(512.0),
            skew_deg: Some(1.5),
            has_label_ids: Some(true),
            ..Default::default()
        },
        status: PhotoStatus::Pass,
        reasons: Vec::new(),
    };
    assert!(store.complete_photo(photo.id, &completion).await.unwrap());
    assert!(!store
        .complete_photo(photo.id, &PhotoCompletion::error(PhotoType::label(), "late"))
        .await
        .unwrap());

    let prior = store.prior_fingerprints(job.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(
        prior,
        vec![(PhotoType::label(), Fingerprint::from_bits(0xDEAD_BEEF_0000_0001))]
    );

    let photos = store.list_photos(job.id).await.unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].fields, fields);
    assert_eq!(photos[0].checks.sharpness, Some(512.0));

    // 4. Conditional advance carrying the promoted fields
    let advanced = store
        .advance_cursor(job.id, 0, &fields)
        .await
        .unwrap()
        .expect("First advance should win");
    assert_eq!(advanced.current_index, 1);
    assert_eq!(advanced.status, JobStatus::InProgress);
    assert_eq!(advanced.promoted_fields.mac_id.as_deref(), Some("CC:54:FE:E3:26:F8"));

    let stale = ExtractedFields {
        mac_id: Some("00:11:22:33:44:55".to_string()),
        ..Default::default()
    };
    assert!(store.advance_cursor(job.id, 0, &stale).await.unwrap().is_none());

    let done = store
        .advance_cursor(job.id, 1, &ExtractedFields::default())
        .await
        .unwrap()
        .expect("Second advance should win");
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.promoted_fields.mac_id.as_deref(), Some("CC:54:FE:E3:26:F8"));
    assert!(store.find_active_job(&worker).await.unwrap().is_none());

    println!("✅ Postgres job store checks passed");
}
