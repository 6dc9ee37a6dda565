mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{five_scene_book, harness, harness_with, roster, three_chapter_book, MALFORMED};
use folio_core::traits::{JobStore, ObjectStore, SceneStore};
use folio_core::types::{AnalysisStatus, CharacterRole, EntityKind, JobStatus, ProfileSource};
use folio_core::{
    DocumentStatus, FolioError, IngestRequest, PipelineEvent, SimilarityIndex, Stage,
    StagePayload, WorkerPool,
};

fn book(owner: &str, text: &str) -> IngestRequest {
    IngestRequest::new(owner, "winter.txt", text.as_bytes().to_vec())
}

#[tokio::test]
async fn test_segmentation_skips_short_chapter() {
    let h = harness_with(roster(), |c| c.analysis.auto_analyze = false);
    let doc = h
        .orchestrator
        .ingest(book("alice", &three_chapter_book()))
        .await
        .unwrap();
    assert!(!doc.is_duplicate());

    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&doc.document().id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::ScenesDetected);
    assert_eq!(doc.total_chapters, 2);
    assert_eq!(doc.progress_percent, 20);

    let scenes = h.orchestrator.scenes(&doc.id).await.unwrap();
    assert_eq!(doc.total_scenes as usize, scenes.len());
    assert_eq!(scenes.len(), 5);
    for (i, scene) in scenes.iter().enumerate() {
        assert_eq!(scene.global_index as usize, i);
        assert_eq!(scene.analysis_status, AnalysisStatus::Pending);
        assert_ne!(scene.chapter_title, "Chapter 3");
    }
    assert_eq!(h.llm().scene_calls(), 0);
}

#[tokio::test]
async fn test_segmentation_is_deterministic() {
    let h = harness_with(roster(), |c| c.analysis.auto_analyze = false);
    let first = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let second = h.orchestrator.ingest(book("bob", &three_chapter_book())).await.unwrap();
    h.orchestrator.run_pending().await.unwrap();

    let shape = |scenes: Vec<folio_core::Scene>| {
        scenes
            .into_iter()
            .map(|s| (s.global_index, s.chapter_index, s.text, s.scene_type))
            .collect::<Vec<_>>()
    };
    let a = shape(h.orchestrator.scenes(&first.document().id).await.unwrap());
    let b = shape(h.orchestrator.scenes(&second.document().id).await.unwrap());
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_duplicate_upload_returns_existing_document() {
    let h = harness_with(roster(), |c| c.analysis.auto_analyze = false);
    let first = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let again = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let other = h.orchestrator.ingest(book("bob", &three_chapter_book())).await.unwrap();

    assert!(again.is_duplicate());
    assert_eq!(again.document().id, first.document().id);
    assert!(!other.is_duplicate());
    assert_ne!(other.document().id, first.document().id);
    assert_eq!(h.orchestrator.documents("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ingest_rejects_unknown_format() {
    let h = harness(roster());
    let result = h
        .orchestrator
        .ingest(IngestRequest::new("alice", "cover.png", vec![1, 2, 3]))
        .await;
    assert!(matches!(result, Err(FolioError::Validation { .. })));
}

#[tokio::test]
async fn test_analysis_isolates_malformed_scene() {
    let h = harness_with(roster(), |c| c.analysis.auto_discover = false);
    let mut events = h.orchestrator.events().subscribe();
    let outcome = h.orchestrator.ingest(book("alice", &five_scene_book())).await.unwrap();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&outcome.document().id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Analyzed);
    assert_eq!(
        doc.current_step.as_deref(),
        Some("Analysis completed with 1 error(s)")
    );
    assert!(doc.error_message.is_some());

    let scenes = h.orchestrator.scenes(&doc.id).await.unwrap();
    let completed = scenes
        .iter()
        .filter(|s| s.analysis_status == AnalysisStatus::Completed)
        .count();
    assert_eq!(completed, 4);
    assert_eq!(scenes[2].analysis_status, AnalysisStatus::Failed);
    assert!(scenes[2].analysis_error.is_some());
    assert!(scenes[0].analysis.is_some());

    let mut analysis_summary = None;
    while let Some(event) = events.try_recv() {
        if let PipelineEvent::Completed(done) = event {
            if done.stage == Stage::Analysis {
                analysis_summary = Some((done.items, done.item_errors));
            }
        }
    }
    assert_eq!(analysis_summary, Some((4, 1)));
}

#[tokio::test]
async fn test_retry_reanalyzes_only_outstanding_scenes() {
    let h = harness_with(roster(), |c| c.analysis.auto_discover = false);
    let outcome = h.orchestrator.ingest(book("alice", &five_scene_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();
    assert_eq!(h.llm().scene_calls(), 5);

    // a credential failure sends the document to failed
    h.providers.reject_credentials.store(true, Ordering::SeqCst);
    h.orchestrator.retry(&id, "alice").await.unwrap();
    h.orchestrator.run_pending().await.unwrap();
    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(doc.previous_status, Some(DocumentStatus::ScenesDetected));
    assert_eq!(h.llm().scene_calls(), 5);

    h.providers.reject_credentials.store(false, Ordering::SeqCst);
    h.llm().garble.store(false, Ordering::SeqCst);
    h.orchestrator.retry(&id, "alice").await.unwrap();
    h.orchestrator.run_pending().await.unwrap();

    assert_eq!(h.llm().scene_calls(), 6);
    let last = h.llm().analyzed.lock().unwrap().last().cloned().unwrap();
    assert!(last.contains(MALFORMED));

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Analyzed);
    assert_eq!(doc.error_message, None);
    let counts = h.store.analysis_counts(&id).await.unwrap();
    assert_eq!(counts.completed, 5);
}

#[tokio::test]
async fn test_credential_error_is_not_retried() {
    let h = harness_with(roster(), |c| c.analysis.auto_analyze = false);
    let mut events = h.orchestrator.events().subscribe();
    let outcome = h.orchestrator.ingest(book("alice", &five_scene_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    h.providers.reject_credentials.store(true, Ordering::SeqCst);
    let job = h
        .orchestrator
        .enqueue_stage(Stage::Analysis, StagePayload::new(&id, "alice"))
        .await
        .unwrap();
    h.orchestrator.run_pending().await.unwrap();

    let job = h.store.get_job(&job.job().id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(doc.error_message.unwrap().contains("API key"));

    let mut errors = Vec::new();
    while let Some(event) = events.try_recv() {
        if let PipelineEvent::Error(e) = event {
            errors.push(e.will_retry);
        }
    }
    assert_eq!(errors, vec![false]);
}

#[tokio::test]
async fn test_transient_errors_retry_then_roll_back() {
    let h = harness_with(roster(), |c| c.analysis.auto_discover = false);
    let mut events = h.orchestrator.events().subscribe();
    h.llm().outage.store(true, Ordering::SeqCst);

    let outcome = h.orchestrator.ingest(book("alice", &five_scene_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    // three attempts, each stopping at the first scene
    assert_eq!(h.llm().scene_calls(), 3);
    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::ScenesDetected);
    assert!(doc.error_message.unwrap().contains("connection reset"));

    let retries: Vec<bool> = std::iter::from_fn(|| events.try_recv())
        .filter_map(|e| match e {
            PipelineEvent::Error(e) => Some(e.will_retry),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![true, true, false]);

    h.llm().outage.store(false, Ordering::SeqCst);
    h.orchestrator.retry(&id, "alice").await.unwrap();
    h.orchestrator.run_pending().await.unwrap();
    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Analyzed);
}

#[tokio::test]
async fn test_unhealthy_provider_rolls_back_without_touching_scenes() {
    let h = harness_with(roster(), |c| c.analysis.auto_discover = false);
    h.llm().healthy.store(false, Ordering::SeqCst);

    let outcome = h.orchestrator.ingest(book("alice", &five_scene_book())).await.unwrap();
    h.orchestrator.run_pending().await.unwrap();

    assert_eq!(h.llm().scene_calls(), 0);
    let doc = h.orchestrator.document(&outcome.document().id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::ScenesDetected);
    let counts = h.store.analysis_counts(&doc.id).await.unwrap();
    assert_eq!(counts.pending, 5);
}

#[tokio::test]
async fn test_missing_source_fails_document() {
    let h = harness(roster());
    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let doc = outcome.document();
    h.objects.delete(&doc.source_path).await.unwrap();

    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&doc.id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(doc.previous_status, Some(DocumentStatus::Uploading));
    assert!(h.orchestrator.scenes(&doc.id).await.is_err());
}

#[tokio::test]
async fn test_stage_triggers_respect_state_machine() {
    let h = harness_with(roster(), |c| c.analysis.auto_analyze = false);
    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();

    assert!(matches!(
        h.orchestrator.characters(&id).await,
        Err(FolioError::InvalidState { .. })
    ));

    h.orchestrator.run_pending().await.unwrap();

    let discovery = h
        .orchestrator
        .enqueue_stage(Stage::Discovery, StagePayload::new(&id, "alice"))
        .await;
    assert!(matches!(discovery, Err(FolioError::InvalidState { .. })));

    let first = h
        .orchestrator
        .enqueue_stage(Stage::Analysis, StagePayload::new(&id, "alice"))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .enqueue_stage(Stage::Analysis, StagePayload::new(&id, "alice"))
        .await
        .unwrap();
    assert!(first.is_new());
    assert!(!second.is_new());
    assert_eq!(first.job().id, second.job().id);
}

#[tokio::test]
async fn test_full_pipeline_discovers_characters() {
    let h = harness(roster());
    let mut events = h.orchestrator.events().subscribe();
    let outcome = h
        .orchestrator
        .ingest(book("alice", &three_chapter_book()).with_title("A Winter Tale"))
        .await
        .unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::CharactersDiscovered);
    assert_eq!(doc.progress_percent, 100);
    assert_eq!(doc.title.as_deref(), Some("A Winter Tale"));
    assert_eq!(doc.total_characters, 3);

    let characters = h.orchestrator.characters(&id).await.unwrap();
    let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Jon Snow", "Arya", "Maester Luwin"]);

    let jon = &characters[0];
    assert_eq!(jon.aliases, vec!["Jon".to_string()]);
    assert_eq!(jon.scene_count, 3);
    assert_eq!(jon.role, CharacterRole::Protagonist);
    assert_eq!(jon.profile_source, ProfileSource::Synthesized);
    assert!(jon.profile.visual_summary.contains("Jon Snow"));
    assert_eq!(characters[2].role, CharacterRole::Supporting);

    let settings = h.orchestrator.settings(&id).await.unwrap();
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].name, "Godswood");

    let indexed = h.store.list_embeddings(&id, Some(EntityKind::Character)).await.unwrap();
    assert_eq!(indexed.len(), 3);

    let similar = h
        .orchestrator
        .similar_characters(&jon.id, Some(0.0), None)
        .await
        .unwrap();
    assert!(!similar.is_empty());
    assert!(similar.iter().all(|s| s.character.id != jon.id));
    assert!(similar.windows(2).all(|w| w[0].similarity >= w[1].similarity));

    let statuses: Vec<DocumentStatus> = std::iter::from_fn(|| events.try_recv())
        .filter_map(|e| match e {
            PipelineEvent::StatusChanged(s) => Some(s.to),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            DocumentStatus::Parsing,
            DocumentStatus::ScenesDetected,
            DocumentStatus::Analyzing,
            DocumentStatus::Analyzed,
            DocumentStatus::DiscoveringCharacters,
            DocumentStatus::BuildingCharacterProfiles,
            DocumentStatus::CharactersDiscovered,
        ]
    );
}

/// `will_retry` of every discovery error, plus the discovery completion summary.
fn discovery_events(
    events: &mut folio_core::EventSubscriber,
) -> (Vec<bool>, Option<(usize, usize)>) {
    let mut errors = Vec::new();
    let mut summary = None;
    while let Some(event) = events.try_recv() {
        match event {
            PipelineEvent::Error(e) if e.stage == Stage::Discovery => errors.push(e.will_retry),
            PipelineEvent::Completed(done) if done.stage == Stage::Discovery => {
                summary = Some((done.items, done.item_errors))
            }
            _ => {}
        }
    }
    (errors, summary)
}

#[tokio::test]
async fn test_embedder_credential_error_fails_discovery() {
    let h = harness(roster());
    h.providers.reject_embedder.store(true, Ordering::SeqCst);
    let mut events = h.orchestrator.events().subscribe();

    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert_eq!(doc.previous_status, Some(DocumentStatus::Analyzed));
    assert!(doc.error_message.unwrap().contains("API key"));

    // fails before spending anything on profiles
    assert_eq!(h.llm().syntheses.load(Ordering::SeqCst), 0);
    assert_eq!(h.providers.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.list_embeddings(&id, None).await.unwrap().is_empty());

    let (errors, summary) = discovery_events(&mut events);
    assert_eq!(errors, vec![false]);
    assert_eq!(summary, None);
}

#[tokio::test]
async fn test_embedding_rate_limit_is_retried() {
    let h = harness(roster());
    h.providers.embedder.throttled.store(1, Ordering::SeqCst);
    let mut events = h.orchestrator.events().subscribe();

    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::CharactersDiscovered);
    assert_eq!(doc.error_message, None);
    assert_eq!(h.store.list_embeddings(&id, None).await.unwrap().len(), 4);

    let (errors, summary) = discovery_events(&mut events);
    assert_eq!(errors, vec![true]);
    assert_eq!(summary, Some((3, 0)));
}

#[tokio::test]
async fn test_rejected_vectors_are_reported_as_item_errors() {
    let h = harness(roster());
    h.providers.embedder.truncate.store(true, Ordering::SeqCst);
    let mut events = h.orchestrator.events().subscribe();

    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::CharactersDiscovered);
    assert_eq!(
        doc.error_message.as_deref(),
        Some("4 item(s) failed during character discovery")
    );
    assert!(doc.current_step.unwrap().ends_with("with 4 error(s)"));
    assert!(h.store.list_embeddings(&id, None).await.unwrap().is_empty());

    let (errors, summary) = discovery_events(&mut events);
    assert!(errors.is_empty());
    assert_eq!(summary, Some((3, 4)));
}

#[tokio::test]
async fn test_failed_synthesis_is_kept_on_character() {
    let llm = roster();
    llm.thin_profiles.lock().unwrap().push("Arya".to_string());
    let h = harness(llm);

    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::CharactersDiscovered);
    assert_eq!(
        doc.error_message.as_deref(),
        Some("1 item(s) failed during character discovery")
    );

    let characters = h.orchestrator.characters(&id).await.unwrap();
    assert_eq!(characters.len(), 3);
    for character in &characters {
        if character.name == "Arya" {
            assert_eq!(character.profile_source, ProfileSource::Fallback);
            assert!(character.synthesis_error.as_deref().unwrap().contains("summary"));
            assert!(character.profile.visual_summary.contains("dark wool cloak"));
        } else {
            assert_eq!(character.profile_source, ProfileSource::Synthesized);
            assert_eq!(character.synthesis_error, None);
        }
    }
}

#[tokio::test]
async fn test_rerunning_discovery_keeps_ids_and_embeddings() {
    let h = harness(roster());
    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let before: Vec<String> = h
        .orchestrator
        .characters(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    let embed_calls = h.providers.embedder.calls.load(Ordering::SeqCst);
    assert_eq!(embed_calls, 4);

    h.orchestrator
        .enqueue_stage(Stage::Discovery, StagePayload::new(&id, "alice"))
        .await
        .unwrap();
    h.orchestrator.run_pending().await.unwrap();

    let after: Vec<String> = h
        .orchestrator
        .characters(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(before, after);
    assert_eq!(h.providers.embedder.calls.load(Ordering::SeqCst), embed_calls);
}

#[tokio::test]
async fn test_generation_handoff() {
    let h = harness(roster());
    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();
    h.orchestrator.run_pending().await.unwrap();

    let doc = h.orchestrator.begin_generation(&id).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Generating);

    let doc = h
        .orchestrator
        .finish_generation(&id, Err("image service unavailable".to_string()))
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::CharactersDiscovered);
    assert_eq!(doc.error_message.as_deref(), Some("image service unavailable"));

    h.orchestrator.begin_generation(&id).await.unwrap();
    let doc = h.orchestrator.finish_generation(&id, Ok(())).await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);

    assert!(h.orchestrator.begin_generation(&id).await.is_err());
    assert!(h.orchestrator.retry(&id, "alice").await.is_err());
}

#[tokio::test]
async fn test_worker_pool_drives_document_to_discovery() {
    let h = harness(roster());
    let workers = WorkerPool::start(h.orchestrator.clone()).await.unwrap();
    assert_eq!(workers.worker_count(), 3);

    let mut events = h.orchestrator.events().subscribe();
    let outcome = h.orchestrator.ingest(book("alice", &three_chapter_book())).await.unwrap();
    let id = outcome.document().id.clone();

    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv_for(&id).await {
            if let PipelineEvent::StatusChanged(change) = event {
                if change.to == DocumentStatus::CharactersDiscovered {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(reached);

    workers.shutdown().await;
    let doc = h.orchestrator.document(&id).await.unwrap();
    assert_eq!(doc.total_characters, 3);
}
