use exam_core::model::{
    ExamResult, ExamResultDraft, GradeSource, Level, PendingSkill, PendingSkillQueue, SessionId,
    SkillId, SubmissionTrigger,
};
use exam_core::time::fixed_now;
use storage::repository::{
    ActiveExamMarker, ActiveExamRepository, ExamResultRepository, PendingSkillRepository,
    StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn build_result(skill: u64, score: f64, offset_secs: i64) -> ExamResult {
    ExamResultDraft {
        session_id: SessionId::generate(),
        skill_id: SkillId::new(skill),
        skill_name: format!("Skill {skill}"),
        score,
        correct_answers: 3,
        total_questions: 5,
        written_reflection: "joins are hard".into(),
        time_taken_secs: 240,
        violation_count: 2,
        trigger: SubmissionTrigger::ViolationCeiling,
        source: GradeSource::Authoritative,
        completed_at: fixed_now() + chrono::Duration::seconds(offset_secs),
    }
    .validate()
    .unwrap()
}

#[tokio::test]
async fn sqlite_queue_survives_reconnect_in_order() {
    let repo = connect("memdb_queue").await;
    let queue = PendingSkillQueue::from_skills([
        PendingSkill::new(SkillId::new(3), "Go"),
        PendingSkill::new(SkillId::new(1), "SQL"),
        PendingSkill::new(SkillId::new(2), "Rust"),
    ]);
    repo.save_queue(&queue).await.unwrap();

    let reopened = connect("memdb_queue").await;
    let loaded = reopened.load_queue().await.unwrap();
    assert_eq!(loaded, queue);

    assert!(reopened.remove_skill(SkillId::new(1)).await.unwrap());
    let ids: Vec<_> = reopened
        .load_queue()
        .await
        .unwrap()
        .iter()
        .map(|s| s.skill_id.value())
        .collect();
    assert_eq!(ids, vec![3, 2]);
}

#[tokio::test]
async fn sqlite_results_roundtrip_and_list() {
    let repo = connect("memdb_results").await;
    let first = build_result(1, 60.0, 0);
    let second = build_result(2, 85.5, 30);

    let first_id = repo.append_result(&first).await.unwrap();
    repo.append_result(&second).await.unwrap();

    let fetched = repo.get_result(first_id).await.unwrap();
    assert_eq!(fetched, first);
    assert_eq!(fetched.level(), Level::Advanced);

    let rows = repo.list_results(None, 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].result, second);

    let only_first = repo.list_results(Some(SkillId::new(1)), 10).await.unwrap();
    assert_eq!(only_first.len(), 1);
    assert_eq!(only_first[0].id, first_id);
}

#[tokio::test]
async fn sqlite_rejects_second_result_for_session() {
    let repo = connect("memdb_conflict").await;
    let result = build_result(1, 40.0, 0);
    repo.append_result(&result).await.unwrap();
    assert!(matches!(
        repo.append_result(&result).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn sqlite_missing_result_is_not_found() {
    let repo = connect("memdb_missing").await;
    assert!(matches!(
        repo.get_result(404).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_active_marker_is_single_slot() {
    let repo = connect("memdb_active").await;
    assert_eq!(repo.get_active().await.unwrap(), None);

    let first = ActiveExamMarker {
        session_id: SessionId::generate(),
        skill_id: SkillId::new(1),
        skill_name: "SQL".into(),
        started_at: fixed_now(),
    };
    let second = ActiveExamMarker {
        session_id: SessionId::generate(),
        skill_id: SkillId::new(2),
        skill_name: "Rust".into(),
        started_at: fixed_now(),
    };
    repo.set_active(&first).await.unwrap();
    repo.set_active(&second).await.unwrap();
    assert_eq!(repo.get_active().await.unwrap(), Some(second.clone()));

    repo.clear_active(first.session_id).await.unwrap();
    assert_eq!(repo.get_active().await.unwrap(), Some(second.clone()));

    repo.clear_active(second.session_id).await.unwrap();
    assert_eq!(repo.get_active().await.unwrap(), None);
}
