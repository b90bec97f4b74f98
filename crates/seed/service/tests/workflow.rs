use chrono::{Duration, Utc};
use seed_gate::{PACING_TOO_SOON, RATE_EXCEEDED, REVIEW_EXPIRED};
use seed_phase::{PhaseOutcome, RegisterAccount};
use seed_risk::FixedAuthenticitySignal;
use seed_service::{GrowthService, SeedConfig, ServiceError, SimulatedExecutor};
use seed_storage::memory::InMemorySeedStorage;
use seed_types::{
    Account, ActionType, Clock, DecisionStatus, ExecutionResult, ManualClock, Phase, Platform,
    ReviewOutcome, RiskBand, TransitionKind,
};
use std::sync::Arc;

struct World {
    service: Arc<GrowthService>,
    clock: Arc<ManualClock>,
}

fn world_with(
    signal: FixedAuthenticitySignal,
    executor: fn(Arc<ManualClock>) -> SimulatedExecutor,
) -> World {
    world_configured(&SeedConfig::default(), signal, executor)
}

fn world_configured(
    config: &SeedConfig,
    signal: FixedAuthenticitySignal,
    executor: fn(Arc<ManualClock>) -> SimulatedExecutor,
) -> World {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = GrowthService::new(
        config,
        Arc::new(InMemorySeedStorage::new()),
        clock.clone(),
        Arc::new(signal),
        Arc::new(executor(clock.clone())),
    )
    .unwrap();
    World {
        service: Arc::new(service),
        clock,
    }
}

fn world() -> World {
    world_with(
        FixedAuthenticitySignal::constant(0.0).with_target("@unknown", f64::NAN),
        |clock| SimulatedExecutor::new(clock).failing_target("@broken"),
    )
}

async fn account(world: &World, platform: Platform, age_days: Option<i64>) -> Account {
    world
        .service
        .register_account(RegisterAccount {
            platform,
            username: "seedling".to_string(),
            platform_created_at: age_days.map(|days| world.clock.now() - Duration::days(days)),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn five_follows_per_hour_then_rate_ceiling() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, None).await;
    assert_eq!(acct.phase, Phase::Phase1);

    for i in 0..5 {
        let decision = w
            .service
            .submit_action(&acct.account_id, ActionType::Follow, &format!("@human{i}"))
            .await
            .unwrap();
        assert_eq!(decision.decision, DecisionStatus::AutoApproved, "follow {i}");
        w.clock.advance(Duration::minutes(5));
    }

    let sixth = w
        .service
        .submit_action(&acct.account_id, ActionType::Follow, "@human5")
        .await
        .unwrap();
    assert_eq!(sixth.decision, DecisionStatus::Rejected);
    assert!(sixth.reason.starts_with(RATE_EXCEEDED));

    w.clock.advance(Duration::minutes(40));
    let next_hour = w
        .service
        .submit_action(&acct.account_id, ActionType::Follow, "@human6")
        .await
        .unwrap();
    assert_eq!(next_hour.decision, DecisionStatus::AutoApproved);
}

#[tokio::test]
async fn missing_signal_goes_red_and_waits_a_day() {
    let w = world_with(FixedAuthenticitySignal::unavailable(), |clock| {
        SimulatedExecutor::new(clock)
    });
    let acct = account(&w, Platform::Tiktok, None).await;

    let entry = w
        .service
        .submit(seed_gate::ActionRequest {
            account_id: acct.account_id.clone(),
            action_type: ActionType::Like,
            target_identifier: "@mystery".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(entry.assessment.risk_band, RiskBand::Red);
    assert_eq!(entry.assessment.score, 1.0);
    assert_eq!(entry.decision.decision, DecisionStatus::PendingReview);
    assert_eq!(
        entry.decision.expires_at,
        Some(entry.decision.decided_at + Duration::hours(24))
    );
}

#[tokio::test]
async fn out_of_range_signal_is_treated_as_missing() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, None).await;
    let decision = w
        .service
        .submit_action(&acct.account_id, ActionType::Follow, "@unknown")
        .await
        .unwrap();
    assert_eq!(decision.decision, DecisionStatus::PendingReview);
    assert!(decision.health_flag);
}

#[tokio::test]
async fn expired_review_is_never_executed() {
    let w = world_with(FixedAuthenticitySignal::unavailable(), |clock| {
        SimulatedExecutor::new(clock)
    });
    let acct = account(&w, Platform::Tiktok, None).await;
    let entry = w
        .service
        .submit(seed_gate::ActionRequest {
            account_id: acct.account_id.clone(),
            action_type: ActionType::Follow,
            target_identifier: "@late".to_string(),
        })
        .await
        .unwrap();
    let action_id = entry.action.action_id;

    w.clock.advance(Duration::hours(24));
    let expired = w.service.sweep_expired().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].decision.reason, REVIEW_EXPIRED);

    let review = w
        .service
        .review_pending(&action_id, "reviewer-1", ReviewOutcome::Approved, None)
        .await;
    assert!(review.is_err());

    match w.service.dispatch(&action_id).await {
        Err(ServiceError::NotExecutable { status, .. }) => {
            assert_eq!(status, DecisionStatus::Expired)
        }
        other => panic!("expected NotExecutable, got {other:?}"),
    }
    let stored = w.service.ledger().get(&action_id).await.unwrap().unwrap();
    assert!(stored.execution.is_none());
}

#[tokio::test]
async fn approved_review_can_be_dispatched_once() {
    let w = world_with(FixedAuthenticitySignal::unavailable(), |clock| {
        SimulatedExecutor::new(clock)
    });
    let acct = account(&w, Platform::Tiktok, None).await;
    let entry = w
        .service
        .submit(seed_gate::ActionRequest {
            account_id: acct.account_id.clone(),
            action_type: ActionType::Follow,
            target_identifier: "@checked".to_string(),
        })
        .await
        .unwrap();
    let action_id = entry.action.action_id;

    let pending = w.service.pending(Some(&acct.account_id)).await.unwrap();
    assert_eq!(pending.len(), 1);

    let approved = w
        .service
        .review_pending(&action_id, "reviewer-1", ReviewOutcome::Approved, Some("ok".into()))
        .await
        .unwrap();
    assert_eq!(approved.decision, DecisionStatus::Approved);

    let executed = w.service.dispatch(&action_id).await.unwrap();
    assert!(executed.execution.unwrap().success);
    assert!(matches!(
        w.service.dispatch(&action_id).await,
        Err(ServiceError::AlreadyDispatched(_))
    ));
}

#[tokio::test]
async fn demotion_stops_at_the_lowest_phase_for_the_platform() {
    let w = world();
    let acct = account(&w, Platform::Instagram, Some(90)).await;
    assert_eq!(acct.phase, Phase::Phase3);

    let before = w
        .service
        .submit_action(&acct.account_id, ActionType::Like, "@friend")
        .await
        .unwrap();
    assert_eq!(before.decision, DecisionStatus::AutoApproved);

    let record = w
        .service
        .demote_account(&acct.account_id, "reviewer-1", "complaint")
        .await
        .unwrap();
    assert_eq!(record.to_phase, Phase::Phase2);

    let demoted = w.service.account(&acct.account_id).await.unwrap();
    let config = SeedConfig::default();
    assert!(config
        .phases
        .get(demoted.phase)
        .allows_platform(demoted.platform));

    w.clock.advance(Duration::minutes(2));
    let after = w
        .service
        .submit_action(&acct.account_id, ActionType::Like, "@friend2")
        .await
        .unwrap();
    assert_eq!(after.decision, DecisionStatus::AutoApproved);

    assert!(w
        .service
        .demote_account(&acct.account_id, "reviewer-1", "again")
        .await
        .is_err());
    assert_eq!(
        w.service.account(&acct.account_id).await.unwrap().phase,
        Phase::Phase2
    );
}

#[tokio::test]
async fn back_to_back_actions_wait_for_the_phase_interval() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, None).await;

    let first = w
        .service
        .submit_action(&acct.account_id, ActionType::Like, "@one")
        .await
        .unwrap();
    assert_eq!(first.decision, DecisionStatus::AutoApproved);

    w.clock.advance(Duration::seconds(60));
    let rushed = w
        .service
        .submit_action(&acct.account_id, ActionType::Follow, "@two")
        .await
        .unwrap();
    assert_eq!(rushed.decision, DecisionStatus::Rejected);
    assert!(rushed.reason.starts_with(PACING_TOO_SOON));

    w.clock.advance(Duration::seconds(60));
    let paced = w
        .service
        .submit_action(&acct.account_id, ActionType::Follow, "@two")
        .await
        .unwrap();
    assert_eq!(paced.decision, DecisionStatus::AutoApproved);
}

#[tokio::test]
async fn rejections_drive_health_demotion() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, Some(45)).await;
    assert_eq!(acct.phase, Phase::Phase2);

    // phase 2 allows five comments per hour; everything past that is rejected
    let mut health = 1.0;
    let mut i = 0;
    while health >= 0.3 {
        w.service
            .submit_action(&acct.account_id, ActionType::Comment, &format!("@c{i}"))
            .await
            .unwrap();
        health = w.service.account(&acct.account_id).await.unwrap().health_score;
        w.clock.advance(Duration::minutes(1));
        i += 1;
        assert!(i < 50, "health never dropped");
    }

    let account = w.service.account(&acct.account_id).await.unwrap();
    assert_eq!(account.phase, Phase::Phase1);
    let history = w.service.phase_history(&acct.account_id).await.unwrap();
    let demotion = history.last().unwrap();
    assert_eq!(demotion.kind, TransitionKind::Demotion);
    assert!(demotion.reason.contains("health_score"));
}

#[tokio::test]
async fn failed_executions_demote_via_consecutive_errors() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, Some(90)).await;
    assert_eq!(acct.phase, Phase::Phase3);

    for _ in 0..6 {
        let entry = w
            .service
            .submit(seed_gate::ActionRequest {
                account_id: acct.account_id.clone(),
                action_type: ActionType::Like,
                target_identifier: "@broken".to_string(),
            })
            .await
            .unwrap();
        let executed = w.service.dispatch(&entry.action.action_id).await.unwrap();
        assert!(!executed.execution.unwrap().success);
        w.clock.advance(Duration::minutes(1));
    }

    let account = w.service.account(&acct.account_id).await.unwrap();
    assert_eq!(account.phase, Phase::Phase1);
    let last = w
        .service
        .phase_history(&acct.account_id)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(last.kind, TransitionKind::Demotion);
}

#[tokio::test]
async fn promotion_after_a_clean_month_is_idempotent() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, None).await;

    w.clock.advance(Duration::days(20));
    for day in 0..10 {
        for i in 0..2 {
            let entry = w
                .service
                .submit(seed_gate::ActionRequest {
                    account_id: acct.account_id.clone(),
                    action_type: ActionType::Like,
                    target_identifier: format!("@d{day}-{i}"),
                })
                .await
                .unwrap();
            w.service.dispatch(&entry.action.action_id).await.unwrap();
            w.clock.advance(Duration::minutes(5));
        }
        w.clock.advance(Duration::days(1));
    }

    let outcomes = w.service.evaluate_phases().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].1 {
        PhaseOutcome::Promoted(record) => {
            assert_eq!(record.to_phase, Phase::Phase2);
            assert_eq!(record.reason, "automatic: criteria met");
        }
        other => panic!("expected promotion, got {other:?}"),
    }

    let again = w.service.evaluate_phases().await.unwrap();
    assert!(again.iter().all(|(_, outcome)| outcome.record().is_none()));
    assert_eq!(w.service.phase_history(&acct.account_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn phase_history_chains_bootstrap_promotion_and_demotion() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, Some(35)).await;
    assert_eq!(acct.phase, Phase::Phase2);

    w.clock.advance(Duration::days(20));
    for day in 0..10 {
        for i in 0..2 {
            let entry = w
                .service
                .submit(seed_gate::ActionRequest {
                    account_id: acct.account_id.clone(),
                    action_type: ActionType::Like,
                    target_identifier: format!("@h{day}-{i}"),
                })
                .await
                .unwrap();
            w.service.dispatch(&entry.action.action_id).await.unwrap();
            w.clock.advance(Duration::minutes(5));
        }
        w.clock.advance(Duration::days(1));
    }

    let outcomes = w.service.evaluate_phases().await.unwrap();
    assert!(matches!(&outcomes[0].1, PhaseOutcome::Promoted(record) if record.to_phase == Phase::Phase3));
    w.service
        .demote_account(&acct.account_id, "reviewer-1", "complaint")
        .await
        .unwrap();

    let history = w.service.phase_history(&acct.account_id).await.unwrap();
    let kinds = history.iter().map(|record| record.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            TransitionKind::Bootstrap,
            TransitionKind::Promotion,
            TransitionKind::Demotion
        ]
    );

    let current = w.service.account(&acct.account_id).await.unwrap().phase;
    assert_eq!(current, Phase::Phase1);
    assert_eq!(history.last().unwrap().to_phase, current);

    let mut previous = Phase::Phase1;
    for record in &history {
        assert_eq!(record.from_phase, previous);
        if record.kind != TransitionKind::Demotion {
            assert!(record.to_phase > record.from_phase, "{record:?}");
        } else {
            assert!(record.to_phase < record.from_phase, "{record:?}");
        }
        previous = record.to_phase;
    }
}

#[tokio::test]
async fn reported_execution_updates_ledger_and_statistics() {
    let w = world();
    let acct = account(&w, Platform::Tiktok, None).await;
    let entry = w
        .service
        .submit(seed_gate::ActionRequest {
            account_id: acct.account_id.clone(),
            action_type: ActionType::Follow,
            target_identifier: "@friend".to_string(),
        })
        .await
        .unwrap();

    w.service
        .report_execution(
            &entry.action.action_id,
            ExecutionResult::succeeded(w.clock.now()),
        )
        .await
        .unwrap();
    assert!(w
        .service
        .report_execution(
            &entry.action.action_id,
            ExecutionResult::failed("duplicate", w.clock.now()),
        )
        .await
        .is_err());

    let stats = w.service.statistics(&acct.account_id).await.unwrap();
    assert_eq!(stats.total_actions, 1);
    assert_eq!(stats.successful_executions, 1);
    assert_eq!(stats.failed_executions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_ceiling() {
    let mut config = SeedConfig::default();
    config.phases.phase_1.min_interval_secs = 0;
    let w = world_configured(
        &config,
        FixedAuthenticitySignal::constant(0.0),
        |clock| SimulatedExecutor::new(clock),
    );
    let acct = account(&w, Platform::Tiktok, None).await;

    let handles = (0..8)
        .map(|i| {
            let service = w.service.clone();
            let account_id = acct.account_id.clone();
            tokio::spawn(async move {
                service
                    .submit_action(&account_id, ActionType::Follow, &format!("@race{i}"))
                    .await
            })
        })
        .collect::<Vec<_>>();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().decision == DecisionStatus::AutoApproved {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
}
