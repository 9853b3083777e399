/// Integration tests for the test-case hierarchy
///
/// Skipped unless DATABASE_URL points at a PostgreSQL server.

mod common;

use sqlx::PgPool;
use tcm_shared::analytics::{module_analytics, project_analytics};
use tcm_shared::models::cascade::{delete_subtree, DeleteScope};
use tcm_shared::models::execution::{
    CreateExecution, ExecutionResult, StepOutcome, StepStatus, TestExecution, UpdateExecution,
};
use tcm_shared::models::test_case::{CreateTestCase, Priority, StepInput, TestCase, UpdateTestCase};
use tcm_shared::models::test_module::{CreateTestModule, TestModule};
use tcm_shared::models::test_suite::{CreateTestSuite, TestSuite};
use tcm_shared::models::user::{CreateUser, User, UserRole};
use tcm_shared::transfer::{import_into_suite, Format};
use uuid::Uuid;

#[tokio::test]
async fn test_case_id_is_unique_per_module() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let case = common::create_case(&pool, fx.suite.id, "PAY-1", &["open"]).await;

    let mut conn = pool.acquire().await.unwrap();
    assert!(TestCase::case_id_taken(&mut *conn, fx.module.id, "PAY-1", None).await.unwrap());
    assert!(TestCase::case_id_taken(&mut *conn, fx.module.id, " PAY-1 ", None).await.unwrap());
    assert!(!TestCase::case_id_taken(&mut *conn, fx.module.id, "PAY-1", Some(case.test_case.id))
        .await
        .unwrap());
    assert!(!TestCase::case_id_taken(&mut *conn, fx.module.id, "PAY-2", None).await.unwrap());
    drop(conn);

    common::cleanup(&pool, &fx).await;
}

/// Checks and creates `case_id` in one transaction, pausing in between
async fn create_if_free(pool: &PgPool, module_id: Uuid, suite_id: Uuid, case_id: &str) -> bool {
    let mut tx = pool.begin().await.unwrap();
    if TestCase::case_id_taken(&mut *tx, module_id, case_id, None).await.unwrap() {
        return false;
    }

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    TestCase::create(
        &mut *tx,
        CreateTestCase {
            suite_id,
            case_id: case_id.to_string(),
            title: "Concurrent".to_string(),
            description: None,
            priority: Priority::Medium,
            steps: Vec::new(),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    true
}

#[tokio::test]
async fn test_concurrent_creates_cannot_share_case_id() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let (first, second) = tokio::join!(
        create_if_free(&pool, fx.module.id, fx.suite.id, "DUP-1"),
        create_if_free(&pool, fx.module.id, fx.suite.id, "DUP-1"),
    );
    assert!(first ^ second, "exactly one create should win");

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM test_cases WHERE suite_id = $1 AND case_id = 'DUP-1'",
    )
    .bind(fx.suite.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_replacing_steps_keeps_surviving_results() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let case = common::create_case(&pool, fx.suite.id, "PAY-1", &["one", "two", "three"]).await;
    let numbers: Vec<i32> = case.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let mut conn = pool.acquire().await.unwrap();
    let execution = TestExecution::create(
        &mut *conn,
        CreateExecution {
            test_case_id: case.test_case.id,
            notes: None,
            assigned_to: None,
            created_by: Some(fx.admin.id),
        },
    )
    .await
    .unwrap();
    assert_eq!(execution.step_results.len(), 3);

    let updated = TestCase::update(
        &mut *conn,
        case.test_case.id,
        UpdateTestCase {
            steps: Some(vec![
                StepInput {
                    action: "one again".to_string(),
                    expected_result: Some("ok".to_string()),
                },
                StepInput {
                    action: "two again".to_string(),
                    expected_result: None,
                },
            ]),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    drop(conn);

    assert_eq!(updated.steps.len(), 2);
    assert_eq!(updated.steps[0].id, case.steps[0].id);
    assert_eq!(updated.steps[1].action, "two again");

    let reloaded = TestExecution::find_with_results(&pool, execution.execution.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.step_results.len(), 2);

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_execution_result_is_derived_from_steps() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let case = common::create_case(&pool, fx.suite.id, "PAY-1", &["one", "two"]).await;

    let mut conn = pool.acquire().await.unwrap();
    let execution = TestExecution::create(
        &mut *conn,
        CreateExecution {
            test_case_id: case.test_case.id,
            notes: None,
            assigned_to: Some(fx.admin.id),
            created_by: Some(fx.admin.id),
        },
    )
    .await
    .unwrap();
    assert_eq!(execution.execution.result, ExecutionResult::Pending);

    let outcome = |index: usize, status| StepOutcome {
        step_id: case.steps[index].id,
        status,
        actual_result: None,
    };

    let updated = TestExecution::update(
        &mut *conn,
        execution.execution.id,
        UpdateExecution {
            notes: Some(Some("first run".to_string())),
            step_results: vec![outcome(0, StepStatus::Passed), outcome(1, StepStatus::Failed)],
            result: None,
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.execution.result, ExecutionResult::PartiallyPassed);
    assert_eq!(updated.execution.notes.as_deref(), Some("first run"));

    let overridden = TestExecution::update(
        &mut *conn,
        execution.execution.id,
        UpdateExecution {
            result: Some(ExecutionResult::Blocked),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(overridden.execution.result, ExecutionResult::Blocked);
    assert_eq!(overridden.execution.notes.as_deref(), Some("first run"));
    drop(conn);

    let assigned = TestExecution::list_assigned(&pool, fx.admin.id, fx.organization.id)
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].case_id, "PAY-1");

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_delete_drains_whole_subtree() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let first = common::create_case(&pool, fx.suite.id, "PAY-1", &["a", "b"]).await;
    common::create_case(&pool, fx.suite.id, "PAY-2", &["c"]).await;

    let mut conn = pool.acquire().await.unwrap();
    TestExecution::create(
        &mut *conn,
        CreateExecution {
            test_case_id: first.test_case.id,
            notes: None,
            assigned_to: None,
            created_by: None,
        },
    )
    .await
    .unwrap();
    drop(conn);

    let summary = delete_subtree(&pool, DeleteScope::Project(fx.project.id))
        .await
        .unwrap()
        .expect("project should exist");

    assert_eq!(summary.projects, 1);
    assert_eq!(summary.modules, 1);
    assert_eq!(summary.suites, 1);
    assert_eq!(summary.test_cases, 2);
    assert_eq!(summary.steps, 3);
    assert_eq!(summary.executions, 1);
    assert_eq!(summary.step_results, 2);

    let again = delete_subtree(&pool, DeleteScope::Project(fx.project.id)).await.unwrap();
    assert!(again.is_none());

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_import_skips_existing_case_ids() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    common::create_case(&pool, fx.suite.id, "PAY-1", &["existing"]).await;

    let csv = "Test Case ID,Title,Priority,Step Number,Action,Expected Result\n\
               PAY-1,Duplicate,HIGH,1,dup,\n\
               PAY-2,Refund,LOW,2,second,done\n\
               ,,,1,first,\n\
               PAY-3,,,,missing title,\n";

    let report = import_into_suite(&pool, fx.suite.id, fx.module.id, Format::Csv, csv.as_bytes())
        .await
        .unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.imported_case_ids, vec!["PAY-2".to_string()]);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].row, 2);
    assert_eq!(report.errors[1].row, 5);

    let cases = TestCase::list_by_suite_with_steps(&pool, fx.suite.id).await.unwrap();
    let imported = cases.iter().find(|c| c.test_case.case_id == "PAY-2").unwrap();
    let actions: Vec<&str> = imported.steps.iter().map(|s| s.action.as_str()).collect();
    assert_eq!(actions, vec!["first", "second"]);

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_analytics_use_latest_execution() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let case = common::create_case(&pool, fx.suite.id, "PAY-1", &["one"]).await;
    common::create_case(&pool, fx.suite.id, "PAY-2", &["two"]).await;

    let mut conn = pool.acquire().await.unwrap();
    for result in [ExecutionResult::Failed, ExecutionResult::Passed] {
        let execution = TestExecution::create(
            &mut *conn,
            CreateExecution {
                test_case_id: case.test_case.id,
                notes: None,
                assigned_to: None,
                created_by: None,
            },
        )
        .await
        .unwrap();

        TestExecution::update(
            &mut *conn,
            execution.execution.id,
            UpdateExecution {
                result: Some(result),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // executed_at needs to differ between the two runs
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    drop(conn);

    let project = project_analytics(&pool, fx.project.id, None).await.unwrap();
    assert_eq!(project.summary.total_cases, 2);
    assert_eq!(project.summary.executed_cases, 1);
    assert_eq!(project.summary.not_run_cases, 1);
    assert_eq!(project.summary.results.passed, 1);
    assert_eq!(project.summary.results.failed, 0);
    assert_eq!(project.summary.execution_count, 2);
    assert_eq!(project.summary.pass_rate, 100.0);
    assert_eq!(project.modules.len(), 1);
    assert_eq!(project.modules[0].name, "Payments");

    let module = module_analytics(&pool, fx.module.id).await.unwrap();
    assert_eq!(module.suites.len(), 1);
    assert_eq!(module.suites[0].summary.total_cases, 2);

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_project_analytics_only_counts_visible_modules() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;
    common::create_case(&pool, fx.suite.id, "PAY-1", &["one"]).await;

    let secret = TestModule::create(
        &pool,
        CreateTestModule {
            project_id: fx.project.id,
            name: "Secret".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    let secret_suite = TestSuite::create(
        &pool,
        CreateTestSuite {
            module_id: secret.id,
            name: "Hidden".to_string(),
            description: None,
        },
    )
    .await
    .unwrap();
    common::create_case(&pool, secret_suite.id, "SEC-1", &["one"]).await;
    common::create_case(&pool, secret_suite.id, "SEC-2", &["two"]).await;

    let mut conn = pool.acquire().await.unwrap();
    let qa = User::create(
        &mut *conn,
        CreateUser {
            organization_id: fx.organization.id,
            email: format!("qa-{}@example.com", Uuid::new_v4().simple()),
            password_hash: "not-a-real-hash".to_string(),
            name: "QA".to_string(),
            roles: vec![UserRole::Qa],
        },
    )
    .await
    .unwrap();
    TestModule::set_assigned_users(&mut *conn, fx.module.id, &[qa.id]).await.unwrap();
    drop(conn);

    let everything = project_analytics(&pool, fx.project.id, None).await.unwrap();
    assert_eq!(everything.summary.total_cases, 3);
    assert_eq!(everything.modules.len(), 2);

    let visible = project_analytics(&pool, fx.project.id, Some(qa.id)).await.unwrap();
    assert_eq!(visible.summary.total_cases, 1);
    let names: Vec<&str> = visible.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Payments"]);

    common::cleanup(&pool, &fx).await;
}

#[tokio::test]
async fn test_import_rejects_overlong_case_id_per_case() {
    let Some(pool) = common::setup().await else {
        return;
    };
    let fx = common::fixture(&pool).await;

    let csv = format!(
        "Test Case ID,Title,Action\nPAY-1,Card,open\n{},Too long,open\n",
        "X".repeat(101)
    );

    let report = import_into_suite(&pool, fx.suite.id, fx.module.id, Format::Csv, csv.as_bytes())
        .await
        .unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors[0].row, 3);

    common::cleanup(&pool, &fx).await;
}
