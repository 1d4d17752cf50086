/// Database-backed model tests
///
/// Skipped when DATABASE_URL is unset. Each test creates its own user with a
/// random email, so tests can share a database.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::PgPool;
use taskmate_shared::auth::session::{create_session, invalidate_session, validate_session, SessionError};
use taskmate_shared::auth::token::generate_email_token;
use taskmate_shared::db::migrations::run_migrations;
use taskmate_shared::db::pool::{create_pool, DatabaseConfig};
use taskmate_shared::models::account::{Account, AccountType};
use taskmate_shared::models::chat_message::{ChatMessage, ChatRole};
use taskmate_shared::models::profile::{Profile, UpdateProfile};
use taskmate_shared::models::subtask::{Subtask, UpdateSubtask};
use taskmate_shared::models::task::{CreateTask, Priority, Task, TaskFilter, UpdateTask};
use taskmate_shared::models::token::{MagicLink, UserToken, UserTokenKind};
use taskmate_shared::models::user::User;
use uuid::Uuid;

async fn setup() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(DatabaseConfig::from_url(url)).await.expect("pool");
    run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

async fn new_user(pool: &PgPool) -> User {
    let email = format!("{}@test.taskmate", Uuid::new_v4());
    User::create(pool, Some(&email), None).await.expect("user")
}

#[tokio::test]
async fn test_registration_rows_and_cascade_delete() {
    let Some(pool) = setup().await else { return };

    let mut tx = pool.begin().await.unwrap();
    let email = format!("{}@Test.Taskmate", Uuid::new_v4());
    let user = User::create(&mut *tx, Some(&email), None).await.unwrap();
    Account::create_email(&mut *tx, user.id, Some("$argon2id$dummy".to_string()))
        .await
        .unwrap();
    Profile::create(&mut *tx, user.id, Some("Ada"), None).await.unwrap();
    tx.commit().await.unwrap();

    let found = User::find_by_email(&pool, &email).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.email.as_deref(), Some(email.to_lowercase().as_str()));

    let account = Account::find_by_user_id(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(account.account_type, AccountType::Email);

    Task::create(
        &pool,
        user.id,
        CreateTask {
            title: "Cascade me".to_string(),
            priority: Priority::Low,
            due_date: None,
            due_time: None,
        },
    )
    .await
    .unwrap();

    assert!(User::delete(&pool, user.id).await.unwrap());
    assert!(Account::find_by_user_id(&pool, user.id).await.unwrap().is_none());
    assert!(Profile::find_by_user_id(&pool, user.id).await.unwrap().is_none());
    assert!(Task::list_for_user(&pool, user.id, &TaskFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_oauth_account_lookup() {
    let Some(pool) = setup().await else { return };
    let user = User::create(&pool, None, None).await.unwrap();
    let github_id = Uuid::new_v4().to_string();

    Account::create_oauth(&pool, user.id, AccountType::Github, &github_id)
        .await
        .unwrap();

    let found = Account::find_by_provider_id(&pool, AccountType::Github, &github_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.user_id, user.id);
    assert!(Account::find_by_provider_id(&pool, AccountType::Google, &github_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_profile_partial_update() {
    let Some(pool) = setup().await else { return };
    let user = new_user(&pool).await;
    Profile::create(&pool, user.id, Some("Ada"), Some("https://img/a.png"))
        .await
        .unwrap();

    let updated = Profile::update(
        &pool,
        user.id,
        UpdateProfile {
            bio: Some("Counts things".to_string()),
            image: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(updated.display_name.as_deref(), Some("Ada"));
    assert_eq!(updated.image, None);
    assert_eq!(updated.bio, "Counts things");
}

#[tokio::test]
async fn test_task_crud_is_scoped_to_owner() {
    let Some(pool) = setup().await else { return };
    let owner = new_user(&pool).await;
    let stranger = new_user(&pool).await;

    let task = Task::create(
        &pool,
        owner.id,
        CreateTask {
            title: "  Buy milk ".to_string(),
            priority: Priority::High,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            due_time: Some("18:00".to_string()),
        },
    )
    .await
    .unwrap();

    assert_eq!(task.title, "Buy milk");
    assert!(!task.completed);
    assert_eq!(task.priority, Priority::High);
    assert!(Uuid::parse_str(&task.id).is_ok());

    assert!(Task::find_for_user(&pool, &task.id, stranger.id).await.unwrap().is_none());
    assert!(Task::update(&pool, &task.id, stranger.id, UpdateTask {
        completed: Some(true),
        ..Default::default()
    })
    .await
    .unwrap()
    .is_none());
    assert!(!Task::delete(&pool, &task.id, stranger.id).await.unwrap());

    let updated = Task::update(
        &pool,
        &task.id,
        owner.id,
        UpdateTask {
            completed: Some(true),
            due_time: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert!(updated.completed);
    assert_eq!(updated.due_time, None);
    assert_eq!(updated.due_date, task.due_date);

    let found = Task::search_by_title(&pool, owner.id, "MILK").await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(Task::search_by_title(&pool, owner.id, "%").await.unwrap().is_empty());

    let open = Task::list_for_user(&pool, owner.id, &TaskFilter {
        completed: Some(false),
        search: None,
    })
    .await
    .unwrap();
    assert!(open.is_empty());

    assert!(Task::delete(&pool, &task.id, owner.id).await.unwrap());
}

#[tokio::test]
async fn test_subtasks_attach_and_follow_ownership() {
    let Some(pool) = setup().await else { return };
    let owner = new_user(&pool).await;
    let stranger = new_user(&pool).await;

    let task = Task::create(&pool, owner.id, CreateTask {
        title: "Plan trip".to_string(),
        priority: Priority::Medium,
        due_date: None,
        due_time: None,
    })
    .await
    .unwrap();

    let first = Subtask::create(&pool, &task.id, "Book flights").await.unwrap();
    Subtask::create(&pool, &task.id, "Pack").await.unwrap();

    let denied = Subtask::update(&pool, &first.id, stranger.id, UpdateSubtask {
        completed: Some(true),
        ..Default::default()
    })
    .await
    .unwrap();
    assert!(denied.is_none());

    let done = Subtask::update(&pool, &first.id, owner.id, UpdateSubtask {
        completed: Some(true),
        ..Default::default()
    })
    .await
    .unwrap()
    .unwrap();
    assert!(done.completed);
    assert_eq!(done.title, "Book flights");

    let tasks = Task::list_for_user(&pool, owner.id, &TaskFilter::default()).await.unwrap();
    let with_subtasks = Task::with_subtasks(&pool, tasks).await.unwrap();
    assert_eq!(with_subtasks.len(), 1);
    let titles: Vec<_> = with_subtasks[0].subtasks.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Book flights", "Pack"]);

    assert!(!Subtask::delete(&pool, &first.id, stranger.id).await.unwrap());
    assert!(Subtask::delete(&pool, &first.id, owner.id).await.unwrap());
}

#[tokio::test]
async fn test_task_with_subtasks_rolls_back_together() {
    let Some(pool) = setup().await else { return };
    let user = new_user(&pool).await;
    let trip = || CreateTask {
        title: "Plan trip".to_string(),
        priority: Priority::Medium,
        due_date: None,
        due_time: None,
    };

    let mut tx = pool.begin().await.unwrap();
    let task = Task::create(&mut *tx, user.id, trip()).await.unwrap();
    Subtask::create(&mut *tx, &task.id, "Book flights").await.unwrap();
    tx.rollback().await.unwrap();

    assert!(Task::find_for_user(&pool, &task.id, user.id).await.unwrap().is_none());
    assert!(Subtask::list_for_task(&pool, &task.id).await.unwrap().is_empty());

    let mut tx = pool.begin().await.unwrap();
    let task = Task::create(&mut *tx, user.id, trip()).await.unwrap();
    for title in ["Book flights", "Pack", "Water plants"] {
        Subtask::create(&mut *tx, &task.id, title).await.unwrap();
    }
    tx.commit().await.unwrap();

    let titles: Vec<_> = Subtask::list_for_task(&pool, &task.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, vec!["Book flights", "Pack", "Water plants"]);
}

#[tokio::test]
async fn test_chat_history_paging() {
    let Some(pool) = setup().await else { return };
    let user = new_user(&pool).await;

    let mut ids = Vec::new();
    for i in 0..5 {
        let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
        ids.push(ChatMessage::create(&pool, user.id, role, &format!("m{}", i)).await.unwrap().id);
    }

    let (first, has_more) = ChatMessage::page_for_user(&pool, user.id, None, 2).await.unwrap();
    assert!(has_more);
    assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

    let (second, has_more) = ChatMessage::page_for_user(&pool, user.id, Some(ids[3]), 2).await.unwrap();
    assert!(has_more);
    assert_eq!(second.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

    let (last, has_more) = ChatMessage::page_for_user(&pool, user.id, Some(ids[1]), 2).await.unwrap();
    assert!(!has_more);
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].id, ids[0]);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let Some(pool) = setup().await else { return };
    let user = new_user(&pool).await;
    let ttl = Duration::days(30);

    let issued = create_session(&pool, user.id, ttl).await.unwrap();
    let auth = validate_session(&pool, &issued.token, ttl).await.unwrap();
    assert_eq!(auth.user_id, user.id);

    assert!(invalidate_session(&pool, &auth.session_id).await.unwrap());
    assert!(matches!(
        validate_session(&pool, &issued.token, ttl).await,
        Err(SessionError::NotFound)
    ));

    assert!(matches!(
        validate_session(&pool, "garbage", ttl).await,
        Err(SessionError::Malformed)
    ));

    let expired = create_session(&pool, user.id, Duration::seconds(-1)).await.unwrap();
    assert!(matches!(
        validate_session(&pool, &expired.token, ttl).await,
        Err(SessionError::Expired)
    ));
}

#[tokio::test]
async fn test_email_tokens_redeem_once() {
    let Some(pool) = setup().await else { return };
    let user = new_user(&pool).await;
    let now = Utc::now();

    let (_, hash) = generate_email_token();
    UserToken::issue(&pool, UserTokenKind::PasswordReset, user.id, &hash, now + Duration::minutes(15))
        .await
        .unwrap();

    assert_eq!(
        UserToken::redeem(&pool, UserTokenKind::PasswordReset, &hash, now).await.unwrap(),
        Some(user.id)
    );
    assert_eq!(
        UserToken::redeem(&pool, UserTokenKind::PasswordReset, &hash, now).await.unwrap(),
        None
    );

    let email = user.email.clone().unwrap();
    let (_, link_hash) = generate_email_token();
    MagicLink::issue(&pool, &email, &link_hash, now - Duration::minutes(1)).await.unwrap();
    assert_eq!(MagicLink::redeem(&pool, &link_hash, now).await.unwrap(), None);
}
