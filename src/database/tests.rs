use chrono::Utc;
use sqlx::PgPool;

use crate::error::ServiceError;
use crate::models::{
    Checkpoint, CheckpointStatus, DiningTable, KitchenStatus, MenuItem, NewOrder, NewOrderItem,
    OrderStatus, Role, User, WorkOrder, WorkOrderStatus,
};

use super::{AppState, DatabaseConnection};

async fn connect(pool: PgPool) -> DatabaseConnection {
    let app_state = AppState::from_pool(pool).await.unwrap();
    app_state.connection().await.unwrap()
}

fn table(name: &str) -> DiningTable {
    DiningTable {
        id: 0,
        name: name.to_owned(),
        seats: 4,
        zone: "Terrace".to_owned(),
        active: true,
        occupied: false,
    }
}

async fn order_one(db: &mut DatabaseConnection, session_id: u64) -> crate::models::Order {
    let item = db
        .store_menu_item(MenuItem {
            id: 0,
            category_id: None,
            name: "Pad Thai".to_owned(),
            description: String::new(),
            price_cents: 12000,
            image_url: None,
            available: true,
        })
        .await
        .unwrap();

    db.create_order(NewOrder {
        session_id,
        note: None,
        items: vec![NewOrderItem {
            menu_item_id: item.id,
            name: item.name.clone(),
            unit_price_cents: item.price_cents,
            quantity: 2,
            note: None,
            included_in_package: false,
        }],
    })
    .await
    .unwrap()
}

#[sqlx::test(migrations = false)]
async fn table_names_are_unique(pool: PgPool) {
    let mut db = connect(pool).await;

    db.store_table(table("T1")).await.unwrap();
    assert!(db.table_name_exists("T1", 0).await.unwrap());

    let result = db.store_table(table("T1")).await;
    assert_eq!(result, Err(ServiceError::BadRequest("duplicate_entry")));
}

#[sqlx::test(migrations = false)]
async fn one_open_session_per_table(pool: PgPool) {
    let mut db = connect(pool).await;
    let t1 = db.store_table(table("T1")).await.unwrap();

    let session = db.open_session(t1.id, 2, None).await.unwrap();
    assert!(session.is_open());
    assert_eq!(session.table_name, "T1");

    let table = db.get_table_by_id(t1.id).await.unwrap().unwrap();
    assert!(table.occupied);

    let second = db.open_session(t1.id, 3, None).await;
    assert_eq!(second, Err(ServiceError::BadRequest("table_occupied")));

    assert!(db.close_session(session.id, 0).await.unwrap());
    let table = db.get_table_by_id(t1.id).await.unwrap().unwrap();
    assert!(!table.occupied);

    db.open_session(t1.id, 3, None).await.unwrap();
}

#[sqlx::test(migrations = false)]
async fn sessions_with_open_orders_stay_open(pool: PgPool) {
    let mut db = connect(pool).await;
    let t1 = db.store_table(table("T1")).await.unwrap();
    let session = db.open_session(t1.id, 2, None).await.unwrap();

    let order = order_one(&mut db, session.id).await;
    assert_eq!(order.status, OrderStatus::Pending);

    assert!(!db.close_session(session.id, 24000).await.unwrap());

    assert!(db.cancel_order(order.id).await.unwrap());
    assert!(db.close_session(session.id, 0).await.unwrap());

    let session = db.get_session_by_id(session.id).await.unwrap().unwrap();
    assert!(!session.is_open());
    assert_eq!(session.total_cents, Some(0));
    assert!(session.closed_at.is_some());
}

#[sqlx::test(migrations = false)]
async fn kitchen_status_moves_one_step(pool: PgPool) {
    let mut db = connect(pool).await;
    let t1 = db.store_table(table("T1")).await.unwrap();
    let session = db.open_session(t1.id, 2, None).await.unwrap();
    let order = order_one(&mut db, session.id).await;
    let item_id = order.items[0].id;

    let order = db
        .update_order_item_status(item_id, KitchenStatus::Waiting, KitchenStatus::Cooking)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
    assert_eq!(order.items[0].kitchen_status, KitchenStatus::Cooking);

    // a stale update from a second screen loses
    let stale = db
        .update_order_item_status(item_id, KitchenStatus::Waiting, KitchenStatus::Cooking)
        .await;
    assert_eq!(stale, Err(ServiceError::BadRequest("invalid_status_transition")));

    assert!(!db.cancel_order(order.id).await.unwrap());

    db.update_order_item_status(item_id, KitchenStatus::Cooking, KitchenStatus::Done)
        .await
        .unwrap();
    let order = db
        .update_order_item_status(item_id, KitchenStatus::Done, KitchenStatus::Served)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Served);

    assert!(db.get_kitchen_queue().await.unwrap().is_empty());
    assert!(db.close_session(session.id, 24000).await.unwrap());
}

#[sqlx::test(migrations = false)]
async fn cancelled_orders_stay_out_of_the_kitchen(pool: PgPool) {
    let mut db = connect(pool).await;
    let t1 = db.store_table(table("T1")).await.unwrap();
    let session = db.open_session(t1.id, 2, None).await.unwrap();
    let order = order_one(&mut db, session.id).await;
    let item_id = order.items[0].id;

    assert!(db.cancel_order(order.id).await.unwrap());

    let result = db
        .update_order_item_status(item_id, KitchenStatus::Waiting, KitchenStatus::Cooking)
        .await;
    assert_eq!(result, Err(ServiceError::BadRequest("order_cancelled")));

    let item = db.get_order_item_by_id(item_id).await.unwrap().unwrap();
    assert_eq!(item.kitchen_status, KitchenStatus::Waiting);
    assert!(db.get_kitchen_queue().await.unwrap().is_empty());
}

#[sqlx::test(migrations = false)]
async fn closed_sessions_stay_out_of_the_kitchen(pool: PgPool) {
    let mut db = connect(pool).await;
    let t1 = db.store_table(table("T1")).await.unwrap();
    let session = db.open_session(t1.id, 2, None).await.unwrap();
    let order = order_one(&mut db, session.id).await;
    let item_id = order.items[0].id;

    db.update_order_item_status(item_id, KitchenStatus::Waiting, KitchenStatus::Cooking)
        .await
        .unwrap();
    db.update_order_item_status(item_id, KitchenStatus::Cooking, KitchenStatus::Done)
        .await
        .unwrap();
    db.update_order_item_status(item_id, KitchenStatus::Done, KitchenStatus::Served)
        .await
        .unwrap();
    assert!(db.close_session(session.id, 24000).await.unwrap());

    let result = db
        .update_order_item_status(item_id, KitchenStatus::Done, KitchenStatus::Served)
        .await;
    assert_eq!(result, Err(ServiceError::BadRequest("session_closed")));
}

#[sqlx::test(migrations = false)]
async fn checkpoints_drive_work_order_status(pool: PgPool) {
    let mut db = connect(pool).await;

    let user = db
        .store_user(
            User {
                id: 0,
                username: "somchai".to_owned(),
                name: "Somchai".to_owned(),
                role: Role::Manager,
                department_id: None,
                created_at: Utc::now(),
            },
            Some(vec![7u8; 32]),
        )
        .await
        .unwrap();

    let pending = |name: &str| Checkpoint {
        id: 0,
        work_order_id: 0,
        position: 0,
        name: name.to_owned(),
        department_id: None,
        status: CheckpointStatus::Pending,
        completed_by: None,
        completed_at: None,
    };

    let now = Utc::now();
    let work_order = db
        .create_work_order(WorkOrder {
            id: 0,
            title: "Replace fryer".to_owned(),
            description: String::new(),
            department_id: None,
            template_id: None,
            status: WorkOrderStatus::Open,
            created_by: Some(user.id),
            due_at: None,
            created_at: now,
            updated_at: now,
            checkpoints: vec![pending("Order part"), pending("Install")],
        })
        .await
        .unwrap();
    assert_eq!(work_order.status, WorkOrderStatus::Open);
    assert_eq!(work_order.checkpoints.len(), 2);
    assert_eq!(work_order.checkpoints[0].position, 0);
    assert_eq!(work_order.checkpoints[1].position, 1);

    let first = work_order.checkpoints[0].id;
    let second = work_order.checkpoints[1].id;

    let work_order = db.complete_checkpoint(work_order.id, first, user.id).await.unwrap();
    assert_eq!(work_order.status, WorkOrderStatus::InProgress);
    assert_eq!(work_order.checkpoints[0].completed_by, Some(user.id));

    let again = db.complete_checkpoint(work_order.id, first, user.id).await;
    assert_eq!(again, Err(ServiceError::BadRequest("checkpoint_already_done")));

    let work_order = db.complete_checkpoint(work_order.id, second, user.id).await.unwrap();
    assert_eq!(work_order.status, WorkOrderStatus::Completed);

    assert!(!db.cancel_work_order(work_order.id).await.unwrap());

    let dashboard = db.get_work_order_dashboard().await.unwrap();
    assert_eq!(dashboard.completed, 1);
    assert_eq!(dashboard.open, 0);
}
